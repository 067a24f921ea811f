// Copyright (c) 2018 Nuclear Furnace
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
use super::Processor;
use crate::delivery::HeaderMap;
use crate::outcome::Outcome;
use async_trait::async_trait;
use fastcgi_client::{Client, Params, Request};
use std::io::Cursor;
use tokio::net::{TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;

/// Where to dial for each request.
#[derive(Debug, Clone)]
pub enum DialTarget {
    Tcp(String),
    Unix(String),
}

/// Reference `Processor` adapter: one FastCGI request per invocation.
pub struct FastCgiProcessor {
    target: DialTarget,
    script_name: String,
}

impl FastCgiProcessor {
    pub fn new(target: DialTarget, script_name: impl Into<String>) -> Self {
        FastCgiProcessor {
            target,
            script_name: script_name.into(),
        }
    }
}

#[async_trait]
impl Processor for FastCgiProcessor {
    async fn process(&self, _cancel: &CancellationToken, mut headers: HeaderMap, body: Vec<u8>) -> Outcome {
        headers.entry("REQUEST_METHOD".to_string()).or_insert_with(|| "POST".to_string());
        headers.entry("REQUEST_URI".to_string()).or_insert_with(|| "/".to_string());
        headers.insert("CONTENT_LENGTH".to_string(), body.len().to_string());
        headers.insert("SCRIPT_FILENAME".to_string(), self.script_name.clone());

        let mut params = Params::default();
        for (k, v) in headers {
            params.insert(k, v);
        }

        let mut payload = body;
        payload.extend_from_slice(b"\r\n\r\n");

        let status = match &self.target {
            DialTarget::Tcp(addr) => match TcpStream::connect(addr).await {
                Ok(stream) => Self::execute(stream, params, payload).await,
                Err(_) => return Outcome::ProcessorInternal,
            },
            DialTarget::Unix(path) => match UnixStream::connect(path).await {
                Ok(stream) => Self::execute(stream, params, payload).await,
                Err(_) => return Outcome::ProcessorInternal,
            },
        };

        match status {
            Some(code) => Outcome::from_status_class(code),
            None => Outcome::ProcessorInternal,
        }
    }
}

impl FastCgiProcessor {
    async fn execute<S>(stream: S, params: Params<'_, '_>, body: Vec<u8>) -> Option<u16>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
    {
        let mut client = Client::new(stream);
        let request = Request::new(params, Cursor::new(body));
        let response = client.execute_once(request).await.ok()?;
        response.status_code()
    }
}
