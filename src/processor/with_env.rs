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
use tokio_util::sync::CancellationToken;

/// Decorates an inner `Processor`, overlaying default headers that the
/// per-message headers don't already set, then delegating.
pub struct EnvMergingProcessor<P> {
    inner: P,
    defaults: HeaderMap,
}

impl<P> EnvMergingProcessor<P> {
    pub fn new(inner: P, defaults: HeaderMap) -> Self {
        EnvMergingProcessor { inner, defaults }
    }
}

#[async_trait]
impl<P> Processor for EnvMergingProcessor<P>
where
    P: Processor,
{
    async fn process(&self, cancel: &CancellationToken, mut headers: HeaderMap, body: Vec<u8>) -> Outcome {
        for (k, v) in &self.defaults {
            headers.entry(k.clone()).or_insert_with(|| v.clone());
        }

        self.inner.process(cancel, headers, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Capturing {
        seen: Mutex<Option<HeaderMap>>,
    }

    #[async_trait]
    impl Processor for Capturing {
        async fn process(&self, _cancel: &CancellationToken, headers: HeaderMap, _body: Vec<u8>) -> Outcome {
            *self.seen.lock().unwrap() = Some(headers);
            Outcome::Ok
        }
    }

    #[tokio::test]
    async fn does_not_overwrite_existing_header() {
        let defaults = HeaderMap::from([("X-ENV".to_string(), "default".to_string())]);
        let capturing = Capturing { seen: Mutex::new(None) };
        let wrapped = EnvMergingProcessor::new(capturing, defaults);

        let headers = HeaderMap::from([("X-ENV".to_string(), "caller".to_string())]);
        let cancel = CancellationToken::new();
        wrapped.process(&cancel, headers, Vec::new()).await;

        let seen = wrapped.inner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("X-ENV").map(String::as_str), Some("caller"));
    }

    #[tokio::test]
    async fn fills_in_missing_default() {
        let defaults = HeaderMap::from([("X-ENV".to_string(), "default".to_string())]);
        let capturing = Capturing { seen: Mutex::new(None) };
        let wrapped = EnvMergingProcessor::new(capturing, defaults);

        let cancel = CancellationToken::new();
        wrapped.process(&cancel, HeaderMap::new(), Vec::new()).await;

        let seen = wrapped.inner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("X-ENV").map(String::as_str), Some("default"));
    }
}
