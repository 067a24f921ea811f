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
pub mod exec;
pub mod fastcgi;
pub mod with_env;

use crate::delivery::HeaderMap;
use crate::outcome::Outcome;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-message handler contract.
///
/// Implementations must be safe to invoke concurrently from multiple tasks
/// and must not retain or mutate the header mapping after `process` returns.
/// They may honor `cancel` at their discretion -- stop dialling, abort
/// in-flight I/O -- but are not required to return immediately on
/// cancellation.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, cancel: &CancellationToken, headers: HeaderMap, body: Vec<u8>) -> Outcome;
}

#[async_trait]
impl<T> Processor for std::sync::Arc<T>
where
    T: Processor + ?Sized,
{
    async fn process(&self, cancel: &CancellationToken, headers: HeaderMap, body: Vec<u8>) -> Outcome {
        (**self).process(cancel, headers, body).await
    }
}
