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
use thiserror::Error;

/// The closed set of outcomes a `Processor` may report.
///
/// Compared by variant identity, never by message text -- see the design
/// note on error identity vs. error chains.
#[derive(Debug, Error)]
pub enum Outcome {
    /// Processor reported success (2xx-class). No error.
    #[error("ok")]
    Ok,

    /// Permanent reject (3xx/4xx-class): the caller's fault, don't requeue.
    #[error("processing error")]
    ProcessingError,

    /// Transient backend fault (5xx-class): requeue after a delay.
    #[error("processing failed")]
    ProcessingFailed,

    /// No reply status was observed at all; treated as transient.
    #[error("unknown status")]
    UnknownStatus,

    /// The adapter could not even perform the request (dial failure, spawn
    /// failure, transport error); treated as transient.
    #[error("processor internal error")]
    ProcessorInternal,

    /// Any other error a Processor implementation wants to surface; treated
    /// as transient.
    #[error("processor error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Outcome {
    /// Maps an HTTP-style status code to an outcome, per the FastCGI
    /// processor's status-class rule.
    pub fn from_status_class(status: u16) -> Outcome {
        match status / 100 {
            0 => Outcome::UnknownStatus,
            2 => Outcome::Ok,
            3 | 4 => Outcome::ProcessingError,
            _ => Outcome::ProcessingFailed,
        }
    }

    /// The broker verb this outcome maps to.
    pub fn verb(&self) -> Verb {
        match self {
            Outcome::Ok => Verb::Ack,
            Outcome::ProcessingError => Verb::RejectNoRequeue,
            _ => Verb::RejectWithDelayThenRequeue,
        }
    }
}

/// The broker-level action a consumed delivery ultimately receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Ack,
    RejectNoRequeue,
    RejectWithDelayThenRequeue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_class_mapping() {
        assert!(matches!(Outcome::from_status_class(0), Outcome::UnknownStatus));
        assert!(matches!(Outcome::from_status_class(204), Outcome::Ok));
        assert!(matches!(Outcome::from_status_class(404), Outcome::ProcessingError));
        assert!(matches!(Outcome::from_status_class(302), Outcome::ProcessingError));
        assert!(matches!(Outcome::from_status_class(500), Outcome::ProcessingFailed));
    }

    #[test]
    fn verb_table() {
        assert_eq!(Outcome::Ok.verb(), Verb::Ack);
        assert_eq!(Outcome::ProcessingError.verb(), Verb::RejectNoRequeue);
        assert_eq!(Outcome::ProcessingFailed.verb(), Verb::RejectWithDelayThenRequeue);
        assert_eq!(Outcome::UnknownStatus.verb(), Verb::RejectWithDelayThenRequeue);
        assert_eq!(Outcome::ProcessorInternal.verb(), Verb::RejectWithDelayThenRequeue);
    }
}
