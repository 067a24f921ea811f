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
use std::time::{Duration, Instant};

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const RESET_GRACE: Duration = Duration::from_secs(10);

/// Self-resetting exponential delay generator.
///
/// Each instance is owned by exactly one reconnect or restart loop; there is
/// no internal locking and none is needed.
pub struct Backoff {
    last: Option<Instant>,
    delay: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Backoff {
            last: None,
            delay: Duration::ZERO,
        }
    }

    /// Returns the delay to wait before the next attempt, advancing the
    /// internal state.
    ///
    /// Resets to zero if the gap since the last call exceeds the previous
    /// delay by more than ten seconds -- a cycle that ran that long was
    /// healthy enough to forget past failures.
    pub fn timeout(&mut self) -> Duration {
        let now = Instant::now();
        let idle = match self.last {
            Some(last) => now.duration_since(last),
            None => Duration::from_secs(u64::MAX / 2),
        };

        if idle.checked_sub(self.delay).unwrap_or(Duration::ZERO) > RESET_GRACE {
            self.delay = Duration::ZERO;
        }

        self.last = Some(now);
        self.delay = Self::increase(self.delay);
        self.delay
    }

    fn increase(d: Duration) -> Duration {
        if d.is_zero() {
            return Duration::from_secs(1);
        }

        match d.checked_mul(2) {
            Some(doubled) if doubled <= MAX_BACKOFF => doubled,
            _ => MAX_BACKOFF,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self { Backoff::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_returns_one_second() {
        let mut b = Backoff::new();
        assert_eq!(b.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn doubles_without_idle_gap() {
        let mut b = Backoff::new();
        assert_eq!(b.timeout(), Duration::from_secs(1));
        assert_eq!(b.timeout(), Duration::from_secs(2));
        assert_eq!(b.timeout(), Duration::from_secs(4));
        assert_eq!(b.timeout(), Duration::from_secs(8));
    }

    #[test]
    fn caps_at_sixty_seconds() {
        let mut b = Backoff::new();
        for _ in 0..10 {
            b.timeout();
        }
        assert_eq!(b.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn resets_after_idle_gap() {
        let mut b = Backoff::new();
        assert_eq!(b.timeout(), Duration::from_secs(1));
        // Simulate a long, healthy run by rewinding `last` manually.
        b.last = Some(Instant::now() - Duration::from_secs(30));
        assert_eq!(b.timeout(), Duration::from_secs(1));
    }
}
