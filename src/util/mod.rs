//! Utility module
//!
//! Clock helpers shared by the engine and the driver.

use std::time::{Duration, Instant};

/// Monotonic elapsed time since the node started
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started: Instant,
}

impl Uptime {
    /// Starts counting from now
    pub fn start() -> Self {
        Uptime {
            started: Instant::now(),
        }
    }

    /// Time elapsed since start
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::start()
    }
}

/// Whole milliseconds of a duration, as used in message ids
pub fn millis(duration: Duration) -> u128 {
    duration.as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_is_monotonic() {
        let uptime = Uptime::start();
        let a = uptime.elapsed();
        let b = uptime.elapsed();
        assert!(b >= a);
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(Duration::from_micros(42_999)), 42);
        assert_eq!(millis(Duration::from_secs(30)), 30_000);
    }
}
