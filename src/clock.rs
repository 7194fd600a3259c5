//! Time source abstraction.
//!
//! Every deadline in the core (proposal end times, session expiry, challenge
//! windows) is evaluated against an injected clock so tests never sleep.

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests and replay tooling.
#[derive(Debug)]
pub struct ManualTimeSource {
    time: RwLock<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            time: RwLock::new(initial),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.write().unwrap_or_else(|e| e.into_inner());
        *time += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut time = self.time.write().unwrap_or_else(|e| e.into_inner());
        *time = to;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_source_advances() {
        let start = Utc::now();
        let clock = ManualTimeSource::new(start);
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_time_source_moves_forward() {
        let before = Utc::now();
        let now = SystemTimeSource.now();
        assert!(now >= before);
    }
}
