//! Per-search logging policy.
//!
//! Holds the once-per-key and periodic throttling state for one search run,
//! so two searchers in the same process never silence each other.

use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct LogPolicy {
    disabled: bool,
    periodic: Option<Duration>,
    logged: HashSet<String>,
    last_logged: Option<Instant>,
}

impl LogPolicy {
    /// Log each distinct key once.
    pub fn new() -> Self {
        Self::default()
    }

    /// Never log.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Log at most once per `period`, whatever the key.
    pub fn periodic(period: Duration) -> Self {
        Self {
            periodic: Some(period),
            ..Self::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Whether a message identified by `key` should be emitted now.
    pub fn should_log(&mut self, key: &str) -> bool {
        if self.disabled {
            return false;
        }
        match self.periodic {
            Some(period) => {
                let now = Instant::now();
                let due = self
                    .last_logged
                    .map_or(true, |last| now.duration_since(last) >= period);
                if due {
                    self.last_logged = Some(now);
                }
                due
            }
            None => self.logged.insert(key.to_string()),
        }
    }

    /// Forget everything logged so far.
    pub fn reset(&mut self) {
        self.logged.clear();
        self.last_logged = None;
    }
}
