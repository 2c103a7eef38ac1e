//! Trial tracking and best-result bookkeeping.

use cf_types::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Identifier of a local search engine inside one coordinator.
pub type EngineId = u64;

/// Whether we are maximizing or minimizing the metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Min,
    Max,
}

impl Mode {
    /// Factor that turns a reported metric into a loss to minimize.
    pub fn sign(self) -> f64 {
        match self {
            Mode::Min => 1.0,
            Mode::Max => -1.0,
        }
    }

    /// Whether `candidate` is strictly better than `current` under this mode.
    pub fn improves(self, candidate: f64, current: f64) -> bool {
        match self {
            Mode::Min => candidate < current,
            Mode::Max => candidate > current,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Min => write!(f, "min"),
            Mode::Max => write!(f, "max"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(Mode::Min),
            "max" => Ok(Mode::Max),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Completed,
    Failed,
}

/// An outstanding suggestion: which engine issued which configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: String,
    pub engine_id: EngineId,
    pub config: Configuration,
    pub status: TrialStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TrialRecord {
    pub fn new(trial_id: impl Into<String>, engine_id: EngineId, config: Configuration) -> Self {
        Self {
            trial_id: trial_id.into(),
            engine_id,
            config,
            status: TrialStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock time between suggestion and resolution, if resolved.
    pub fn turnaround_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.created_at).num_milliseconds())
    }
}

/// The best configuration observed so far, with the metric as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub trial_id: String,
    pub config: Configuration,
    pub metric: f64,
}

impl BestResult {
    /// Replace `best` if `candidate` improves on it. Returns whether it did.
    /// Non-finite metrics never become best.
    pub fn update(best: &mut Option<BestResult>, candidate: BestResult, mode: Mode) -> bool {
        let improved = candidate.metric.is_finite()
            && match best {
                None => true,
                Some(current) => mode.improves(candidate.metric, current.metric),
            };
        if improved {
            *best = Some(candidate);
        }
        improved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(trial_id: &str, metric: f64) -> BestResult {
        BestResult {
            trial_id: trial_id.to_string(),
            config: Configuration::new().with("x", 1i64),
            metric,
        }
    }

    #[test]
    fn best_tracking_minimize() {
        let mut best = None;
        assert!(BestResult::update(&mut best, result("0", 0.15), Mode::Min));
        assert!(BestResult::update(&mut best, result("1", 0.05), Mode::Min));
        // Worse result should not replace
        assert!(!BestResult::update(&mut best, result("2", 0.10), Mode::Min));
        assert_eq!(best.as_ref().unwrap().trial_id, "1");
    }

    #[test]
    fn best_tracking_maximize() {
        let mut best = None;
        BestResult::update(&mut best, result("0", 1.5), Mode::Max);
        BestResult::update(&mut best, result("1", 2.0), Mode::Max);
        BestResult::update(&mut best, result("2", 1.0), Mode::Max);
        assert_eq!(best.as_ref().unwrap().metric, 2.0);
    }

    #[test]
    fn non_finite_metrics_never_become_best() {
        let mut best = None;
        assert!(!BestResult::update(&mut best, result("0", f64::NAN), Mode::Min));
        assert!(best.is_none());

        assert!(BestResult::update(&mut best, result("1", 0.5), Mode::Max));
        assert!(!BestResult::update(&mut best, result("2", f64::INFINITY), Mode::Max));
        assert!(!BestResult::update(&mut best, result("3", f64::NEG_INFINITY), Mode::Min));
        assert_eq!(best.as_ref().unwrap().trial_id, "1");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("min".parse::<Mode>().unwrap(), Mode::Min);
        assert_eq!("max".parse::<Mode>().unwrap(), Mode::Max);
        assert!(matches!("minimize".parse::<Mode>(), Err(ConfigError::InvalidMode(_))));
        assert_eq!(serde_json::to_string(&Mode::Max).unwrap(), "\"max\"");
        assert_eq!(Mode::Min.to_string(), "min");
    }

    #[test]
    fn trial_lifecycle() {
        let mut trial = TrialRecord::new("3", 0, Configuration::new());
        assert_eq!(trial.status, TrialStatus::Pending);
        assert!(trial.turnaround_ms().is_none());

        trial.mark_completed();
        assert_eq!(trial.status, TrialStatus::Completed);
        assert!(trial.turnaround_ms().unwrap() >= 0);

        let mut failed = TrialRecord::new("4", 1, Configuration::new());
        failed.mark_failed();
        assert_eq!(failed.status, TrialStatus::Failed);
    }
}
