//! The searcher contract consumed by trial drivers.

use cf_types::CfResult;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::checkpoint::checkpoint_path;
use crate::config::Configuration;
use crate::trial::Mode;

/// Structural view of a trial result: anything that can report a numeric
/// value for a key.
///
/// Unrecognized keys (including echoed `config/<param>` entries) are simply
/// never asked for.
pub trait MetricSource {
    fn metric_value(&self, key: &str) -> Option<f64>;
}

impl MetricSource for HashMap<String, f64> {
    fn metric_value(&self, key: &str) -> Option<f64> {
        self.get(key).copied()
    }
}

impl MetricSource for BTreeMap<String, f64> {
    fn metric_value(&self, key: &str) -> Option<f64> {
        self.get(key).copied()
    }
}

impl MetricSource for serde_json::Map<String, serde_json::Value> {
    fn metric_value(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(serde_json::Value::as_f64)
    }
}

impl MetricSource for serde_json::Value {
    fn metric_value(&self, key: &str) -> Option<f64> {
        self.as_object().and_then(|map| map.metric_value(key))
    }
}

/// Answer to a suggestion request.
#[derive(Debug, Clone, PartialEq)]
pub enum Suggestion {
    /// Run this configuration under the requested trial id.
    Config(Configuration),
    /// Nothing can be proposed until an outstanding trial completes.
    Deferred,
    /// The search is over; no configuration will ever be proposed again.
    Finished,
}

impl Suggestion {
    pub fn config(&self) -> Option<&Configuration> {
        match self {
            Suggestion::Config(config) => Some(config),
            _ => None,
        }
    }

    pub fn into_config(self) -> Option<Configuration> {
        match self {
            Suggestion::Config(config) => Some(config),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Suggestion::Finished)
    }
}

/// Suggest/complete protocol between a trial driver and a search algorithm.
///
/// Calls must not overlap; the caller provides any synchronization.
pub trait Searcher {
    /// Human-readable searcher name.
    fn name(&self) -> &str;

    /// The result attribute being optimized.
    fn metric(&self) -> Option<&str>;

    /// Whether the metric is minimized or maximized.
    fn mode(&self) -> Option<Mode>;

    /// Fill in metric and mode if they were not given at construction.
    /// Returns `false` (and changes nothing) when either is already set.
    fn set_search_properties(&mut self, metric: Option<&str>, mode: Option<Mode>) -> bool;

    /// Propose a configuration for `trial_id`.
    fn suggest(&mut self, trial_id: &str) -> CfResult<Suggestion>;

    /// Report the result of a trial issued by [`Searcher::suggest`].
    fn on_trial_complete(&mut self, trial_id: &str, result: &dyn MetricSource) -> CfResult<()>;

    /// Report that a trial failed or was cancelled without a result.
    fn on_trial_error(&mut self, trial_id: &str) -> CfResult<()>;

    /// Persist the complete searcher state to `path`.
    fn save(&self, path: &Path) -> CfResult<()>;

    /// Replace the searcher state with the one saved at `path`.
    fn restore(&mut self, path: &Path) -> CfResult<()>;

    /// Save under `dir` using the indexed checkpoint file name.
    fn save_to_dir(&self, dir: &Path, index: usize) -> CfResult<PathBuf> {
        let path = checkpoint_path(dir, index);
        self.save(&path)?;
        Ok(path)
    }

    fn restore_from_dir(&mut self, dir: &Path, index: usize) -> CfResult<()> {
        self.restore(&checkpoint_path(dir, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_results_expose_numeric_keys_only() {
        let result = json!({
            "loss": 0.25,
            "time_total_s": 12,
            "config/conv": 3,
            "note": "fast"
        });
        assert_eq!(result.metric_value("loss"), Some(0.25));
        assert_eq!(result.metric_value("time_total_s"), Some(12.0));
        assert_eq!(result.metric_value("note"), None);
        assert_eq!(result.metric_value("missing"), None);
        assert_eq!(json!([1, 2]).metric_value("loss"), None);
    }

    #[test]
    fn map_results() {
        let mut result = HashMap::new();
        result.insert("loss".to_string(), 1.5);
        assert_eq!(result.metric_value("loss"), Some(1.5));

        let ordered: BTreeMap<String, f64> = [("acc".to_string(), 0.9)].into_iter().collect();
        assert_eq!(ordered.metric_value("acc"), Some(0.9));
    }

    #[test]
    fn suggestion_accessors() {
        let config = Configuration::new().with("x", 1i64);
        let suggestion = Suggestion::Config(config.clone());
        assert_eq!(suggestion.config(), Some(&config));
        assert!(!suggestion.is_finished());
        assert_eq!(suggestion.into_config(), Some(config));

        assert!(Suggestion::Finished.is_finished());
        assert_eq!(Suggestion::Deferred.into_config(), None);
    }
}
