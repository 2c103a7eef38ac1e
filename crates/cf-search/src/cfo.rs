//! The cost-frugal coordinator.
//!
//! Owns a pool of [`LocalSearch`] engines. The first engine starts at the
//! user's low-cost configuration; further engines are restarts from random
//! samples, spawned when every live engine has converged (or is busy and
//! the pool has room). Suggestions go to the idle engine with the best
//! incumbent, ties broken by a [`CostModel`] and then by age.

use cf_types::{config_error, internal_error, CfError, CfResult, ConfigError, ProtocolError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{read_snapshot, write_json, CfoSnapshot, SNAPSHOT_VERSION};
use crate::config::Configuration;
use crate::flow2::{EngineSuggestion, LocalSearch, LocalSearchConfig};
use crate::log_policy::LogPolicy;
use crate::rng_util::{keyed_rng, mix};
use crate::searcher::{MetricSource, Searcher, Suggestion};
use crate::space::{sample_dimensions, Dimension, SearchSpace};
use crate::trial::{BestResult, EngineId, Mode, TrialRecord};

const SEARCHER_NAME: &str = "CFO";

/// Estimates how expensive it is to keep exploring around an engine's
/// incumbent. Lower is preferred.
pub trait CostModel: std::fmt::Debug + Send + Sync {
    fn estimate(&self, engine: &LocalSearch) -> f64;

    fn name(&self) -> &str;
}

/// Cost of the trial that produced the incumbent, as reported under the
/// configured cost attribute (wall time by default). Unknown costs rank last.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallTimeCost;

impl CostModel for WallTimeCost {
    fn estimate(&self, engine: &LocalSearch) -> f64 {
        engine.incumbent_cost().unwrap_or(f64::INFINITY)
    }

    fn name(&self) -> &str {
        "wall_time"
    }
}

/// Cost of one more unit of objective improvement, from the engine's
/// cumulative [`CostStats`](crate::flow2::CostStats): the faster an engine
/// has been improving per unit of cost, the lower its estimate. Engines
/// without two improvements yet rank last.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedCost;

impl CostModel for SpeedCost {
    fn estimate(&self, engine: &LocalSearch) -> f64 {
        let speed = engine.cost_stats().speed();
        if speed > 0.0 {
            1.0 / speed
        } else {
            f64::INFINITY
        }
    }

    fn name(&self) -> &str {
        "speed"
    }
}

/// Ignores cost; ties fall through to the oldest engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertionOrder;

impl CostModel for InsertionOrder {
    fn estimate(&self, _engine: &LocalSearch) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "insertion_order"
    }
}

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfoConfig {
    /// Root seed; every engine and restart derives its stream from it.
    pub seed: u64,

    /// How many unconverged engines may exist at once. With more than one,
    /// a new engine is spawned when all live ones are waiting on results.
    pub max_live_engines: usize,

    /// Engines spawned after the initial one. `None` means unbounded.
    pub max_restarts: Option<usize>,

    /// Result attribute holding the trial's cost.
    pub cost_attr: String,

    pub local_search: LocalSearchConfig,
}

impl Default for CfoConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_live_engines: 1,
            max_restarts: Some(16),
            cost_attr: "time_total_s".to_string(),
            local_search: LocalSearchConfig::default(),
        }
    }
}

impl CfoConfig {
    pub fn validate(&self) -> CfResult<()> {
        if self.max_live_engines == 0 {
            return Err(config_error!("max_live_engines must be at least 1"));
        }
        if self.cost_attr.is_empty() {
            return Err(config_error!("cost_attr must not be empty"));
        }
        self.local_search.validate()?;
        Ok(())
    }
}

/// Builder for [`Cfo`].
#[derive(Debug)]
pub struct CfoBuilder {
    space: SearchSpace,
    low_cost: Configuration,
    metric: Option<String>,
    mode: Option<Mode>,
    config: CfoConfig,
    cost_model: Box<dyn CostModel>,
    log_policy: LogPolicy,
}

impl CfoBuilder {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            low_cost: Configuration::new(),
            metric: None,
            mode: None,
            config: CfoConfig::default(),
            cost_model: Box::new(WallTimeCost),
            log_policy: LogPolicy::new(),
        }
    }

    /// Known-cheap starting point; parameters it omits are sampled.
    pub fn with_low_cost_config(mut self, config: Configuration) -> Self {
        self.low_cost = config;
        self
    }

    pub fn with_metric(mut self, metric: &str) -> Self {
        self.metric = Some(metric.to_string());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_config(mut self, config: CfoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_max_live_engines(mut self, n: usize) -> Self {
        self.config.max_live_engines = n;
        self
    }

    pub fn with_max_restarts(mut self, n: Option<usize>) -> Self {
        self.config.max_restarts = n;
        self
    }

    pub fn with_cost_attr(mut self, attr: &str) -> Self {
        self.config.cost_attr = attr.to_string();
        self
    }

    pub fn with_local_search(mut self, local_search: LocalSearchConfig) -> Self {
        self.config.local_search = local_search;
        self
    }

    pub fn with_cost_model(mut self, cost_model: impl CostModel + 'static) -> Self {
        self.cost_model = Box::new(cost_model);
        self
    }

    pub fn with_log_policy(mut self, log_policy: LogPolicy) -> Self {
        self.log_policy = log_policy;
        self
    }

    /// Validate the space and settings. A space with nested definitions is
    /// accepted here but refused at the first `suggest`.
    pub fn build(self) -> CfResult<Cfo> {
        self.space.validate()?;
        self.config.validate()?;
        if self.space.is_resolved() {
            self.low_cost.validate_partial(&self.space.dimensions()?)?;
        }

        Ok(Cfo {
            id: Uuid::new_v4(),
            space: self.space,
            low_cost: self.low_cost,
            metric: self.metric,
            mode: self.mode,
            config: self.config,
            started: false,
            engines: BTreeMap::new(),
            next_engine_id: 0,
            restarts: 0,
            retired: 0,
            trials: BTreeMap::new(),
            best: None,
            cost_model: self.cost_model,
            log_policy: self.log_policy,
        })
    }
}

/// Cost-frugal optimizer: a pool of local searches behind the
/// [`Searcher`] contract.
#[derive(Debug)]
pub struct Cfo {
    id: Uuid,
    space: SearchSpace,
    low_cost: Configuration,
    metric: Option<String>,
    mode: Option<Mode>,
    config: CfoConfig,
    started: bool,
    engines: BTreeMap<EngineId, LocalSearch>,
    next_engine_id: EngineId,
    restarts: usize,
    retired: usize,
    trials: BTreeMap<String, TrialRecord>,
    best: Option<BestResult>,
    cost_model: Box<dyn CostModel>,
    log_policy: LogPolicy,
}

impl Cfo {
    pub fn builder(space: SearchSpace) -> CfoBuilder {
        CfoBuilder::new(space)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn config(&self) -> &CfoConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &dyn CostModel {
        self.cost_model.as_ref()
    }

    /// Best result observed so far, with the metric as reported.
    pub fn best_result(&self) -> Option<&BestResult> {
        self.best.as_ref()
    }

    pub fn best_config(&self) -> Option<&Configuration> {
        self.best.as_ref().map(|best| &best.config)
    }

    /// Engines that have not converged, oldest first.
    pub fn engines(&self) -> impl Iterator<Item = &LocalSearch> {
        self.engines.values()
    }

    pub fn engine(&self, id: EngineId) -> Option<&LocalSearch> {
        self.engines.get(&id)
    }

    /// Engine that issued a still-pending trial.
    pub fn trial_engine(&self, trial_id: &str) -> Option<EngineId> {
        self.trials.get(trial_id).map(|record| record.engine_id)
    }

    pub fn pending_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Engines that converged and left the pool.
    pub fn retired(&self) -> usize {
        self.retired
    }

    fn objective(&self) -> CfResult<(String, Mode)> {
        match (&self.metric, self.mode) {
            (Some(metric), Some(mode)) => Ok((metric.clone(), mode)),
            (metric, mode) => Err(ConfigError::UndefinedMetricMode {
                searcher: SEARCHER_NAME.to_string(),
                metric: metric.clone().unwrap_or_else(|| "None".to_string()),
                mode: mode.map_or_else(|| "None".to_string(), |m| m.to_string()),
            }
            .into()),
        }
    }

    fn dimensions(&self) -> CfResult<Vec<Dimension>> {
        Ok(self.space.dimensions()?)
    }

    fn ensure_started(&mut self) -> CfResult<()> {
        if self.started {
            return Ok(());
        }
        let dims = self.dimensions()?;
        let start = Configuration::merge_low_cost(
            &dims,
            &self.low_cost,
            &mut keyed_rng(self.config.seed, "low-cost"),
        )?;
        info!(
            searcher = %self.id,
            dimensions = dims.len(),
            start = %start,
            "search started from low-cost configuration"
        );
        self.add_engine(dims, start);
        self.started = true;
        Ok(())
    }

    fn add_engine(&mut self, dims: Vec<Dimension>, start: Configuration) -> EngineId {
        let id = self.next_engine_id;
        self.next_engine_id += 1;
        let seed = mix(self.config.seed, &format!("engine-{id}"));
        let engine = LocalSearch::new(id, seed, dims, start, self.config.local_search.clone());
        self.engines.insert(id, engine);
        id
    }

    /// Idle, unconverged engine with the best incumbent. Engines without an
    /// incumbent yet go first so their seed is evaluated promptly.
    fn select_engine(&self) -> Option<EngineId> {
        self.engines
            .values()
            .filter(|engine| !engine.is_converged() && !engine.is_busy())
            .min_by(|a, b| {
                let loss_a = a.best_objective().unwrap_or(f64::NEG_INFINITY);
                let loss_b = b.best_objective().unwrap_or(f64::NEG_INFINITY);
                loss_a
                    .partial_cmp(&loss_b)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| {
                        self.cost_model
                            .estimate(a)
                            .partial_cmp(&self.cost_model.estimate(b))
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| a.id().cmp(&b.id()))
            })
            .map(LocalSearch::id)
    }

    fn spawn_restart(&mut self) -> CfResult<Option<EngineId>> {
        let live = self.engines.values().filter(|e| !e.is_converged()).count();
        if live >= self.config.max_live_engines {
            return Ok(None);
        }
        if matches!(self.config.max_restarts, Some(max) if self.restarts >= max) {
            return Ok(None);
        }
        let dims = self.dimensions()?;
        let start = sample_dimensions(
            &dims,
            &mut keyed_rng(self.config.seed, &format!("restart-{}", self.next_engine_id)),
        );
        let id = self.add_engine(dims, start);
        self.restarts += 1;
        info!(engine = id, restarts = self.restarts, live = live + 1, "spawned local search");
        Ok(Some(id))
    }

    fn retire(&mut self, id: EngineId) {
        if let Some(engine) = self.engines.remove(&id) {
            self.retired += 1;
            info!(
                engine = id,
                trials = engine.completed(),
                best = ?engine.best_objective(),
                "local search converged and retired"
            );
        }
    }

    fn report(&mut self, error: ProtocolError) -> CfError {
        let key = error.to_string();
        if self.log_policy.should_log(&key) {
            warn!(searcher = %self.id, "{key}");
        }
        error.into()
    }

    fn take_trial(&mut self, trial_id: &str) -> CfResult<TrialRecord> {
        match self.trials.remove(trial_id) {
            Some(record) => Ok(record),
            None => Err(self.report(ProtocolError::UnknownTrial {
                trial_id: trial_id.to_string(),
            })),
        }
    }

    /// Full state for checkpointing.
    pub fn snapshot(&self) -> CfoSnapshot {
        CfoSnapshot {
            version: SNAPSHOT_VERSION,
            searcher_id: self.id,
            saved_at: chrono::Utc::now(),
            space: self.space.clone(),
            low_cost: self.low_cost.clone(),
            metric: self.metric.clone(),
            mode: self.mode,
            config: self.config.clone(),
            started: self.started,
            engines: self.engines.values().cloned().collect(),
            next_engine_id: self.next_engine_id,
            restarts: self.restarts,
            retired: self.retired,
            trials: self.trials.values().cloned().collect(),
            best: self.best.clone(),
        }
    }

    /// Replace all search state with `snapshot`. The cost model and log
    /// policy of this instance are kept.
    pub fn apply_snapshot(&mut self, snapshot: CfoSnapshot) {
        self.id = snapshot.searcher_id;
        self.space = snapshot.space;
        self.low_cost = snapshot.low_cost;
        self.metric = snapshot.metric;
        self.mode = snapshot.mode;
        self.config = snapshot.config;
        self.started = snapshot.started;
        self.engines = snapshot
            .engines
            .into_iter()
            .map(|engine| (engine.id(), engine))
            .collect();
        self.next_engine_id = snapshot.next_engine_id;
        self.restarts = snapshot.restarts;
        self.retired = snapshot.retired;
        self.trials = snapshot
            .trials
            .into_iter()
            .map(|record| (record.trial_id.clone(), record))
            .collect();
        self.best = snapshot.best;
        self.log_policy.reset();
    }
}

impl Searcher for Cfo {
    fn name(&self) -> &str {
        SEARCHER_NAME
    }

    fn metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    fn mode(&self) -> Option<Mode> {
        self.mode
    }

    fn set_search_properties(&mut self, metric: Option<&str>, mode: Option<Mode>) -> bool {
        if self.metric.is_some() || self.mode.is_some() {
            return false;
        }
        self.metric = metric.map(str::to_string);
        self.mode = mode;
        true
    }

    fn suggest(&mut self, trial_id: &str) -> CfResult<Suggestion> {
        self.objective()?;
        self.ensure_started()?;
        if self.trials.contains_key(trial_id) {
            return Err(self.report(ProtocolError::DuplicateTrial {
                trial_id: trial_id.to_string(),
            }));
        }

        loop {
            let engine_id = match self.select_engine() {
                Some(id) => id,
                None => match self.spawn_restart()? {
                    Some(id) => id,
                    None if self.engines.values().any(LocalSearch::is_busy) => {
                        debug!(trial = trial_id, "all engines awaiting results");
                        return Ok(Suggestion::Deferred);
                    }
                    None => {
                        info!(
                            searcher = %self.id,
                            restarts = self.restarts,
                            best = ?self.best.as_ref().map(|b| b.metric),
                            "search finished"
                        );
                        return Ok(Suggestion::Finished);
                    }
                },
            };

            let engine = self
                .engines
                .get_mut(&engine_id)
                .ok_or_else(|| internal_error!("engine {engine_id} missing from pool"))?;
            match engine.suggest(trial_id) {
                EngineSuggestion::Config(config) => {
                    debug!(trial = trial_id, engine = engine_id, config = %config, "suggested");
                    self.trials.insert(
                        trial_id.to_string(),
                        TrialRecord::new(trial_id, engine_id, config.clone()),
                    );
                    return Ok(Suggestion::Config(config));
                }
                EngineSuggestion::Converged => self.retire(engine_id),
                EngineSuggestion::Busy => {
                    return Err(internal_error!("engine {engine_id} selected while busy"));
                }
            }
        }
    }

    fn on_trial_complete(&mut self, trial_id: &str, result: &dyn MetricSource) -> CfResult<()> {
        if !self.trials.contains_key(trial_id) {
            return Err(self.report(ProtocolError::UnknownTrial {
                trial_id: trial_id.to_string(),
            }));
        }
        let (metric, mode) = self.objective()?;
        let Some(value) = result.metric_value(&metric) else {
            return Err(self.report(ProtocolError::MissingMetric {
                trial_id: trial_id.to_string(),
                metric,
            }));
        };
        let cost = result
            .metric_value(&self.config.cost_attr)
            .filter(|c| c.is_finite());

        let mut record = self.take_trial(trial_id)?;
        let objective = if value.is_finite() {
            record.mark_completed();
            Some(mode.sign() * value)
        } else {
            warn!(trial = trial_id, metric = value, "non-finite metric treated as a failed trial");
            record.mark_failed();
            None
        };
        let engine = self
            .engines
            .get_mut(&record.engine_id)
            .ok_or_else(|| internal_error!("engine {} missing from pool", record.engine_id))?;
        let outcome = engine.on_result(trial_id, objective, cost)?;
        let converged = engine.is_converged();
        debug!(
            trial = trial_id,
            engine = record.engine_id,
            ?outcome,
            metric = value,
            turnaround_ms = ?record.turnaround_ms(),
            "trial completed"
        );

        let candidate = BestResult {
            trial_id: trial_id.to_string(),
            config: record.config,
            metric: value,
        };
        if objective.is_some() && BestResult::update(&mut self.best, candidate, mode) {
            info!(trial = trial_id, metric = value, "new best result");
        }
        if converged {
            self.retire(record.engine_id);
        }
        Ok(())
    }

    fn on_trial_error(&mut self, trial_id: &str) -> CfResult<()> {
        let mut record = self.take_trial(trial_id)?;
        record.mark_failed();
        let engine = self
            .engines
            .get_mut(&record.engine_id)
            .ok_or_else(|| internal_error!("engine {} missing from pool", record.engine_id))?;
        engine.on_failure(trial_id)?;
        let converged = engine.is_converged();
        warn!(trial = trial_id, engine = record.engine_id, "trial failed");
        if converged {
            self.retire(record.engine_id);
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> CfResult<()> {
        write_json(path, &self.snapshot())?;
        debug!(searcher = %self.id, path = %path.display(), "checkpoint saved");
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> CfResult<()> {
        let snapshot = read_snapshot(path)?;
        self.apply_snapshot(snapshot);
        info!(
            searcher = %self.id,
            path = %path.display(),
            engines = self.engines.len(),
            pending = self.trials.len(),
            "checkpoint restored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_types::ParameterValue;
    use std::collections::HashMap;
    use serde_json::json;

    fn int_space() -> SearchSpace {
        SearchSpace::new().add_int("x", 16, 32)
    }

    fn cfo(space: SearchSpace) -> CfoBuilder {
        Cfo::builder(space)
            .with_metric("loss")
            .with_mode(Mode::Min)
            .with_log_policy(LogPolicy::disabled())
    }

    fn config_of(suggestion: Suggestion) -> Configuration {
        match suggestion {
            Suggestion::Config(config) => config,
            other => panic!("expected a configuration, got {other:?}"),
        }
    }

    fn loss(value: f64) -> serde_json::Value {
        json!({ "loss": value })
    }

    #[test]
    fn first_suggestion_is_the_low_cost_config() {
        let mut searcher = cfo(int_space())
            .with_low_cost_config(Configuration::new().with("x", 32i64))
            .build()
            .unwrap();
        let config = config_of(searcher.suggest("0").unwrap());
        assert_eq!(config, Configuration::new().with("x", 32i64));
        assert_eq!(searcher.trial_engine("0"), Some(0));
    }

    #[test]
    fn missing_metric_or_mode_fails_at_suggest() {
        let mut searcher = Cfo::builder(int_space()).build().unwrap();
        let err = searcher.suggest("0").unwrap_err();
        assert!(matches!(
            err,
            CfError::Config(ConfigError::UndefinedMetricMode { .. })
        ));

        assert!(searcher.set_search_properties(Some("loss"), Some(Mode::Min)));
        assert!(!searcher.set_search_properties(Some("acc"), Some(Mode::Max)));
        assert_eq!(searcher.metric(), Some("loss"));
        assert!(searcher.suggest("0").is_ok());
    }

    #[test]
    fn unresolved_space_fails_at_suggest() {
        let space = SearchSpace::new().add_nested("opt", SearchSpace::new().add_float("lr", 0.0, 1.0));
        let mut searcher = cfo(space).build().unwrap();
        assert!(matches!(
            searcher.suggest("0"),
            Err(CfError::Config(ConfigError::UnresolvedSearchSpace { .. }))
        ));
    }

    #[test]
    fn invalid_settings_fail_at_build() {
        assert!(cfo(int_space()).with_max_live_engines(0).build().is_err());
        assert!(cfo(SearchSpace::new().add_log_float("lr", 0.0, 1.0)).build().is_err());
        assert!(cfo(int_space())
            .with_low_cost_config(Configuration::new().with("y", 1i64))
            .build()
            .is_err());
    }

    #[test]
    fn busy_single_engine_defers() {
        let mut searcher = cfo(int_space()).build().unwrap();
        config_of(searcher.suggest("0").unwrap());
        assert_eq!(searcher.suggest("1").unwrap(), Suggestion::Deferred);

        searcher.on_trial_complete("0", &loss(1.0)).unwrap();
        config_of(searcher.suggest("1").unwrap());
    }

    #[test]
    fn duplicate_trial_id_is_a_protocol_error() {
        let mut searcher = cfo(int_space()).build().unwrap();
        config_of(searcher.suggest("0").unwrap());
        let err = searcher.suggest("0").unwrap_err();
        assert!(matches!(
            err,
            CfError::Protocol(ProtocolError::DuplicateTrial { .. })
        ));
    }

    #[test]
    fn missing_metric_in_result_leaves_trial_pending() {
        let mut searcher = cfo(int_space()).build().unwrap();
        config_of(searcher.suggest("0").unwrap());
        let err = searcher
            .on_trial_complete("0", &json!({ "accuracy": 0.3 }))
            .unwrap_err();
        assert!(matches!(
            err,
            CfError::Protocol(ProtocolError::MissingMetric { .. })
        ));
        assert_eq!(searcher.pending_trials(), 1);
        searcher.on_trial_complete("0", &loss(0.3)).unwrap();
        assert_eq!(searcher.pending_trials(), 0);
    }

    fn two_engines() -> CfoBuilder {
        cfo(SearchSpace::new().add_float("x", 0.0, 1.0))
            .with_low_cost_config(Configuration::new().with("x", 0.5))
            .with_max_live_engines(2)
    }

    #[test]
    fn parallel_engines_prefer_the_cheaper_incumbent() {
        let run = |builder: CfoBuilder| {
            let mut searcher = builder.build().unwrap();

            config_of(searcher.suggest("0").unwrap());
            config_of(searcher.suggest("1").unwrap());
            assert_eq!(searcher.trial_engine("1"), Some(1));
            assert_eq!(searcher.restarts(), 1);

            searcher
                .on_trial_complete("0", &json!({ "loss": 1.0, "time_total_s": 50.0 }))
                .unwrap();
            searcher
                .on_trial_complete("1", &json!({ "loss": 1.0, "time_total_s": 5.0 }))
                .unwrap();
            config_of(searcher.suggest("2").unwrap());
            searcher.trial_engine("2")
        };

        assert_eq!(run(two_engines()), Some(1));
        assert_eq!(run(two_engines().with_cost_model(InsertionOrder)), Some(0));
    }

    #[test]
    fn better_incumbent_wins_over_cost() {
        let mut searcher = two_engines().build().unwrap();
        config_of(searcher.suggest("0").unwrap());
        config_of(searcher.suggest("1").unwrap());
        searcher
            .on_trial_complete("0", &json!({ "loss": 0.5, "time_total_s": 50.0 }))
            .unwrap();
        searcher
            .on_trial_complete("1", &json!({ "loss": 1.0, "time_total_s": 5.0 }))
            .unwrap();
        config_of(searcher.suggest("2").unwrap());
        assert_eq!(searcher.trial_engine("2"), Some(0));
    }

    #[test]
    fn speed_cost_prefers_the_engine_improving_fastest_per_cost() {
        let run = |builder: CfoBuilder| {
            let mut searcher = builder.build().unwrap();
            config_of(searcher.suggest("0").unwrap());
            config_of(searcher.suggest("1").unwrap());
            searcher
                .on_trial_complete("0", &json!({ "loss": 2.0, "time_total_s": 1.0 }))
                .unwrap();
            searcher
                .on_trial_complete("1", &json!({ "loss": 1.5, "time_total_s": 1.0 }))
                .unwrap();

            // Engine 1 has the better seed, so it moves first; engine 0 takes
            // the next trial while engine 1 is busy.
            config_of(searcher.suggest("2").unwrap());
            config_of(searcher.suggest("3").unwrap());
            assert_eq!(searcher.trial_engine("2"), Some(1));
            assert_eq!(searcher.trial_engine("3"), Some(0));

            // Both reach loss 1.0. Engine 0 gained 1.0 for 0.8; engine 1
            // gained 0.5 for 0.5, but its incumbent was cheaper.
            searcher
                .on_trial_complete("3", &json!({ "loss": 1.0, "time_total_s": 0.8 }))
                .unwrap();
            searcher
                .on_trial_complete("2", &json!({ "loss": 1.0, "time_total_s": 0.5 }))
                .unwrap();
            let speed_0 = searcher.engine(0).unwrap().cost_stats().speed();
            let speed_1 = searcher.engine(1).unwrap().cost_stats().speed();
            assert!((speed_0 - 1.25).abs() < 1e-6, "speed_0 = {speed_0}");
            assert!((speed_1 - 1.0).abs() < 1e-6, "speed_1 = {speed_1}");

            config_of(searcher.suggest("4").unwrap());
            searcher.trial_engine("4")
        };

        assert_eq!(run(two_engines().with_cost_model(SpeedCost)), Some(0));
        assert_eq!(run(two_engines()), Some(1));
    }

    #[test]
    fn extreme_integer_ranges_are_searchable() {
        let space = SearchSpace::new()
            .add_int("wide", i64::MIN, i64::MAX)
            .add_log_int("huge", 1, i64::MAX);
        let mut searcher = cfo(space).build().unwrap();
        for i in 0..20 {
            let id = i.to_string();
            let config = config_of(searcher.suggest(&id).unwrap());
            assert!(config.get("wide").and_then(ParameterValue::as_i64).is_some());
            let huge = config.get("huge").and_then(ParameterValue::as_i64).unwrap();
            assert!(huge >= 1);
            searcher.on_trial_complete(&id, &loss(i as f64)).unwrap();
        }
    }

    #[test]
    fn infinite_float_bounds_fail_at_build() {
        let err = cfo(SearchSpace::new().add_float("x", 0.0, f64::INFINITY))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            CfError::Config(ConfigError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn non_finite_metric_counts_as_a_failed_trial() {
        let mut searcher = cfo(int_space())
            .with_low_cost_config(Configuration::new().with("x", 32i64))
            .build()
            .unwrap();
        config_of(searcher.suggest("0").unwrap());
        let result: HashMap<String, f64> = [
            ("loss".to_string(), f64::INFINITY),
            ("time_total_s".to_string(), f64::INFINITY),
        ]
        .into_iter()
        .collect();
        searcher.on_trial_complete("0", &result).unwrap();

        assert!(searcher.best_result().is_none());
        let engine = searcher.engine(0).unwrap();
        assert_eq!(engine.best_objective(), None);
        assert_eq!(engine.cost_stats().total(), 0.0);
        assert_eq!(searcher.pending_trials(), 0);
        config_of(searcher.suggest("1").unwrap());
    }

    #[test]
    fn maximize_mode_tracks_the_largest_metric() {
        let mut searcher = Cfo::builder(int_space())
            .with_metric("acc")
            .with_mode(Mode::Max)
            .with_low_cost_config(Configuration::new().with("x", 32i64))
            .build()
            .unwrap();
        config_of(searcher.suggest("0").unwrap());
        searcher.on_trial_complete("0", &json!({ "acc": 0.6 })).unwrap();
        let second = config_of(searcher.suggest("1").unwrap());
        searcher.on_trial_complete("1", &json!({ "acc": 0.8 })).unwrap();

        let best = searcher.best_result().unwrap();
        assert_eq!(best.metric, 0.8);
        assert_eq!(best.config, second);
        assert_eq!(searcher.engine(0).unwrap().incumbent(), Some(&second));
    }

    #[test]
    fn converged_engines_restart_then_finish() {
        let mut searcher = cfo(int_space())
            .with_low_cost_config(Configuration::new().with("x", 32i64))
            .with_max_restarts(Some(1))
            .build()
            .unwrap();

        let mut trial = 0;
        let finished = loop {
            let id = trial.to_string();
            match searcher.suggest(&id).unwrap() {
                Suggestion::Config(config) => {
                    assert!(matches!(config.get("x"), Some(ParameterValue::Int(v)) if (16..=32).contains(v)));
                    searcher.on_trial_complete(&id, &loss(1.0)).unwrap();
                }
                other => break other,
            }
            trial += 1;
            assert!(trial < 50, "search never finished");
        };

        assert_eq!(finished, Suggestion::Finished);
        assert_eq!(searcher.restarts(), 1);
        assert_eq!(searcher.retired(), 2);
        assert_eq!(searcher.engines().count(), 0);
        assert_eq!(searcher.best_result().unwrap().trial_id, "0");
        assert_eq!(searcher.suggest("late").unwrap(), Suggestion::Finished);
    }

    #[test]
    fn trial_errors_unblock_the_engine() {
        let mut searcher = cfo(int_space()).build().unwrap();
        config_of(searcher.suggest("0").unwrap());
        searcher.on_trial_error("0").unwrap();
        assert_eq!(searcher.pending_trials(), 0);
        assert!(searcher.best_result().is_none());
        config_of(searcher.suggest("1").unwrap());

        assert!(matches!(
            searcher.on_trial_error("0"),
            Err(CfError::Protocol(ProtocolError::UnknownTrial { .. }))
        ));
    }
}
