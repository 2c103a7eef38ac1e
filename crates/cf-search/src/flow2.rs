//! FLOW2-style local search around an incumbent configuration.
//!
//! An engine starts from a seed configuration, then perturbs one dimension
//! of its incumbent at a time. Accepted moves grow that dimension's step and
//! keep going the same way; rejected moves shrink it and try the opposite
//! direction once before the sweep moves on. The engine converges when it
//! runs out of patience or every dimension sits at its resolution floor.

use cf_types::{ConfigError, ProtocolError};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Configuration;
use crate::rng_util::keyed_rng;
use crate::space::{sample_dimensions, Dimension, Direction};
use crate::trial::EngineId;

/// Step-size tunables, all in normalized units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSearchConfig {
    pub initial_step: f64,
    /// Multiplier applied to a dimension's step after an accepted move.
    pub step_growth: f64,
    /// Multiplier applied to a dimension's step after a rejected move.
    pub step_shrink: f64,
    pub max_step: f64,
    /// Floor for continuous dimensions; discrete ones floor at one unit.
    pub min_float_step: f64,
    /// Consecutive non-improving trials tolerated before converging.
    /// Defaults to four per movable dimension (both directions, twice).
    pub patience: Option<usize>,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            initial_step: 0.1,
            step_growth: 2.0,
            step_shrink: 0.5,
            max_step: 1.0,
            min_float_step: 1e-4,
            patience: None,
        }
    }
}

impl LocalSearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::InvalidSetting(msg.to_string()));
        if !(self.max_step > 0.0 && self.max_step <= 1.0) {
            return invalid("max_step must be in (0, 1]");
        }
        if !(self.initial_step > 0.0 && self.initial_step <= self.max_step) {
            return invalid("initial_step must be in (0, max_step]");
        }
        if !(self.min_float_step > 0.0 && self.min_float_step <= self.initial_step) {
            return invalid("min_float_step must be in (0, initial_step]");
        }
        if !(self.step_growth >= 1.0) {
            return invalid("step_growth must be at least 1");
        }
        if !(self.step_shrink > 0.0 && self.step_shrink < 1.0) {
            return invalid("step_shrink must be in (0, 1)");
        }
        Ok(())
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = Some(patience);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    /// The seed configuration has not produced a result yet.
    Seeding,
    /// Perturbing around an incumbent.
    Exploring,
    /// No further suggestions.
    Converged,
}

/// What an engine answers to a suggestion request.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSuggestion {
    Config(Configuration),
    /// A previous suggestion is still awaiting its result.
    Busy,
    Converged,
}

/// How a reported result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The seed's result established the first incumbent.
    Seeded,
    Accepted,
    Rejected,
}

/// Guards the speed denominator when no cost was reported since the last
/// improvement.
const SPEED_EPS: f64 = 1e-10;

/// Cumulative cost accounting for one engine.
///
/// Tracks the total cost spent, the cost totals at the last two improvements
/// and the resulting improvement speed: objective gained per unit of cost
/// since the previous best.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostStats {
    total: f64,
    last: f64,
    /// `total` when the current best was reached.
    best_at: f64,
    /// `total` when the previous best was reached.
    previous_best_at: f64,
    best: Option<f64>,
    previous_best: Option<f64>,
    speed: f64,
}

impl CostStats {
    /// Account for one finished trial. Missing costs count as zero; a missing
    /// objective never improves.
    pub fn record(&mut self, objective: Option<f64>, cost: Option<f64>) {
        let cost = cost.filter(|c| c.is_finite()).map_or(0.0, |c| c.max(0.0));
        self.last = cost;
        self.total += cost;

        if let Some(objective) = objective.filter(|v| v.is_finite()) {
            if self.best.map_or(true, |best| objective < best) {
                self.previous_best_at = self.best_at;
                self.best_at = self.total;
                self.previous_best = self.best.or(Some(objective));
                self.best = Some(objective);
            }
        }

        self.speed = match (self.previous_best, self.best) {
            (Some(previous), Some(best)) if previous > best => {
                (previous - best) / (self.total - self.previous_best_at + SPEED_EPS)
            }
            _ => 0.0,
        };
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    /// Objective improvement per unit cost; zero until two improvements.
    pub fn speed(&self) -> f64 {
        self.speed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Move {
    dim: usize,
    direction: Direction,
    /// Try the opposite direction if this move is rejected.
    reversible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ProposalKind {
    Seed,
    Move(Move),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Proposal {
    trial_id: String,
    config: Configuration,
    kind: ProposalKind,
}

/// One local search instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSearch {
    id: EngineId,
    seed: u64,
    dims: Vec<Dimension>,
    settings: LocalSearchConfig,
    status: EngineStatus,
    seed_config: Configuration,
    incumbent: Option<Configuration>,
    best_objective: Option<f64>,
    incumbent_cost: Option<f64>,
    steps: Vec<f64>,
    floors: Vec<f64>,
    no_improvement: usize,
    /// Dimensions left in the current sweep; the next one is last.
    sweep: Vec<usize>,
    /// Move to try before continuing the sweep.
    follow_up: Option<Move>,
    pending: Option<Proposal>,
    completed: usize,
    cost_stats: CostStats,
}

impl LocalSearch {
    /// `seed_config` must be a complete configuration of `dims`.
    pub fn new(
        id: EngineId,
        seed: u64,
        dims: Vec<Dimension>,
        seed_config: Configuration,
        settings: LocalSearchConfig,
    ) -> Self {
        let floors: Vec<f64> = dims
            .iter()
            .map(|dim| dim.domain.resolution(settings.min_float_step).min(settings.max_step))
            .collect();
        let steps = floors
            .iter()
            .map(|floor| settings.initial_step.max(*floor))
            .collect();
        Self {
            id,
            seed,
            dims,
            settings,
            status: EngineStatus::Seeding,
            seed_config,
            incumbent: None,
            best_objective: None,
            incumbent_cost: None,
            steps,
            floors,
            no_improvement: 0,
            sweep: Vec::new(),
            follow_up: None,
            pending: None,
            completed: 0,
            cost_stats: CostStats::default(),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_converged(&self) -> bool {
        self.status == EngineStatus::Converged
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_trial(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.trial_id.as_str())
    }

    pub fn seed_config(&self) -> &Configuration {
        &self.seed_config
    }

    pub fn incumbent(&self) -> Option<&Configuration> {
        self.incumbent.as_ref()
    }

    /// Best objective reached from the incumbent, as a loss (lower is better).
    pub fn best_objective(&self) -> Option<f64> {
        self.best_objective
    }

    pub fn incumbent_cost(&self) -> Option<f64> {
        self.incumbent_cost
    }

    /// Current step per dimension, in search-space order.
    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    pub fn floors(&self) -> &[f64] {
        &self.floors
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn no_improvement(&self) -> usize {
        self.no_improvement
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn cost_stats(&self) -> &CostStats {
        &self.cost_stats
    }

    fn movable_dims(&self) -> usize {
        self.dims.iter().filter(|d| !d.domain.is_singleton()).count()
    }

    fn patience(&self) -> usize {
        self.settings
            .patience
            .unwrap_or(4 * self.movable_dims().max(1))
    }

    /// Propose the next configuration for `trial_id`.
    pub fn suggest(&mut self, trial_id: &str) -> EngineSuggestion {
        if self.status == EngineStatus::Converged {
            return EngineSuggestion::Converged;
        }
        if self.pending.is_some() {
            return EngineSuggestion::Busy;
        }

        let (config, kind) = match self.status {
            EngineStatus::Seeding => (self.seed_config.clone(), ProposalKind::Seed),
            _ => {
                let mut rng = keyed_rng(self.seed, trial_id);
                match self.next_move(&mut rng) {
                    Some((mv, config)) => (config, ProposalKind::Move(mv)),
                    None => {
                        self.converge("no dimension can move");
                        return EngineSuggestion::Converged;
                    }
                }
            }
        };

        self.pending = Some(Proposal {
            trial_id: trial_id.to_string(),
            config: config.clone(),
            kind,
        });
        EngineSuggestion::Config(config)
    }

    fn next_move<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(Move, Configuration)> {
        let incumbent = self.incumbent.clone()?;

        if let Some(mv) = self.follow_up.take() {
            if let Some(config) = self.apply(&incumbent, mv) {
                return Some((mv, config));
            }
            if mv.reversible {
                let back = Move {
                    direction: mv.direction.flip(),
                    reversible: false,
                    ..mv
                };
                if let Some(config) = self.apply(&incumbent, back) {
                    return Some((back, config));
                }
            }
        }

        // The rest of the current sweep, then at most one fresh sweep.
        for _ in 0..2 {
            while let Some(dim) = self.sweep.pop() {
                let direction = if rng.random_bool(0.5) {
                    Direction::Up
                } else {
                    Direction::Down
                };
                let first = Move {
                    dim,
                    direction,
                    reversible: true,
                };
                if let Some(config) = self.apply(&incumbent, first) {
                    return Some((first, config));
                }
                let second = Move {
                    dim,
                    direction: direction.flip(),
                    reversible: false,
                };
                if let Some(config) = self.apply(&incumbent, second) {
                    return Some((second, config));
                }
            }
            self.sweep = self.fresh_sweep(rng);
        }
        None
    }

    fn fresh_sweep<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dims.len())
            .filter(|&i| !self.dims[i].domain.is_singleton())
            .collect();
        order.shuffle(rng);
        order
    }

    fn apply(&self, incumbent: &Configuration, mv: Move) -> Option<Configuration> {
        let dim = &self.dims[mv.dim];
        let current = incumbent.get(&dim.name)?;
        let moved = dim.domain.perturb(current, self.steps[mv.dim], mv.direction)?;
        let mut config = incumbent.clone();
        config.insert(dim.name.clone(), moved);
        Some(config)
    }

    /// Apply the result of `trial_id`. `objective` is a loss; `None` or a
    /// non-finite value marks a failed trial, which counts as a rejection.
    /// Non-finite costs are treated as unreported.
    ///
    /// Unknown trial ids leave the engine untouched.
    pub fn on_result(
        &mut self,
        trial_id: &str,
        objective: Option<f64>,
        cost: Option<f64>,
    ) -> Result<Outcome, ProtocolError> {
        let proposal = match self.pending.take() {
            Some(p) if p.trial_id == trial_id => p,
            other => {
                self.pending = other;
                return Err(ProtocolError::UnknownTrial {
                    trial_id: trial_id.to_string(),
                });
            }
        };
        self.completed += 1;
        let objective = objective.filter(|v| v.is_finite());
        let cost = cost.filter(|c| c.is_finite());
        self.cost_stats.record(objective, cost);

        let outcome = match proposal.kind {
            ProposalKind::Seed => self.observe_seed(&proposal.trial_id, proposal.config, objective, cost),
            ProposalKind::Move(mv) => self.observe_move(proposal.config, mv, objective, cost),
        };
        self.check_convergence();
        Ok(outcome)
    }

    /// Record a failed trial.
    pub fn on_failure(&mut self, trial_id: &str) -> Result<Outcome, ProtocolError> {
        self.on_result(trial_id, None, None)
    }

    fn observe_seed(
        &mut self,
        trial_id: &str,
        config: Configuration,
        objective: Option<f64>,
        cost: Option<f64>,
    ) -> Outcome {
        match objective {
            Some(objective) => {
                debug!(engine = self.id, objective, "seed evaluated");
                self.incumbent = Some(config);
                self.best_objective = Some(objective);
                self.incumbent_cost = cost;
                self.status = EngineStatus::Exploring;
                Outcome::Seeded
            }
            None => {
                // Seed failed: try another starting point.
                self.no_improvement += 1;
                self.seed_config = sample_dimensions(&self.dims, &mut keyed_rng(self.seed, trial_id));
                Outcome::Rejected
            }
        }
    }

    fn observe_move(
        &mut self,
        config: Configuration,
        mv: Move,
        objective: Option<f64>,
        cost: Option<f64>,
    ) -> Outcome {
        if self.improves(objective, cost) {
            self.incumbent = Some(config);
            self.best_objective = objective;
            self.incumbent_cost = cost;
            self.steps[mv.dim] = (self.steps[mv.dim] * self.settings.step_growth).min(self.settings.max_step);
            self.no_improvement = 0;
            // Keep going the way that worked; stepping back is known to be worse.
            self.follow_up = Some(Move {
                reversible: false,
                ..mv
            });
            debug!(
                engine = self.id,
                dimension = %self.dims[mv.dim].name,
                step = self.steps[mv.dim],
                "move accepted"
            );
            Outcome::Accepted
        } else {
            self.steps[mv.dim] = (self.steps[mv.dim] * self.settings.step_shrink).max(self.floors[mv.dim]);
            self.no_improvement += 1;
            self.follow_up = mv.reversible.then(|| Move {
                direction: mv.direction.flip(),
                reversible: false,
                ..mv
            });
            Outcome::Rejected
        }
    }

    /// Strictly lower loss, or equal loss at strictly lower cost.
    fn improves(&self, objective: Option<f64>, cost: Option<f64>) -> bool {
        let (Some(objective), Some(best)) = (objective, self.best_objective) else {
            return false;
        };
        if objective < best {
            return true;
        }
        objective == best && matches!((cost, self.incumbent_cost), (Some(c), Some(ic)) if c < ic)
    }

    fn check_convergence(&mut self) {
        if self.status == EngineStatus::Converged {
            return;
        }
        if self.no_improvement > self.patience() {
            self.converge("patience exhausted");
            return;
        }
        let movable = self.movable_dims();
        let at_floor = self
            .dims
            .iter()
            .zip(self.steps.iter().zip(&self.floors))
            .filter(|(dim, _)| !dim.domain.is_singleton())
            .all(|(_, (step, floor))| step <= floor);
        if self.status == EngineStatus::Exploring && at_floor && self.no_improvement >= 2 * movable {
            self.converge("step sizes at resolution floor");
        }
    }

    fn converge(&mut self, reason: &str) {
        debug!(
            engine = self.id,
            reason,
            completed = self.completed,
            best = ?self.best_objective,
            "local search converged"
        );
        self.status = EngineStatus::Converged;
        self.sweep.clear();
        self.follow_up = None;
    }
}
