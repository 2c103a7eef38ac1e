//! # cf-search
//!
//! Cost-frugal hyperparameter search.
//!
//! Provides search space definitions, the FLOW2-style local search engine,
//! the CFO coordinator that restarts converged engines, and the
//! suggest/complete [`Searcher`] contract with checkpoint save and restore.

mod cfo;
mod checkpoint;
mod config;
mod flow2;
mod log_policy;
mod rng_util;
mod searcher;
mod space;
mod trial;

pub use cf_types::{CfError, CfResult, ConfigError, ParameterValue, ProtocolError};
pub use cfo::{Cfo, CfoBuilder, CfoConfig, CostModel, InsertionOrder, SpeedCost, WallTimeCost};
pub use checkpoint::{
    checkpoint_file_name, checkpoint_path, read_json, read_snapshot, write_json, CfoSnapshot,
    CKPT_FILE_PREFIX, SNAPSHOT_VERSION,
};
pub use config::Configuration;
pub use flow2::{
    CostStats, EngineStatus, EngineSuggestion, LocalSearch, LocalSearchConfig, Outcome,
};
pub use log_policy::LogPolicy;
pub use searcher::{MetricSource, Searcher, Suggestion};
pub use space::{
    Dimension, Direction, Domain, ParameterDef, ParameterKind, SearchSpace, NESTED_SEPARATOR,
};
pub use trial::{BestResult, EngineId, Mode, TrialRecord, TrialStatus};
