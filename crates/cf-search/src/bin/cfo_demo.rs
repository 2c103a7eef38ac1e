//! Drives a CFO search over a small neural-net style space with a random
//! objective, printing every tenth suggestion and the final best result.

use anyhow::Context;
use cf_search::{Cfo, Configuration, Mode, Searcher, SearchSpace, Suggestion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TRIALS: usize = 100;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let seed = match std::env::var("CFO_DEMO_SEED") {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("CFO_DEMO_SEED must be an unsigned integer, got {raw:?}"))?,
        Err(_) => 0,
    };

    let space = SearchSpace::new()
        .add_int("batch", 16, 32)
        .add_categorical("conv", vec![json!(2), json!(3), json!(5), json!(7)])
        .add_float("dropout", 0.5, 0.9)
        .add_log_float("lr", 1e-4, 1e-1)
        .add_log_int("hidden", 32, 1024);
    let low_cost = Configuration::new()
        .with("batch", 32i64)
        .with("conv", json!(3))
        .with("dropout", 0.5)
        .with("lr", 0.001)
        .with("hidden", 128i64);

    let mut searcher = Cfo::builder(space)
        .with_low_cost_config(low_cost)
        .with_metric("loss")
        .with_mode(Mode::Min)
        .with_seed(seed)
        .build()?;

    // Stand-in for training: the searcher only sees what a trainer would report.
    let mut trainer = ChaCha8Rng::seed_from_u64(seed);

    for i in 0..TRIALS {
        let trial_id = i.to_string();
        let config = match searcher.suggest(&trial_id)? {
            Suggestion::Config(config) => config,
            Suggestion::Deferred => continue,
            Suggestion::Finished => {
                info!(trials = i, "searcher finished early");
                break;
            }
        };
        if reports(i) {
            println!("trial {trial_id}: {config}");
        }

        let mut result = Map::new();
        result.insert("loss".to_string(), json!(trainer.random_range(0.0..1.0)));
        result.insert("time_total_s".to_string(), json!(trainer.random_range(1.0..60.0)));
        for (name, value) in config.iter() {
            let echoed = serde_json::to_value(value)?;
            result.insert(format!("config/{name}"), echoed);
        }
        searcher.on_trial_complete(&trial_id, &Value::Object(result))?;
    }

    match searcher.best_result() {
        Some(best) => println!(
            "best trial {} with loss {:.4}: {}",
            best.trial_id, best.metric, best.config
        ),
        None => println!("no trial completed"),
    }
    Ok(())
}

/// Print every tenth trial, counting from the first.
fn reports(i: usize) -> bool {
    i % 10 == 9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_the_tenth_trial_of_each_block() {
        let reported: Vec<usize> = (0..30).filter(|&i| reports(i)).collect();
        assert_eq!(reported, vec![9, 19, 29]);
    }
}
