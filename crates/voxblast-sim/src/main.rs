//! Simulator binary: runs one full attack session against a scripted target
//! in a flat arena and prints the session stats as JSON.

mod host;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxblast_engine::{EngineConfig, Session};

use crate::host::{arena_world, default_target, SimHost};

const ARENA_HALF: i32 = 8;
const MAX_TICKS: u64 = 400;
const TICK_MS: u64 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "sim.toml".into());
    let (config, config_err) = match EngineConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(err) => (EngineConfig::default(), Some(err)),
    };

    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if let Some(err) = config_err {
        warn!(path = %config_path, %err, "config not loaded, using defaults");
    }

    let target = default_target();
    let target_id = target.id;
    let host = Arc::new(SimHost::new(
        arena_world(ARENA_HALF),
        voxblast_core::Vec3::new(4.5, 5.0, 0.5),
        target,
        config.damage.difficulty,
        config.damage.era.multiplier(),
        0xC0FFEE,
        ARENA_HALF as f64 - 0.5,
    ));

    let session = Session::start(host.clone(), config, target_id)?;
    info!(target = %target_id, "simulation running");

    for tick in 0..MAX_TICKS {
        host.step(tick);
        tokio::time::sleep(Duration::from_millis(TICK_MS)).await;
        if host.target_health() <= 0.0 {
            info!(tick, "target eliminated");
            break;
        }
        if !session.is_running() {
            warn!(tick, "session stopped early");
            break;
        }
    }
    session.stop();

    let stats = session.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
