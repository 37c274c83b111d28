//! Runtime configuration shared by every subcommand

use clap::Args;
use engine::SimulationLimits;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path
    #[arg(long, env = "TRADE_SIM_DB_PATH", default_value = "data/trade_sim.db", global = true)]
    pub db_path: String,

    /// Wall-clock limit per simulation, in seconds
    #[arg(long, env = "TRADE_SIM_DEADLINE_SECS", global = true)]
    pub deadline_secs: Option<u64>,

    /// Upper bound on simulations per request
    #[arg(long, env = "TRADE_SIM_MAX_SIMULATIONS", default_value_t = 100_000, global = true)]
    pub max_simulations: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "data/trade_sim.db".to_string(),
            deadline_secs: None,
            max_simulations: SimulationLimits::default().max_simulations,
        }
    }
}

impl AppConfig {
    /// Engine limits with the configured simulation cap (never above the engine default)
    pub fn limits(&self) -> SimulationLimits {
        let defaults = SimulationLimits::default();
        SimulationLimits {
            max_simulations: self.max_simulations.min(defaults.max_simulations),
            ..defaults
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
