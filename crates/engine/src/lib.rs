//! Trade Simulation Engine: Monte Carlo outcomes for a trading strategy
//!
//! Self-contained crate with no storage or network dependencies.
//! Provides:
//! - Simulation Runner: seeded, parallel equity-curve generation
//! - Statistics Reducer: percentile bands, profit factor, drawdowns, samples
//! - Advisory Analyzer: rule-based risk narrative and parameter suggestions
//! - Background job tracker with cancellation and deadlines

pub mod advisory;
pub mod error;
pub mod fees;
pub mod job;
pub mod reducer;
pub mod request;
pub mod simulation;
pub mod stats;
pub mod types;

// Re-exports for convenience
pub use advisory::{Advisory, AdvisoryAnalyzer, Recommendation, RiskLevel};
pub use error::{SimResult, SimulationError};
pub use fees::FeeModel;
pub use job::{
    run_simulation_job, simulate, simulate_with_deadline, SimulationProgress, SimulationStatus,
};
pub use reducer::StatisticsReducer;
pub use request::{SimulationRequest, SimulationResponse};
pub use simulation::SimulationRunner;
pub use types::*;
