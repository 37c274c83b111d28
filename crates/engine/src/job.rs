//! Simulation pipeline and background job tracking
//!
//! `simulate` chains Runner → Reducer → Analyzer synchronously. The async entry
//! points move that CPU-bound work onto tokio's blocking pool, sharing a
//! [`SimulationProgress`] with whoever polls for status.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, PoisonError, RwLock,
};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::advisory::AdvisoryAnalyzer;
use crate::error::{SimResult, SimulationError};
use crate::reducer::StatisticsReducer;
use crate::request::SimulationResponse;
use crate::simulation::SimulationRunner;
use crate::types::{SimulationConfig, SimulationLimits};

/// Background simulation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Idle,
    Running,
    Complete,
    Cancelled,
    Error,
}

/// Shared progress tracker between the API handler and the background task
pub struct SimulationProgress {
    pub status: RwLock<SimulationStatus>,
    pub total_simulations: AtomicU32,
    pub completed: AtomicU32,
    pub cancelled: AtomicBool,
    /// Held from `try_begin` until the run completes or fails
    active: AtomicBool,
    pub deadline: RwLock<Option<Instant>>,
    pub subject: RwLock<String>,
    pub response: RwLock<Option<SimulationResponse>>,
    pub error_message: RwLock<Option<String>>,
    pub started_at: RwLock<Option<String>>,
}

impl SimulationProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(SimulationStatus::Idle),
            total_simulations: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            active: AtomicBool::new(false),
            deadline: RwLock::new(None),
            subject: RwLock::new(String::new()),
            response: RwLock::new(None),
            error_message: RwLock::new(None),
            started_at: RwLock::new(None),
        }
    }

    /// Reset for a new run
    pub fn reset(&self, total: u32, deadline: Option<Duration>, subject: &str) {
        *write(&self.status) = SimulationStatus::Running;
        self.total_simulations.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
        *write(&self.deadline) = deadline.map(|d| Instant::now() + d);
        *write(&self.subject) = subject.to_string();
        *write(&self.response) = None;
        *write(&self.error_message) = None;
        *write(&self.started_at) = Some(Utc::now().to_rfc3339());
    }

    /// Claim the tracker for a background run and reset it.
    /// Returns false, leaving the running job untouched, when one is already active.
    pub fn try_begin(&self, total: u32, deadline: Option<Duration>, subject: &str) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.reset(total, deadline, subject);
        true
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Get progress as percentage
    pub fn progress_pct(&self) -> f32 {
        let total = self.total_simulations.load(Ordering::Relaxed);
        let done = self.completed.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            (done as f32 / total as f32) * 100.0
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*read(&self.status), SimulationStatus::Running)
    }

    pub fn status(&self) -> SimulationStatus {
        *read(&self.status)
    }

    pub fn subject(&self) -> String {
        read(&self.subject).clone()
    }

    pub fn response(&self) -> Option<SimulationResponse> {
        read(&self.response).clone()
    }

    pub fn error_message(&self) -> Option<String> {
        read(&self.error_message).clone()
    }

    pub fn started_at(&self) -> Option<String> {
        read(&self.started_at).clone()
    }

    /// Trial-boundary check: stop on cancellation or an expired deadline
    pub fn checkpoint(&self) -> SimResult<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(SimulationError::Cancelled);
        }
        if let Some(deadline) = *read(&self.deadline) {
            if Instant::now() >= deadline {
                return Err(SimulationError::DeadlineExceeded {
                    completed: self.completed.load(Ordering::Relaxed),
                    total: self.total_simulations.load(Ordering::Relaxed),
                });
            }
        }
        Ok(())
    }

    pub fn mark_complete(&self, response: SimulationResponse) {
        *write(&self.response) = Some(response);
        *write(&self.status) = SimulationStatus::Complete;
        self.active.store(false, Ordering::Release);
    }

    pub fn mark_failed(&self, err: &SimulationError) {
        *write(&self.error_message) = Some(err.to_string());
        *write(&self.status) = match err {
            SimulationError::Cancelled => SimulationStatus::Cancelled,
            _ => SimulationStatus::Error,
        };
        self.active.store(false, Ordering::Release);
    }
}

impl Default for SimulationProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Runner → Reducer → Analyzer for one configuration
pub fn simulate(
    config: &SimulationConfig,
    limits: &SimulationLimits,
    subject: &str,
    progress: Option<&SimulationProgress>,
) -> SimResult<SimulationResponse> {
    let curves = SimulationRunner::run_with(config, limits, progress)?;
    let results = StatisticsReducer::reduce(&curves, config);
    let analysis = AdvisoryAnalyzer::analyze(&results, subject);
    Ok(SimulationResponse::new(results, analysis))
}

/// Run on the blocking pool with an optional wall-clock deadline
pub async fn simulate_with_deadline(
    config: SimulationConfig,
    limits: SimulationLimits,
    subject: String,
    deadline: Option<Duration>,
) -> SimResult<SimulationResponse> {
    let progress = SimulationProgress::new();
    progress.reset(config.num_simulations, deadline, &subject);

    tokio::task::spawn_blocking(move || simulate(&config, &limits, &subject, Some(&progress)))
        .await
        .map_err(|e| SimulationError::Internal(format!("simulation task failed: {e}")))?
}

/// Background run: the caller claims `progress` with `try_begin` first, then spawns this.
pub async fn run_simulation_job(
    config: SimulationConfig,
    limits: SimulationLimits,
    subject: String,
    progress: Arc<SimulationProgress>,
) {
    info!(
        subject = %subject,
        simulations = config.num_simulations,
        "Starting background simulation"
    );

    let worker = progress.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        simulate(&config, &limits, &subject, Some(worker.as_ref()))
    })
    .await
    .map_err(|e| SimulationError::Internal(format!("simulation task failed: {e}")))
    .and_then(|r| r);

    match outcome {
        Ok(response) => {
            info!(
                success_rate = response.results.success_rate,
                "Background simulation complete"
            );
            progress.mark_complete(response);
        }
        Err(SimulationError::Cancelled) => {
            warn!("Background simulation cancelled");
            progress.mark_failed(&SimulationError::Cancelled);
        }
        Err(e) => {
            error!(error = %e, "Background simulation failed");
            progress.mark_failed(&e);
        }
    }
}
