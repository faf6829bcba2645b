use log::{info, warn};
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::config::{SolverConfig, StrictnessMode};
use crate::data::{AttemptRecord, AttemptStatus, Session};
use crate::error::{Result, TimetableError};
use crate::model::{ModelBuilder, Placement, TimetableModel};
use crate::schedule;

/// Reported for attempts that ran out of time without a verdict.
pub const TIMEOUT_REASON: &str = "unknown - time budget exceeded";

/// Searches one built model for a feasible assignment.
///
/// Implementations return the activated placements, or fail the attempt with
/// `TimetableError::Infeasible` or `TimetableError::Timeout`. Any other error aborts the run.
pub trait SolveBackend {
    fn solve(&self, model: TimetableModel, budget: Duration, workers: u32) -> Result<Vec<Placement>>;
}

/// The first mode that produced a verified schedule.
#[derive(Debug, Clone)]
pub struct SolvedSchedule {
    pub mode: StrictnessMode,
    pub sessions: Vec<Session>,
    pub attempts: Vec<AttemptRecord>,
}

pub struct SolveController<'a, B: SolveBackend + ?Sized> {
    catalog: &'a Catalog,
    config: &'a SolverConfig,
    backend: &'a B,
}

impl<'a, B: SolveBackend + ?Sized> SolveController<'a, B> {
    pub fn new(catalog: &'a Catalog, config: &'a SolverConfig, backend: &'a B) -> Self {
        Self {
            catalog,
            config,
            backend,
        }
    }

    pub fn run(&self) -> Result<SolvedSchedule> {
        let ladder = self.config.ladder();
        let builder = ModelBuilder::new(self.catalog, self.config);
        let budget = self.config.time_budget();
        let mut attempts = Vec::with_capacity(ladder.len());

        for (n, &mode) in ladder.iter().enumerate() {
            info!("Attempt {}/{}: solving in {} mode", n + 1, ladder.len(), mode);
            let started = Instant::now();
            let outcome = builder
                .build(mode)
                .map_err(|reason| TimetableError::Infeasible { mode, reason })
                .and_then(|model| self.backend.solve(model, budget, self.config.workers));
            let elapsed_seconds = started.elapsed().as_secs_f64();

            let (status, reason) = match outcome {
                Ok(placements) => {
                    let sessions = schedule::materialize(self.catalog, self.config, mode, &placements)?;
                    attempts.push(AttemptRecord {
                        mode,
                        status: AttemptStatus::Feasible,
                        reason: None,
                        elapsed_seconds,
                    });
                    info!("Solved in {} mode after {} attempt(s)", mode, attempts.len());
                    return Ok(SolvedSchedule {
                        mode,
                        sessions,
                        attempts,
                    });
                }
                Err(TimetableError::Infeasible { reason, .. }) => (AttemptStatus::Infeasible, reason),
                Err(TimetableError::Timeout { .. }) => (AttemptStatus::Timeout, TIMEOUT_REASON.to_string()),
                Err(fatal) => return Err(fatal),
            };

            match ladder.get(n + 1) {
                Some(next) => warn!("{} mode failed ({}); falling back to {} mode", mode, reason, next),
                None => warn!("{} mode failed ({})", mode, reason),
            }
            attempts.push(AttemptRecord {
                mode,
                status,
                reason: Some(reason),
                elapsed_seconds,
            });
        }

        Err(TimetableError::exhausted(attempts))
    }
}
