use good_lp::{ResolutionError, Solution, SolverModel, default_solver};
use log::{Level, debug, info, log_enabled, trace, warn};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::assignment::AssignmentResolver;
use crate::catalog::Catalog;
use crate::controller::{SolveBackend, SolveController};
use crate::data::{RunMetadata, SchedulingInput, SchedulingOutput};
use crate::error::{Result, TimetableError};
use crate::expertise::refine_catalog;
use crate::model::{Placement, TimetableModel};
use crate::schedule::{expertise_match_rate, score_soft_constraints, teacher_hours};

/// Fixed so repeated runs on the same input pick the same optimum.
const RANDOM_SEED: i32 = 1234;

static SOLVER_THREADS: OnceLock<u32> = OnceLock::new();

/// Thread count for every HiGHS run in this process.
///
/// HiGHS starts its thread pool once per process and rejects later runs that ask
/// for a different size, so the first request fixes the count.
pub fn solver_threads(requested: u32) -> u32 {
    let requested = requested.max(1);
    let threads = *SOLVER_THREADS.get_or_init(|| requested);
    if threads != requested {
        warn!(
            "Requested {} worker(s) but the HiGHS thread pool already runs {}; using {}",
            requested, threads, threads
        );
    }
    threads
}

/// Solves models with the HiGHS MILP solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighsBackend;

impl SolveBackend for HighsBackend {
    fn solve(&self, model: TimetableModel, budget: Duration, workers: u32) -> Result<Vec<Placement>> {
        let TimetableModel {
            mode,
            variables,
            placements,
            objective,
            constraints,
            ..
        } = model;
        if placements.is_empty() {
            return Ok(Vec::new());
        }

        let threads = solver_threads(workers);
        let mut problem = variables
            .maximise(objective)
            .using(default_solver)
            .set_option("threads", threads as i32)
            .set_option("random_seed", RANDOM_SEED)
            .set_option("time_limit", budget.as_secs_f64())
            .set_option(
                "log_to_console",
                if log_enabled!(Level::Trace) { "true" } else { "false" },
            );
        for constraint in constraints {
            problem.add_constraint(constraint);
        }

        info!("Solving {} model with HiGHS ({} thread(s))...", mode, threads);
        let started = Instant::now();
        let result = problem.solve();
        let elapsed = started.elapsed();
        trace!("HiGHS returned after {:.2?}", elapsed);

        // a solution found at the limit is the incumbent, not a proven optimum
        let timed_out = elapsed >= budget;
        match result {
            Ok(_) if timed_out => Err(TimetableError::Timeout {
                mode,
                seconds: budget.as_secs(),
            }),
            Ok(solution) => Ok(placements
                .iter()
                .filter(|(_, var)| solution.value(*var) > 0.9)
                .map(|(placement, _)| *placement)
                .collect()),
            Err(ResolutionError::Infeasible) => Err(TimetableError::Infeasible {
                mode,
                reason: "solver proved the constraint set infeasible".to_string(),
            }),
            Err(_) if timed_out => Err(TimetableError::Timeout {
                mode,
                seconds: budget.as_secs(),
            }),
            Err(e) => Err(TimetableError::Infeasible {
                mode,
                reason: e.to_string(),
            }),
        }
    }
}

/// Runs the whole pipeline with HiGHS.
pub fn solve(input: &SchedulingInput) -> Result<SchedulingOutput> {
    solve_with(input, &HighsBackend)
}

/// Catalog, expertise, assignment, then the adaptive ladder on `backend`.
pub fn solve_with<B: SolveBackend + ?Sized>(input: &SchedulingInput, backend: &B) -> Result<SchedulingOutput> {
    let start_time = Instant::now();
    let config = &input.config;

    let mut catalog = Catalog::build(input)?;
    refine_catalog(&mut catalog);
    let mut resolver = AssignmentResolver::new(config);
    let report = resolver.resolve_all(&mut catalog);
    for (teacher, hours) in resolver.ledger().iter() {
        debug!("{} carries {}h per week", teacher, hours);
    }

    let solved = match SolveController::new(&catalog, config, backend).run() {
        Ok(solved) => solved,
        Err(TimetableError::Exhausted { mut metadata }) => {
            metadata.warnings = report.unassignable;
            metadata.solve_time_seconds = start_time.elapsed().as_secs_f64();
            warn!(
                "No feasible schedule after {} attempt(s); {} course(s) had no teacher",
                metadata.attempts.len(),
                metadata.warnings.len()
            );
            return Err(TimetableError::Exhausted { metadata });
        }
        Err(e) => return Err(e),
    };
    let (score, unmet_soft_constraints) = score_soft_constraints(&catalog, config, &solved.sessions);

    let solve_time = start_time.elapsed();
    info!(
        "Scheduled {} sessions in {} mode in {:.2?} (score {}, {} unmet preference(s))",
        solved.sessions.len(),
        solved.mode,
        solve_time,
        score,
        unmet_soft_constraints.len()
    );
    Ok(SchedulingOutput {
        metadata: RunMetadata {
            mode_used: Some(solved.mode),
            attempts_tried: solved.attempts.iter().map(|a| a.mode).collect(),
            attempts: solved.attempts,
            solve_time_seconds: solve_time.as_secs_f64(),
            feasible: true,
            warnings: report.unassignable,
            expertise_match_rate: expertise_match_rate(&catalog, &solved.sessions),
            teacher_hours: teacher_hours(&solved.sessions),
        },
        sessions: solved.sessions,
        score,
        unmet_soft_constraints,
    })
}
