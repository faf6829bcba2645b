use itertools::Itertools;
use thiserror::Error;

use crate::config::StrictnessMode;
use crate::data::{AttemptRecord, CourseCode, DepartmentId, RunMetadata};

#[derive(Error, Debug)]
pub enum TimetableError {
    /// A record references something that does not exist or breaks an entity invariant.
    #[error("data integrity error in {entity} '{id}': {reason}")]
    DataIntegrity {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("no qualified teacher for course {course_code} in department {department}")]
    NoQualifiedTeacher {
        course_code: CourseCode,
        department: DepartmentId,
    },

    #[error("mode {mode} is infeasible: {reason}")]
    Infeasible {
        mode: StrictnessMode,
        reason: String,
    },

    #[error("mode {mode} exceeded its {seconds}s time budget")]
    Timeout { mode: StrictnessMode, seconds: u64 },

    #[error(
        "no feasible schedule after {} attempt(s): {}",
        .metadata.attempts.len(),
        .metadata.attempts.iter().join("; ")
    )]
    Exhausted { metadata: Box<RunMetadata> },

    #[error("schedule failed its hard-constraint self-check: {}", .violations.join("; "))]
    InternalInvariantViolation { violations: Vec<String> },
}

impl TimetableError {
    pub fn integrity(entity: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        TimetableError::DataIntegrity {
            entity,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            TimetableError::DataIntegrity { .. } => "data_integrity",
            TimetableError::NoQualifiedTeacher { .. } => "no_qualified_teacher",
            TimetableError::Infeasible { .. } => "infeasible",
            TimetableError::Timeout { .. } => "timeout",
            TimetableError::Exhausted { .. } => "exhausted",
            TimetableError::InternalInvariantViolation { .. } => "internal_invariant_violation",
        }
    }

    pub fn exhausted(attempts: Vec<AttemptRecord>) -> Self {
        TimetableError::Exhausted {
            metadata: Box::new(RunMetadata::unsolved(attempts)),
        }
    }
}

pub type Result<T> = std::result::Result<T, TimetableError>;
