use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{SolverConfig, StrictnessMode};

// Type aliases for clarity
pub type DepartmentId = String;
pub type TeacherId = String;
pub type StudentId = String;
pub type CourseCode = String;
pub type RoomId = String;

/// An academic department.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepartmentRecord {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmploymentStatus {
    #[default]
    Active,
    Resigned,
}

/// A faculty member, keyed by email.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRecord {
    pub email: TeacherId,
    pub department: DepartmentId,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: EmploymentStatus,
    /// Declared subject tags, merged with the inferred ones.
    #[serde(default)]
    pub expertise: Vec<String>,
}

/// A student, keyed by email.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub email: StudentId,
    pub department: DepartmentId,
    pub semester: u32,
    #[serde(default)]
    pub enrolled_courses: Vec<CourseCode>,
}

/// A course offered to a department, keyed by course code.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub code: CourseCode,
    pub department: DepartmentId,
    #[serde(default)]
    pub semester: Option<u32>,
    #[serde(default)]
    pub lecture_hours: u32,
    #[serde(default)]
    pub practical_hours: u32,
    #[serde(default)]
    pub tutorial_hours: u32,
    /// Department that staffs the course when it differs from the owning one.
    #[serde(default)]
    pub teaching_department: Option<DepartmentId>,
    #[serde(default)]
    pub assigned_teacher: Option<TeacherId>,
    #[serde(default)]
    pub expected_enrollment: Option<u32>,
}

/// A physical room, keyed by room number.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub number: RoomId,
    #[serde(default)]
    pub block: String,
    #[serde(default)]
    pub min_capacity: u32,
    #[serde(default = "default_room_capacity")]
    pub max_capacity: u32,
    #[serde(default)]
    pub is_lab: bool,
    #[serde(default)]
    pub amenities: Vec<String>,
}

fn default_room_capacity() -> u32 {
    30
}

/// A historical (teacher, course) pairing from the department faculty lists.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyLinkRecord {
    pub course_code: CourseCode,
    pub teacher_email: TeacherId,
}

/// The complete input for the scheduling problem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingInput {
    #[serde(default)]
    pub departments: Vec<DepartmentRecord>,
    pub teachers: Vec<TeacherRecord>,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    pub courses: Vec<CourseRecord>,
    pub rooms: Vec<RoomRecord>,
    #[serde(default)]
    pub faculty_links: Vec<FacultyLinkRecord>,
    #[serde(default)]
    pub config: SolverConfig,
}

/// One scheduled weekly occurrence of a course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub day: u32,
    pub slot: u32,
    pub room_id: RoomId,
    pub course_code: CourseCode,
    pub teacher_id: TeacherId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Feasible,
    Infeasible,
    Timeout,
}

/// What happened when one mode was tried.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub mode: StrictnessMode,
    pub status: AttemptStatus,
    pub reason: Option<String>,
    pub elapsed_seconds: f64,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            AttemptStatus::Feasible => "feasible",
            AttemptStatus::Infeasible => "infeasible",
            AttemptStatus::Timeout => "timeout",
        };
        write!(f, "{}: {}", self.mode, status)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// `None` when no mode produced a schedule.
    pub mode_used: Option<StrictnessMode>,
    pub attempts_tried: Vec<StrictnessMode>,
    pub attempts: Vec<AttemptRecord>,
    pub solve_time_seconds: f64,
    pub feasible: bool,
    /// Course codes that could not be given a teacher.
    pub warnings: Vec<CourseCode>,
    /// Share of scheduled courses taught inside their teacher's expertise.
    pub expertise_match_rate: Option<f64>,
    /// Scheduled weekly hours per teacher.
    pub teacher_hours: BTreeMap<TeacherId, u32>,
}

impl RunMetadata {
    /// Metadata of a run whose ladder ran out; the pipeline adds warnings and timing.
    pub fn unsolved(attempts: Vec<AttemptRecord>) -> Self {
        RunMetadata {
            mode_used: None,
            attempts_tried: attempts.iter().map(|a| a.mode).collect(),
            attempts,
            solve_time_seconds: 0.0,
            feasible: false,
            warnings: Vec::new(),
            expertise_match_rate: None,
            teacher_hours: BTreeMap::new(),
        }
    }
}

/// Describes a soft constraint that was not met in the final schedule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetSoftConstraint {
    pub constraint_type: String,
    pub description: String,
}

impl fmt::Display for UnmetSoftConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.constraint_type, self.description)
    }
}

/// The final output of the solver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingOutput {
    pub sessions: Vec<Session>,
    pub metadata: RunMetadata,
    pub score: i32,
    pub unmet_soft_constraints: Vec<UnmetSoftConstraint>,
}
