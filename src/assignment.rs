use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::catalog::{Catalog, Offering, Teacher};
use crate::config::SolverConfig;
use crate::data::{CourseCode, TeacherId};
use crate::error::{Result, TimetableError};

/// Weekly contact hours charged to each teacher during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadLedger {
    hours: BTreeMap<TeacherId, u32>,
}

impl LoadLedger {
    pub fn load(&self, teacher: &str) -> u32 {
        self.hours.get(teacher).copied().unwrap_or(0)
    }

    pub fn charge(&mut self, teacher: &str, hours: u32) {
        *self.hours.entry(teacher.to_string()).or_default() += hours;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TeacherId, &u32)> {
        self.hours.iter()
    }
}

/// Outcome of resolving every offering in a catalog.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub assigned: Vec<(CourseCode, TeacherId)>,
    /// Offerings nobody can teach; excluded from the model.
    pub unassignable: Vec<CourseCode>,
}

/// Picks a teacher for every offering that lacks one.
///
/// Candidates are active teachers of the offering's staffing department with enough
/// weekly budget left. Teachers whose expertise covers the course's subject tag are
/// preferred; within a tier the lowest load wins and ties go to the
/// lexicographically smallest email.
#[derive(Debug, Clone)]
pub struct AssignmentResolver {
    ledger: LoadLedger,
    expertise_enabled: bool,
    days: u32,
}

impl AssignmentResolver {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            ledger: LoadLedger::default(),
            expertise_enabled: config.expertise_enabled,
            days: config.grid.days,
        }
    }

    pub fn ledger(&self) -> &LoadLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut LoadLedger {
        &mut self.ledger
    }

    fn demand(offering: &Offering) -> u32 {
        offering.hours.total().max(1)
    }

    fn has_room_for(&self, teacher: &Teacher, hours: u32) -> bool {
        self.ledger.load(&teacher.id) + hours <= teacher.max_daily_hours * self.days
    }

    /// Chooses a teacher without charging the ledger.
    pub fn select(&self, catalog: &Catalog, offering: &Offering) -> Result<TeacherId> {
        let hours = Self::demand(offering);
        let department = offering.staffing_department();
        let pool: Vec<&Teacher> = catalog
            .teachers
            .values()
            .filter(|t| t.is_active() && &t.department == department)
            .filter(|t| self.has_room_for(t, hours))
            .collect();

        if self.expertise_enabled {
            if let Some(tag) = &offering.subject {
                let experts = pool.iter().copied().filter(|t| t.expertise.contains(tag));
                if let Some(chosen) = self.least_loaded(experts) {
                    return Ok(chosen);
                }
            }
        }

        self.least_loaded(pool.iter().copied())
            .ok_or_else(|| TimetableError::NoQualifiedTeacher {
                course_code: offering.code.clone(),
                department: department.clone(),
            })
    }

    fn least_loaded<'t>(&self, candidates: impl Iterator<Item = &'t Teacher>) -> Option<TeacherId> {
        candidates
            .min_by(|a, b| {
                self.ledger
                    .load(&a.id)
                    .cmp(&self.ledger.load(&b.id))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|t| t.id.clone())
    }

    /// Chooses a teacher and charges the offering's weekly hours to them.
    pub fn resolve(&mut self, catalog: &Catalog, offering: &Offering) -> Result<TeacherId> {
        let chosen = self.select(catalog, offering)?;
        self.ledger.charge(&chosen, Self::demand(offering));
        debug!(
            "Assigned {} to {} (load now {}h)",
            offering.code,
            chosen,
            self.ledger.load(&chosen)
        );
        Ok(chosen)
    }

    /// Resolves every unassigned offering in course-code order, writing the choice back
    /// into the catalog. Pre-assigned offerings are charged first.
    pub fn resolve_all(&mut self, catalog: &mut Catalog) -> ResolutionReport {
        for offering in &catalog.offerings {
            if let Some(teacher) = &offering.assigned_teacher {
                self.ledger.charge(teacher, Self::demand(offering));
            }
        }

        let mut report = ResolutionReport::default();
        for idx in 0..catalog.offerings.len() {
            if catalog.offerings[idx].assigned_teacher.is_some() {
                continue;
            }
            match self.resolve(catalog, &catalog.offerings[idx]) {
                Ok(teacher) => {
                    report
                        .assigned
                        .push((catalog.offerings[idx].code.clone(), teacher.clone()));
                    catalog.offerings[idx].assigned_teacher = Some(teacher);
                }
                Err(e) => {
                    warn!("{}; course excluded from the schedule", e);
                    report.unassignable.push(catalog.offerings[idx].code.clone());
                }
            }
        }
        info!(
            "Resolved {} teacher assignment(s), {} course(s) unassignable",
            report.assigned.len(),
            report.unassignable.len()
        );
        report
    }
}
