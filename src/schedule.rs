use itertools::Itertools;
use log::{error, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::catalog::Catalog;
use crate::config::{ModeProfile, SolverConfig, StrictnessMode, TimeSlot};
use crate::data::{DepartmentId, Session, TeacherId, UnmetSoftConstraint};
use crate::error::{Result, TimetableError};
use crate::model::{Placement, teaches_in_expertise};

/// Converts activated placements into ordered sessions, then self-checks them.
/// A failed self-check is a builder or solver defect and aborts the run.
pub fn materialize(
    catalog: &Catalog,
    config: &SolverConfig,
    mode: StrictnessMode,
    placements: &[Placement],
) -> Result<Vec<Session>> {
    let mut sessions = Vec::with_capacity(placements.len());
    for p in placements {
        let offering = &catalog.offerings[p.offering];
        let Some(teacher) = &offering.assigned_teacher else {
            return Err(TimetableError::InternalInvariantViolation {
                violations: vec![format!("course {} was placed without a teacher", offering.code)],
            });
        };
        sessions.push(Session {
            day: p.slot.day,
            slot: p.slot.period,
            room_id: catalog.rooms[p.room].id.clone(),
            course_code: offering.code.clone(),
            teacher_id: teacher.clone(),
        });
    }
    sessions.sort();

    let violations = check_schedule(catalog, config, &mode.profile(), &sessions);
    if !violations.is_empty() {
        error!("Schedule failed self-check with {} violation(s)", violations.len());
        return Err(TimetableError::InternalInvariantViolation { violations });
    }
    info!("Materialized {} sessions in {} mode", sessions.len(), mode);
    Ok(sessions)
}

/// Lists every hard constraint the sessions break under `profile`. Empty means valid.
pub fn check_schedule(
    catalog: &Catalog,
    config: &SolverConfig,
    profile: &ModeProfile,
    sessions: &[Session],
) -> Vec<String> {
    let grid = &config.grid;
    let mut violations = Vec::new();

    for s in sessions {
        if !grid.contains(TimeSlot { day: s.day, period: s.slot }) {
            violations.push(format!("{} is outside the grid at day {} slot {}", s.course_code, s.day, s.slot));
        }
        let Some(offering) = catalog.offering(&s.course_code) else {
            violations.push(format!("unknown course {}", s.course_code));
            continue;
        };
        if offering.assigned_teacher.as_deref() != Some(s.teacher_id.as_str()) {
            violations.push(format!("{} taught by {} instead of its assigned teacher", s.course_code, s.teacher_id));
        }
        if catalog.teacher(&s.teacher_id).is_none_or(|t| !t.is_active()) {
            violations.push(format!("{} is not an active teacher", s.teacher_id));
        }
        match catalog.room(&s.room_id) {
            None => violations.push(format!("unknown room {}", s.room_id)),
            Some(room) if !room.fits(offering) => violations.push(format!(
                "{} cannot be held in room {} (lab course: {}, lab room: {}, class {} > capacity {})",
                s.course_code, s.room_id, offering.is_lab, room.is_lab, offering.enrollment, room.max_capacity
            )),
            Some(_) => {}
        }
    }

    for ((teacher, day, slot), count) in sessions.iter().map(|s| (&s.teacher_id, s.day, s.slot)).counts() {
        if count > 1 {
            violations.push(format!("teacher {} has {} sessions at day {} slot {}", teacher, count, day, slot));
        }
    }

    for ((room, day, slot), count) in sessions.iter().map(|s| (&s.room_id, s.day, s.slot)).counts() {
        if count > 1 {
            violations.push(format!("room {} hosts {} sessions at day {} slot {}", room, count, day, slot));
        }
    }

    for ((teacher_id, day), hours) in sessions.iter().map(|s| (&s.teacher_id, s.day)).counts() {
        let cap = catalog.teacher(teacher_id).map(|t| t.max_daily_hours).unwrap_or(0);
        if hours as u32 > cap {
            violations.push(format!("teacher {} teaches {}h on day {} (max {}h)", teacher_id, hours, day, cap));
        }
    }

    let per_course = sessions.iter().map(|s| s.course_code.as_str()).counts();
    for offering in catalog.offerings.iter().filter(|o| o.assigned_teacher.is_some()) {
        let count = per_course.get(offering.code.as_str()).copied().unwrap_or(0) as u32;
        let max = offering.max_sessions(profile.min_instances);
        if count < profile.min_instances || count > max {
            violations.push(format!(
                "course {} has {} sessions, expected {}..={}",
                offering.code, count, profile.min_instances, max
            ));
        }
    }

    if profile.lunch_break {
        let lunch = grid.lunch_periods();
        let window = lunch.clone().count();
        if window > 0 {
            let at_lunch = sessions
                .iter()
                .filter(|s| lunch.contains(&s.slot))
                .map(|s| (&s.teacher_id, s.day))
                .counts();
            for ((teacher, day), taught) in at_lunch {
                if taught >= window {
                    violations.push(format!("teacher {} has no lunch break on day {}", teacher, day));
                }
            }
        }
    }

    if profile.lab_consecutive {
        let occupied: BTreeSet<(&str, &str, u32, u32)> = sessions
            .iter()
            .map(|s| (s.course_code.as_str(), s.room_id.as_str(), s.day, s.slot))
            .collect();
        for s in sessions {
            let Some(offering) = catalog.offering(&s.course_code) else {
                continue;
            };
            if !offering.is_lab || offering.max_sessions(profile.min_instances) < 2 {
                continue;
            }
            let key = |slot: u32| (s.course_code.as_str(), s.room_id.as_str(), s.day, slot);
            let before = s.slot.checked_sub(1).is_some_and(|slot| occupied.contains(&key(slot)));
            let after = occupied.contains(&key(s.slot + 1));
            if !before && !after {
                violations.push(format!(
                    "lab {} at day {} slot {} in {} has no consecutive partner",
                    s.course_code, s.day, s.slot, s.room_id
                ));
            }
        }
    }

    if profile.student_conflicts {
        let groups = catalog.cohort_groups();
        let cohort_of: HashMap<&str, &(DepartmentId, u32)> = groups
            .iter()
            .flat_map(|(cohort, members)| {
                members
                    .iter()
                    .map(move |&o| (catalog.offerings[o].code.as_str(), cohort))
            })
            .collect();
        let clashes = sessions
            .iter()
            .filter_map(|s| cohort_of.get(s.course_code.as_str()).map(|cohort| (*cohort, s.day, s.slot)))
            .counts();
        for (((department, year), day, slot), count) in clashes {
            if count > 1 {
                violations.push(format!(
                    "{} year {} has {} classes at day {} slot {}",
                    department, year, count, day, slot
                ));
            }
        }
    }

    if config.staggered {
        let cap = grid.staggered_cap(catalog.rooms.len()) as usize;
        for ((day, slot), count) in sessions.iter().map(|s| (s.day, s.slot)).counts() {
            if count > cap {
                violations.push(format!("{} classes at day {} slot {} exceed the cap of {}", count, day, slot, cap));
            }
        }
    }

    violations
}

/// Scores how well the soft preferences were met and lists the misses.
pub fn score_soft_constraints(
    catalog: &Catalog,
    config: &SolverConfig,
    sessions: &[Session],
) -> (i32, Vec<UnmetSoftConstraint>) {
    let grid = &config.grid;
    let mut score = 0;
    let mut unmet = Vec::new();

    for session in sessions {
        let Some(offering) = catalog.offering(&session.course_code) else {
            continue;
        };
        if offering.is_lab {
            if grid.is_morning(session.slot) {
                score += 1;
            } else {
                score -= 1;
                unmet.push(UnmetSoftConstraint {
                    constraint_type: "Prefer Morning Labs".to_string(),
                    description: format!(
                        "Lab {} is scheduled at day {} slot {}, after the morning window (slots 0-{}).",
                        session.course_code, session.day, session.slot, grid.morning_end
                    ),
                });
            }
        } else if grid.is_midday(session.slot) {
            score += 1;
        } else {
            score -= 1;
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Prefer Mid-day Theory".to_string(),
                description: format!(
                    "Course {} is scheduled at day {} slot {}, outside the mid-day window (slots {}-{}).",
                    session.course_code, session.day, session.slot, grid.midday_start, grid.midday_end
                ),
            });
        }
    }

    let taught: BTreeSet<(&str, &str)> = sessions
        .iter()
        .map(|s| (s.course_code.as_str(), s.teacher_id.as_str()))
        .collect();
    for (code, teacher) in taught {
        let Some(offering) = catalog.offering(code) else {
            continue;
        };
        if teaches_in_expertise(catalog, offering) {
            score += 1;
        } else {
            score -= 1;
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Teacher Expertise".to_string(),
                description: format!(
                    "Teacher {} teaches {} outside their expertise ({}).",
                    teacher,
                    code,
                    offering.subject.as_deref().unwrap_or("no subject tag")
                ),
            });
        }
    }

    (score, unmet)
}

/// Weekly taught hours per teacher; every session is one hour.
pub fn teacher_hours(sessions: &[Session]) -> BTreeMap<TeacherId, u32> {
    sessions
        .iter()
        .map(|s| s.teacher_id.clone())
        .counts()
        .into_iter()
        .map(|(teacher, n)| (teacher, n as u32))
        .collect()
}

/// Share of scheduled courses whose teacher holds the course's subject tag.
pub fn expertise_match_rate(catalog: &Catalog, sessions: &[Session]) -> Option<f64> {
    let courses: BTreeSet<&str> = sessions.iter().map(|s| s.course_code.as_str()).collect();
    if courses.is_empty() {
        return None;
    }
    let matched = courses
        .iter()
        .filter_map(|code| catalog.offering(code))
        .filter(|offering| teaches_in_expertise(catalog, offering))
        .count();
    Some(matched as f64 / courses.len() as f64)
}
