use good_lp::{Constraint, Expression, ProblemVariables, Variable, constraint, variable};
use itertools::Itertools;
use log::{info, trace};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::catalog::{Catalog, Offering};
use crate::config::{ModeProfile, SolverConfig, StrictnessMode, TimeSlot};

// objective weights
const SESSION_WEIGHT: f64 = 1.0;
const LAB_MORNING_BONUS: f64 = 0.3;
const LAB_LATE_MORNING_BONUS: f64 = 0.1;
const THEORY_MIDDAY_BONUS: f64 = 0.1;
const EXPERTISE_BONUS: f64 = 0.2;
const STAGGER_DEVIATION_PENALTY: f64 = 0.15;

// x_p = 1 if placement p = (offering, room, slot) is taught by the offering's teacher

/// A candidate session: one offering in one room at one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub offering: usize,
    pub room: usize,
    pub slot: TimeSlot,
}

/// A fully built model, ready to hand to a solver.
pub struct TimetableModel {
    pub mode: StrictnessMode,
    pub profile: ModeProfile,
    pub variables: ProblemVariables,
    pub placements: Vec<(Placement, Variable)>,
    pub objective: Expression,
    pub constraints: Vec<Constraint>,
}

impl TimetableModel {
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

pub struct ModelBuilder<'a> {
    catalog: &'a Catalog,
    config: &'a SolverConfig,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a SolverConfig) -> Self {
        Self { catalog, config }
    }

    fn teacher_of(&self, offering: usize) -> Option<&'a str> {
        self.catalog.offerings[offering].assigned_teacher.as_deref()
    }

    /// Every placement that respects room type, room capacity and the grid.
    /// Offerings without a teacher are left out.
    pub fn candidate_placements(&self) -> Vec<Placement> {
        let mut placements = Vec::new();
        for (o_idx, offering) in self.catalog.offerings.iter().enumerate() {
            if offering.assigned_teacher.is_none() {
                continue;
            }
            for (r_idx, room) in self.catalog.rooms.iter().enumerate() {
                if !room.fits(offering) {
                    continue;
                }
                placements.extend(self.config.grid.slots().map(|slot| Placement {
                    offering: o_idx,
                    room: r_idx,
                    slot,
                }));
            }
        }
        placements
    }

    /// Objective coefficient of a placement.
    pub fn placement_weight(&self, placement: &Placement) -> f64 {
        let grid = &self.config.grid;
        let offering = &self.catalog.offerings[placement.offering];
        let period = placement.slot.period;
        let mut weight = SESSION_WEIGHT;

        if offering.is_lab {
            if grid.is_morning(period) {
                weight += LAB_MORNING_BONUS;
            } else if grid.is_late_morning(period) {
                weight += LAB_LATE_MORNING_BONUS;
            }
        } else if grid.is_midday(period) {
            weight += THEORY_MIDDAY_BONUS;
        }

        if teaches_in_expertise(self.catalog, offering) {
            weight += EXPERTISE_BONUS;
        }

        if self.config.staggered && !grid.in_stagger_pattern(placement.room, period) {
            weight -= STAGGER_DEVIATION_PENALTY;
        }
        weight
    }

    /// Cheap infeasibility evidence found before any solving.
    fn precheck(&self, placements: &[Placement], profile: &ModeProfile) -> Result<(), String> {
        let per_offering = placements.iter().map(|p| p.offering).counts();
        let mut teacher_demand: BTreeMap<&str, u32> = BTreeMap::new();

        for (o_idx, offering) in self.catalog.offerings.iter().enumerate() {
            let Some(teacher) = offering.assigned_teacher.as_deref() else {
                continue;
            };
            let available = per_offering.get(&o_idx).copied().unwrap_or(0);
            if (available as u32) < profile.min_instances {
                return Err(format!(
                    "course {} has {} candidate placement(s) but needs {} session(s){}",
                    offering.code,
                    available,
                    profile.min_instances,
                    if offering.is_lab { " in a lab room" } else { "" }
                ));
            }
            *teacher_demand.entry(teacher).or_default() += profile.min_instances;
        }

        for (teacher_id, demand) in teacher_demand {
            let daily = self
                .catalog
                .teacher(teacher_id)
                .map(|t| t.max_daily_hours)
                .unwrap_or(0);
            let capacity = self.config.weekly_teacher_budget(daily);
            if demand > capacity {
                return Err(format!(
                    "teacher {} needs at least {}h per week but can teach at most {}h",
                    teacher_id, demand, capacity
                ));
            }
        }
        Ok(())
    }

    pub fn build(&self, mode: StrictnessMode) -> Result<TimetableModel, String> {
        let profile = mode.profile();
        let grid = &self.config.grid;
        let candidates = self.candidate_placements();

        info!(
            "Setting up {} model with {} courses, {} rooms and {} timeslots...",
            mode,
            self.catalog.offerings.len(),
            self.catalog.rooms.len(),
            grid.days * grid.periods_per_day
        );
        trace!(
            "Generated {} potential placement variables out of a theoretical maximum of {}.",
            candidates.len(),
            self.catalog.offerings.len()
                * self.catalog.rooms.len()
                * (grid.days * grid.periods_per_day) as usize
        );
        self.precheck(&candidates, &profile)?;

        let mut variables = ProblemVariables::new();
        let vars = variables.add_vector(variable().binary(), candidates.len());
        let placements: Vec<(Placement, Variable)> = candidates.into_iter().zip(vars).collect();

        let objective: Expression = placements
            .iter()
            .map(|(p, var)| self.placement_weight(p) * *var)
            .sum();

        let mut constraints = Vec::new();
        self.add_hard_constraints(&placements, &profile, &mut constraints);
        self.add_mode_constraints(&placements, &profile, &mut constraints);

        info!(
            "{} model has {} variables and {} constraints.",
            mode,
            placements.len(),
            constraints.len()
        );
        Ok(TimetableModel {
            mode,
            profile,
            variables,
            placements,
            objective,
            constraints,
        })
    }

    fn add_hard_constraints(
        &self,
        placements: &[(Placement, Variable)],
        profile: &ModeProfile,
        constraints: &mut Vec<Constraint>,
    ) {
        // no teacher double-booking
        for (_, vars) in group_vars(placements, |p| self.teacher_of(p.offering).map(|t| (t, p.slot))) {
            let busy: Expression = vars.into_iter().sum();
            constraints.push(constraint!(busy <= 1));
        }

        // no room double-booking
        for (_, vars) in group_vars(placements, |p| Some((p.room, p.slot))) {
            let occupied: Expression = vars.into_iter().sum();
            constraints.push(constraint!(occupied <= 1));
        }

        // weekly coverage between the mode minimum and the course's contact hours
        for (o_idx, vars) in group_vars(placements, |p| Some(p.offering)) {
            let offering = &self.catalog.offerings[o_idx];
            let sessions: Expression = vars.into_iter().sum();
            let min = profile.min_instances as f64;
            let max = offering.max_sessions(profile.min_instances) as f64;
            constraints.push(constraint!(sessions.clone() >= min));
            constraints.push(constraint!(sessions <= max));
        }

        // teacher daily load
        for ((teacher_id, _), vars) in group_vars(placements, |p| {
            self.teacher_of(p.offering).map(|t| (t, p.slot.day))
        }) {
            let cap = self
                .catalog
                .teacher(teacher_id)
                .map(|t| t.max_daily_hours)
                .unwrap_or(0) as f64;
            let hours: Expression = vars.into_iter().sum();
            constraints.push(constraint!(hours <= cap));
        }
    }

    fn add_mode_constraints(
        &self,
        placements: &[(Placement, Variable)],
        profile: &ModeProfile,
        constraints: &mut Vec<Constraint>,
    ) {
        let grid = &self.config.grid;

        if profile.lunch_break {
            let lunch = grid.lunch_periods();
            let window = lunch.clone().count();
            if window > 0 {
                let cap = (window - 1) as f64;
                for (_, vars) in group_vars(placements, |p| {
                    if lunch.contains(&p.slot.period) {
                        self.teacher_of(p.offering).map(|t| (t, p.slot.day))
                    } else {
                        None
                    }
                }) {
                    let taught: Expression = vars.into_iter().sum();
                    constraints.push(constraint!(taught <= cap));
                }
            }
        }

        if profile.lab_consecutive {
            let index: HashMap<Placement, Variable> = placements.iter().copied().collect();
            for (p, var) in placements {
                let offering = &self.catalog.offerings[p.offering];
                if !offering.is_lab || offering.max_sessions(profile.min_instances) < 2 {
                    continue;
                }
                let neighbour = |period: u32| {
                    index.get(&Placement {
                        slot: TimeSlot {
                            day: p.slot.day,
                            period,
                        },
                        ..*p
                    })
                };
                let neighbours: Expression = p
                    .slot
                    .period
                    .checked_sub(1)
                    .and_then(neighbour)
                    .into_iter()
                    .chain(neighbour(p.slot.period + 1))
                    .copied()
                    .sum();
                let x = *var;
                constraints.push(constraint!(x <= neighbours));
            }
        }

        if profile.student_conflicts {
            let cohort_of: HashMap<usize, usize> = self
                .catalog
                .cohort_groups()
                .into_values()
                .enumerate()
                .flat_map(|(group, members)| members.into_iter().map(move |o| (o, group)))
                .collect();
            for (_, vars) in group_vars(placements, |p| {
                cohort_of.get(&p.offering).map(|group| (*group, p.slot))
            }) {
                let cohort_busy: Expression = vars.into_iter().sum();
                constraints.push(constraint!(cohort_busy <= 1));
            }
        }

        if self.config.staggered {
            let cap = grid.staggered_cap(self.catalog.rooms.len()) as f64;
            for (_, vars) in group_vars(placements, |p| Some(p.slot)) {
                let in_slot: Expression = vars.into_iter().sum();
                constraints.push(constraint!(in_slot <= cap));
            }
        }
    }
}

/// True when the offering's teacher claims its subject tag.
pub fn teaches_in_expertise(catalog: &Catalog, offering: &Offering) -> bool {
    match (&offering.subject, offering.assigned_teacher.as_deref()) {
        (Some(tag), Some(teacher)) => catalog
            .teacher(teacher)
            .is_some_and(|t| t.expertise.contains(tag)),
        _ => false,
    }
}

/// Groups placement variables by key, in key order. `None` keys are skipped.
fn group_vars<K, F>(placements: &[(Placement, Variable)], key: F) -> Vec<(K, Vec<Variable>)>
where
    K: Ord + Hash + Eq,
    F: Fn(&Placement) -> Option<K>,
{
    placements
        .iter()
        .filter_map(|(p, var)| key(p).map(|k| (k, *var)))
        .into_group_map()
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::AssignmentResolver;
    use crate::catalog::tests::{course, input, room, teacher};
    use crate::data::{CourseRecord, RoomRecord, TeacherRecord};
    use crate::expertise::refine_catalog;

    fn resolved(
        teachers: Vec<TeacherRecord>,
        courses: Vec<CourseRecord>,
        rooms: Vec<RoomRecord>,
        config: &SolverConfig,
    ) -> Catalog {
        let mut catalog = Catalog::build(&input(teachers, courses, rooms)).unwrap();
        refine_catalog(&mut catalog);
        AssignmentResolver::new(config).resolve_all(&mut catalog);
        catalog
    }

    #[test]
    fn test_lab_courses_only_get_lab_rooms() {
        let config = SolverConfig::default();
        let catalog = resolved(
            vec![teacher("a@college.edu", "IT")],
            vec![course("IT21002", "IT", 0, 2), course("IT20001", "IT", 3, 0)],
            vec![room("L1", true), room("R1", false), room("R2", false)],
            &config,
        );
        let builder = ModelBuilder::new(&catalog, &config);
        let placements = builder.candidate_placements();
        let slots = 32;
        assert_eq!(placements.len(), slots + 2 * slots);
        for p in &placements {
            let offering = &catalog.offerings[p.offering];
            assert_eq!(offering.is_lab, catalog.rooms[p.room].is_lab);
        }
    }

    #[test]
    fn test_missing_lab_room_is_reported_before_solving() {
        let config = SolverConfig::default();
        let catalog = resolved(
            vec![teacher("a@college.edu", "IT")],
            vec![course("IT21002", "IT", 0, 2)],
            vec![room("R1", false)],
            &config,
        );
        let reason = ModelBuilder::new(&catalog, &config)
            .build(StrictnessMode::Relaxed)
            .err()
            .unwrap();
        assert!(reason.contains("IT21002"));
        assert!(reason.contains("lab room"));
    }

    #[test]
    fn test_teacher_overload_is_reported_before_solving() {
        let config = SolverConfig {
            grid: crate::config::TimeGrid {
                days: 1,
                ..Default::default()
            },
            ..SolverConfig::default()
        };
        let mut courses: Vec<CourseRecord> = (0..3)
            .map(|i| course(&format!("IT2000{}", i), "IT", 1, 0))
            .collect();
        for c in &mut courses {
            c.assigned_teacher = Some("a@college.edu".into());
        }
        let catalog = resolved(
            vec![teacher("a@college.edu", "IT")],
            courses,
            vec![room("R1", false), room("R2", false), room("R3", false)],
            &config,
        );
        // hybrid needs 2 sessions x 3 courses = 6h on a single 5h day
        let reason = ModelBuilder::new(&catalog, &config)
            .build(StrictnessMode::Hybrid)
            .err()
            .unwrap();
        assert!(reason.contains("a@college.edu"));
        assert!(ModelBuilder::new(&catalog, &config)
            .build(StrictnessMode::Relaxed)
            .is_ok());
    }

    #[test]
    fn test_stricter_modes_add_constraints() {
        let config = SolverConfig::default();
        let catalog = resolved(
            vec![teacher("a@college.edu", "IT"), teacher("b@college.edu", "IT")],
            vec![
                course("IT20001", "IT", 3, 0),
                course("IT20002", "IT", 3, 0),
                course("IT21003", "IT", 0, 2),
            ],
            vec![room("R1", false), room("R2", false), room("L1", true)],
            &config,
        );
        let builder = ModelBuilder::new(&catalog, &config);
        let relaxed = builder.build(StrictnessMode::Relaxed).unwrap();
        let balanced = builder.build(StrictnessMode::Balanced).unwrap();
        let hybrid = builder.build(StrictnessMode::Hybrid).unwrap();
        let real = builder.build(StrictnessMode::Real).unwrap();

        assert_eq!(relaxed.placements.len(), balanced.placements.len());
        assert!(balanced.constraint_count() > relaxed.constraint_count());
        assert!(hybrid.constraint_count() > balanced.constraint_count());
        assert_eq!(hybrid.constraint_count(), real.constraint_count());
    }

    #[test]
    fn test_staggered_adds_slot_caps() {
        let plain = SolverConfig::default();
        let staggered = SolverConfig {
            staggered: true,
            ..SolverConfig::default()
        };
        let catalog = resolved(
            vec![teacher("a@college.edu", "IT")],
            vec![course("IT20001", "IT", 3, 0)],
            vec![room("R1", false), room("R2", false)],
            &plain,
        );
        let without = ModelBuilder::new(&catalog, &plain)
            .build(StrictnessMode::Relaxed)
            .unwrap();
        let with = ModelBuilder::new(&catalog, &staggered)
            .build(StrictnessMode::Relaxed)
            .unwrap();
        assert_eq!(with.constraint_count(), without.constraint_count() + 32);
    }

    #[test]
    fn test_placement_weights() {
        let config = SolverConfig::default();
        let mut expert = teacher("a@college.edu", "IT");
        expert.expertise = vec!["IT".into()];
        let catalog = resolved(
            vec![expert],
            vec![course("IT21002", "IT", 0, 2), course("IT20001", "IT", 3, 0)],
            vec![room("L1", true), room("R1", false)],
            &config,
        );
        let builder = ModelBuilder::new(&catalog, &config);
        let at = |offering: usize, room: usize, period: u32| Placement {
            offering,
            room,
            slot: TimeSlot { day: 0, period },
        };
        // offering 0 = IT20001 (theory), 1 = IT21002 (lab); room 0 = L1, 1 = R1
        let eps = 1e-9;
        assert!((builder.placement_weight(&at(1, 0, 0)) - 1.5).abs() < eps);
        assert!((builder.placement_weight(&at(1, 0, 5)) - 1.3).abs() < eps);
        assert!((builder.placement_weight(&at(1, 0, 7)) - 1.2).abs() < eps);
        assert!((builder.placement_weight(&at(0, 1, 4)) - 1.3).abs() < eps);
        assert!((builder.placement_weight(&at(0, 1, 0)) - 1.2).abs() < eps);
    }

    #[test]
    fn test_unassigned_offerings_are_left_out() {
        let config = SolverConfig::default();
        let catalog = resolved(
            vec![teacher("a@college.edu", "IT")],
            vec![course("IT20001", "IT", 3, 0), course("MA10001", "MA", 3, 0)],
            vec![room("R1", false)],
            &config,
        );
        let model = ModelBuilder::new(&catalog, &config)
            .build(StrictnessMode::Balanced)
            .unwrap();
        assert!(model.placements.iter().all(|(p, _)| p.offering == 0));
    }
}
