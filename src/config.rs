use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::ops::RangeInclusive;
use std::time::Duration;

/// How strictly a solve attempt is constrained. Ordered from loosest to strictest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StrictnessMode {
    Relaxed,
    #[default]
    Balanced,
    Hybrid,
    Real,
}

/// The constraint set a mode switches on, looked up once per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub lunch_break: bool,
    pub lab_consecutive: bool,
    pub student_conflicts: bool,
    /// Minimum weekly sessions every offering must receive.
    pub min_instances: u32,
}

impl StrictnessMode {
    pub fn profile(self) -> ModeProfile {
        match self {
            StrictnessMode::Relaxed => ModeProfile {
                lunch_break: false,
                lab_consecutive: false,
                student_conflicts: false,
                min_instances: 1,
            },
            StrictnessMode::Balanced => ModeProfile {
                lunch_break: true,
                lab_consecutive: true,
                student_conflicts: false,
                min_instances: 1,
            },
            StrictnessMode::Hybrid => ModeProfile {
                lunch_break: true,
                lab_consecutive: true,
                student_conflicts: true,
                min_instances: 2,
            },
            StrictnessMode::Real => ModeProfile {
                lunch_break: true,
                lab_consecutive: true,
                student_conflicts: true,
                min_instances: 2,
            },
        }
    }

    /// The next mode down the ladder, `None` once `Relaxed` is reached.
    pub fn looser(self) -> Option<StrictnessMode> {
        match self {
            StrictnessMode::Real => Some(StrictnessMode::Hybrid),
            StrictnessMode::Hybrid => Some(StrictnessMode::Balanced),
            StrictnessMode::Balanced => Some(StrictnessMode::Relaxed),
            StrictnessMode::Relaxed => None,
        }
    }

    /// This mode followed by every looser one.
    pub fn ladder(self) -> impl Iterator<Item = StrictnessMode> {
        std::iter::successors(Some(self), |mode| mode.looser())
    }
}

impl fmt::Display for StrictnessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrictnessMode::Relaxed => "relaxed",
            StrictnessMode::Balanced => "balanced",
            StrictnessMode::Hybrid => "hybrid",
            StrictnessMode::Real => "real",
        };
        f.write_str(name)
    }
}

/// A (day, period) cell of the weekly grid. Periods are 0-based and ordered within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct TimeSlot {
    pub day: u32,
    pub period: u32,
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} period {}", self.day, self.period)
    }
}

/// Shape of the teaching week and the windows the preferences refer to.
/// All period bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeGrid {
    pub days: u32,
    pub periods_per_day: u32,
    pub lunch_start: u32,
    pub lunch_end: u32,
    pub morning_end: u32,
    pub late_morning_end: u32,
    pub midday_start: u32,
    pub midday_end: u32,
    pub staggered_groups: u32,
    pub max_classes_per_slot: u32,
}

impl Default for TimeGrid {
    fn default() -> Self {
        // 08:00 start; 11:30-14:00 is lunch in the college bell schedule
        Self {
            days: 4,
            periods_per_day: 8,
            lunch_start: 4,
            lunch_end: 6,
            morning_end: 3,
            late_morning_end: 5,
            midday_start: 3,
            midday_end: 6,
            staggered_groups: 3,
            max_classes_per_slot: 25,
        }
    }
}

impl TimeGrid {
    pub fn slots(&self) -> impl Iterator<Item = TimeSlot> + '_ {
        (0..self.days)
            .flat_map(move |day| (0..self.periods_per_day).map(move |period| TimeSlot { day, period }))
    }

    pub fn contains(&self, slot: TimeSlot) -> bool {
        slot.day < self.days && slot.period < self.periods_per_day
    }

    /// Lunch periods that actually exist in the grid.
    pub fn lunch_periods(&self) -> RangeInclusive<u32> {
        let end = self.lunch_end.min(self.periods_per_day.saturating_sub(1));
        self.lunch_start..=end
    }

    pub fn is_morning(&self, period: u32) -> bool {
        period <= self.morning_end
    }

    pub fn is_late_morning(&self, period: u32) -> bool {
        period > self.morning_end && period <= self.late_morning_end
    }

    pub fn is_midday(&self, period: u32) -> bool {
        (self.midday_start..=self.midday_end).contains(&period)
    }

    /// Staggered pattern: a room group prefers the periods congruent to it.
    pub fn in_stagger_pattern(&self, room_index: usize, period: u32) -> bool {
        let groups = self.staggered_groups.max(1);
        period % groups == room_index as u32 % groups
    }

    /// Global per-slot occupancy cap used by staggered placement.
    pub fn staggered_cap(&self, room_count: usize) -> u32 {
        self.max_classes_per_slot.min(room_count as u32 / 2).max(1)
    }
}

/// Options recognised by a scheduling run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolverConfig {
    pub strictness_mode: StrictnessMode,
    pub adaptive: bool,
    /// `None` walks the whole ladder.
    pub max_attempts: Option<NonZeroU32>,
    pub staggered: bool,
    pub expertise_enabled: bool,
    pub timeout_seconds: u64,
    /// Solver threads.
    pub workers: u32,
    pub grid: TimeGrid,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strictness_mode: StrictnessMode::Balanced,
            adaptive: false,
            max_attempts: None,
            staggered: false,
            expertise_enabled: true,
            timeout_seconds: 1800,
            workers: 1,
            grid: TimeGrid::default(),
        }
    }
}

impl SolverConfig {
    /// Modes to attempt, in order. Non-adaptive runs try exactly the selected mode.
    pub fn ladder(&self) -> Vec<StrictnessMode> {
        let mut modes: Vec<StrictnessMode> = if self.adaptive {
            self.strictness_mode.ladder().collect()
        } else {
            vec![self.strictness_mode]
        };
        if let Some(limit) = self.max_attempts {
            modes.truncate(limit.get() as usize);
        }
        modes
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Weekly teaching hours a teacher can absorb across the grid.
    pub fn weekly_teacher_budget(&self, max_daily_hours: u32) -> u32 {
        max_daily_hours * self.grid.days
    }
}
