pub mod assignment;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod expertise;
pub mod model;
pub mod schedule;
pub mod server;
pub mod solver;

pub use config::{SolverConfig, StrictnessMode};
pub use data::{SchedulingInput, SchedulingOutput};
pub use error::{Result, TimetableError};
pub use solver::solve;
