//! Convergence engine: drives every object from `undefined` to `done`.
//!
//! Two interchangeable ordering policies sit behind `OrderingPolicy`:
//!
//! - `fixed_point`: repeated scans until a pass changes nothing. Objects
//!   created while preparing are picked up by later passes. This is the
//!   default and the only policy that tolerates graph growth during the
//!   run phase.
//! - `staged`: prepare everything first, then run in a static dependency
//!   order computed by `resolver`. Cycles fail before any code runs.
//!
//! `steps` holds the per-object prepare/run transitions both policies use.

pub mod dependency;
pub mod fixed_point;
pub mod report;
pub mod resolver;
pub mod staged;
pub mod steps;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::ObjectStore;
use crate::error::{CdistError, Result};

pub use dependency::requirements_satisfied;
pub use fixed_point::FixedPointScheduler;
pub use report::RunReport;
pub use resolver::DependencyResolver;
pub use staged::StagedScheduler;
pub use steps::ObjectSteps;


/// Ordering policy selector, as written in settings and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    FixedPoint,
    Staged,
}

impl Strategy {
    pub fn policy(self) -> Box<dyn OrderingPolicy> {
        match self {
            Strategy::FixedPoint => Box::new(FixedPointScheduler),
            Strategy::Staged => Box::new(StagedScheduler),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::FixedPoint => write!(f, "fixed_point"),
            Strategy::Staged => write!(f, "staged"),
        }
    }
}

impl FromStr for Strategy {
    type Err = CdistError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed_point" | "fixed-point" => Ok(Strategy::FixedPoint),
            "staged" => Ok(Strategy::Staged),
            other => Err(CdistError::Settings(format!(
                "unknown strategy '{}' (expected fixed_point or staged)",
                other
            ))),
        }
    }
}


/// Brings every object in `store` to `done`, or fails.
pub trait OrderingPolicy {
    fn strategy(&self) -> Strategy;

    fn converge(&self, store: &mut ObjectStore, steps: &ObjectSteps<'_>) -> Result<RunReport>;
}
