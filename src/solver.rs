mod branching;
mod search;

pub use search::ConflictBasedSearch;

use crate::algorithm::LowLevelPolicy;
use crate::common::Solution;
use crate::error::MapfError;
use crate::stat::Stats;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The four conflict-based search variants. They share one search loop and
/// differ only in the [`SolverConfig`] they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Cbs,
    Ecbs,
    Eecbs,
    Acbs,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Cbs,
        Algorithm::Ecbs,
        Algorithm::Eecbs,
        Algorithm::Acbs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Algorithm::Cbs => "CBS",
            Algorithm::Ecbs => "ECBS",
            Algorithm::Eecbs => "EECBS",
            Algorithm::Acbs => "ACBS",
        }
    }

    pub fn solver_config(self, subopt_factor: f64) -> SolverConfig {
        match self {
            Algorithm::Cbs => SolverConfig {
                label: self.label(),
                low_level: LowLevelPolicy::Exact,
                replanning: Replanning::Full,
                ordering: HighLevelOrdering::BestFirst,
                concurrent_branching: false,
            },
            Algorithm::Ecbs | Algorithm::Eecbs => SolverConfig {
                label: self.label(),
                low_level: LowLevelPolicy::Focal { subopt_factor },
                replanning: Replanning::Full,
                ordering: HighLevelOrdering::Focal,
                concurrent_branching: false,
            },
            Algorithm::Acbs => SolverConfig {
                label: self.label(),
                low_level: LowLevelPolicy::Agile,
                replanning: Replanning::SegmentLocal,
                ordering: HighLevelOrdering::Focal,
                concurrent_branching: true,
            },
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Algorithm {
    type Err = MapfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cbs" => Ok(Algorithm::Cbs),
            "ecbs" => Ok(Algorithm::Ecbs),
            "eecbs" => Ok(Algorithm::Eecbs),
            "acbs" => Ok(Algorithm::Acbs),
            other => Err(MapfError::Config(format!("unknown solver {other:?}"))),
        }
    }
}

/// How a constrained agent's path is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replanning {
    /// From the agent's start at time 0 to its true goal.
    Full,
    /// Only the segment after the last waypoint reached before the new
    /// constraint, spliced onto the kept prefix.
    SegmentLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighLevelOrdering {
    /// Always expand the open node with the lowest (f, g).
    BestFirst,
    /// Expand from the nodes with `f <= w * f_min`, by weighted cost then conflict count.
    Focal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub label: &'static str,
    pub low_level: LowLevelPolicy,
    pub replanning: Replanning,
    pub ordering: HighLevelOrdering,
    pub concurrent_branching: bool,
}

/// Tuning knobs shared by every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverSettings {
    pub iteration_limit: usize,
    pub branching_time_slice: Duration,
    pub max_children_per_conflict: usize,
    /// Length of the temporal strategy's interval constraint. A fixed guess,
    /// not derived from map size or agent density.
    pub interval_duration: usize,
    pub branching_workers: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            iteration_limit: 20_000,
            branching_time_slice: Duration::from_millis(500),
            max_children_per_conflict: 4,
            interval_duration: 2,
            branching_workers: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Solved,
    /// Time, iteration or open-list budget ran out; the best node seen is returned.
    SuboptimalTimeout,
    NoInitialSolution,
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Solved => write!(f, "solved"),
            Status::SuboptimalTimeout => write!(f, "suboptimal-timeout"),
            Status::NoInitialSolution => write!(f, "no-initial-solution"),
            Status::Error(message) => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub algorithm: Algorithm,
    pub success: bool,
    /// Set only when a conflict-free node with every agent at its goal was accepted.
    pub optimal: bool,
    /// The accepted solution, or the best partial one when the budget ran out.
    pub solution: Option<Solution>,
    pub cost: usize,
    pub runtime: Duration,
    pub status: Status,
    pub stats: Stats,
}

impl SolveResult {
    pub fn label(&self) -> &'static str {
        self.algorithm.label()
    }

    /// Status as reported; EECBS only differs from ECBS here.
    pub fn status_label(&self) -> String {
        match self.algorithm {
            Algorithm::Eecbs => format!("{} (EECBS)", self.status),
            _ => self.status.to_string(),
        }
    }
}

pub trait Solver {
    fn solve(&mut self, timeout: Duration, subopt_factor: f64) -> SolveResult;
}
