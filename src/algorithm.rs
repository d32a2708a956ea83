mod agile;
mod astar;
mod astarfocal;

pub(crate) use agile::agile_a_star_search;
pub(crate) use astar::a_star_search;
pub(crate) use astarfocal::focal_a_star_search;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::common::{Constraint, Path};
use crate::map::manhattan_distance;
use crate::stat::Stats;

type Trace = HashMap<((usize, usize), usize), ((usize, usize), usize)>;

/// Node ordering used by the single-agent search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LowLevelPolicy {
    /// Plain A*, ordered by (g + h) with ties toward larger g.
    Exact,
    /// Focal search: candidates within `subopt_factor * f_min`, picked by an inflated heuristic.
    Focal { subopt_factor: f64 },
    /// Focal search with a wider bound and a position-only closed list.
    Agile,
}

pub(crate) const FOCAL_HEURISTIC_INFLATION: f64 = 1.05;
pub(crate) const AGILE_SUBOPT_FACTOR: f64 = 2.0;
pub(crate) const AGILE_HEURISTIC_INFLATION: f64 = 1.1;

/// One segment to plan: from `start` at global time `start_time` to `goal`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchRequest<'a> {
    pub(crate) agent: usize,
    pub(crate) start: (usize, usize),
    pub(crate) goal: (usize, usize),
    pub(crate) start_time: usize,
    pub(crate) constraints: &'a HashSet<Constraint>,
    pub(crate) deadline: Option<Instant>,
}

impl<'a> SearchRequest<'a> {
    pub(crate) fn new(
        agent: usize,
        start: (usize, usize),
        goal: (usize, usize),
        start_time: usize,
        constraints: &'a HashSet<Constraint>,
    ) -> Self {
        SearchRequest {
            agent,
            start,
            goal,
            start_time,
            constraints,
            deadline: None,
        }
    }

    pub(crate) fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Does the move `from -> to`, arriving at local `time`, break any constraint?
    pub(crate) fn is_violated(&self, from: (usize, usize), to: (usize, usize), time: usize) -> bool {
        let global_time = self.start_time + time;
        self.constraints
            .iter()
            .any(|constraint| constraint.is_violated(from, to, global_time))
    }

    /// Local time after which no constraint applies; beyond it the time
    /// dimension is collapsed so the search space stays finite.
    pub(crate) fn constraint_limit_time_step(&self) -> usize {
        self.constraints
            .iter()
            .map(Constraint::horizon)
            .max()
            .map_or(0, |horizon| horizon.saturating_sub(self.start_time))
    }

    /// The goal only counts once the agent may stay there for good.
    pub(crate) fn goal_hold_time_step(&self) -> Option<usize> {
        self.constraints
            .iter()
            .filter_map(|constraint| constraint.blocks_cell_until(self.goal))
            .max()
    }

    pub(crate) fn accepts_goal(&self, position: (usize, usize), g_cost: usize) -> bool {
        position == self.goal
            && self
                .goal_hold_time_step()
                .map_or(true, |hold| self.start_time + g_cost > hold)
    }

    pub(crate) fn heuristic(&self, position: (usize, usize)) -> usize {
        manhattan_distance(position, self.goal)
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Plan one segment with the given policy.
pub(crate) fn search(
    request: &SearchRequest,
    policy: LowLevelPolicy,
    map: &crate::map::Map,
    stats: &mut Stats,
) -> Option<Path> {
    match policy {
        LowLevelPolicy::Exact => a_star_search(map, request, stats),
        LowLevelPolicy::Focal { subopt_factor } => focal_a_star_search(
            map,
            request,
            subopt_factor,
            FOCAL_HEURISTIC_INFLATION,
            stats,
        ),
        LowLevelPolicy::Agile => agile_a_star_search(
            map,
            request,
            AGILE_SUBOPT_FACTOR,
            AGILE_HEURISTIC_INFLATION,
            stats,
        ),
    }
}

fn inflated_heuristic(h_open_cost: usize, inflation: f64) -> usize {
    (h_open_cost as f64 * inflation) as usize
}

fn construct_path(trace: &Trace, mut current: ((usize, usize), usize)) -> Path {
    let final_cost = current.1;
    let mut steps = vec![current.0];
    while let Some(&(pos, g_cost)) = trace.get(&current) {
        steps.push(pos);
        current = (pos, g_cost);
    }
    steps.reverse();

    // Length must be cost + 1 so sampling past the end keeps the agent at its goal.
    let goal = steps[steps.len() - 1];
    while steps.len() < final_cost + 1 {
        steps.push(goal);
    }
    Path::new(steps)
}
