//! Splits long journeys into waypoint chains so the conflict tree can plan and
//! advance agents one segment at a time.

use crate::common::{Agent, Path};
use crate::map::{manhattan_distance, Map};

use tracing::{debug, trace};

/// Journeys longer than this (Manhattan) get intermediate waypoints.
pub const DECOMPOSITION_DISTANCE: usize = 6;
const SEARCH_RADIUS: isize = 2;

/// Per-agent waypoint chains, each ending at the agent's true goal.
/// Computed once per instance and read-only afterwards.
#[derive(Debug, Clone)]
pub struct GoalDecomposition {
    chains: Vec<Vec<(usize, usize)>>,
}

impl GoalDecomposition {
    pub fn new(agents: &[Agent], map: &Map) -> Self {
        let chains = agents
            .iter()
            .map(|agent| Self::compute_chain(agent, map))
            .collect();
        GoalDecomposition { chains }
    }

    /// Free cell closest to the point one third of the way from `start` to `goal`,
    /// looked up in the 5x5 window around that point.
    fn intermediate_goal(
        start: (usize, usize),
        goal: (usize, usize),
        map: &Map,
    ) -> Option<(usize, usize)> {
        let t = 1.0 / 3.0;
        let cx = (start.0 as f64 + t * (goal.0 as f64 - start.0 as f64)).round() as isize;
        let cy = (start.1 as f64 + t * (goal.1 as f64 - start.1 as f64)).round() as isize;

        let mut best = None;
        let mut best_dist = usize::MAX;
        for ox in -SEARCH_RADIUS..=SEARCH_RADIUS {
            for oy in -SEARCH_RADIUS..=SEARCH_RADIUS {
                let (nx, ny) = (cx + ox, cy + oy);
                if nx < 0 || ny < 0 || map.is_obstacle(nx as usize, ny as usize) {
                    continue;
                }
                let dist = ox.unsigned_abs() + oy.unsigned_abs();
                if dist < best_dist {
                    best_dist = dist;
                    best = Some((nx as usize, ny as usize));
                }
            }
        }

        best
    }

    fn compute_chain(agent: &Agent, map: &Map) -> Vec<(usize, usize)> {
        let mut waypoints = Vec::new();
        let mut current = agent.start;

        while manhattan_distance(current, agent.goal) > DECOMPOSITION_DISTANCE {
            let Some(intermediate) = Self::intermediate_goal(current, agent.goal, map) else {
                break;
            };
            if intermediate == current || intermediate == agent.goal {
                break;
            }
            // The snap window can push a candidate away from the goal; stop rather than cycle.
            if manhattan_distance(intermediate, agent.goal) >= manhattan_distance(current, agent.goal)
            {
                break;
            }
            waypoints.push(intermediate);
            current = intermediate;
        }

        waypoints.push(agent.goal);
        trace!("agent {} waypoints {waypoints:?}", agent.id);
        waypoints
    }

    /// Waypoint chain of the agent at `index`, ending at its goal.
    pub fn chain(&self, index: usize) -> &[(usize, usize)] {
        &self.chains[index]
    }

    /// Next unreached target for a path: the first waypoint whose predecessor
    /// (the start for the first one) is the path's end cell. `None` when the end
    /// cell is neither the start, a waypoint nor the goal.
    pub fn effective_goal(
        &self,
        index: usize,
        agent: &Agent,
        path: &Path,
    ) -> Option<(usize, usize)> {
        let end = path.last();
        if end == agent.goal {
            return Some(agent.goal);
        }

        let mut predecessor = agent.start;
        for &waypoint in self.chain(index) {
            if end == predecessor {
                return Some(waypoint);
            }
            predecessor = waypoint;
        }
        None
    }

    /// `effective_goal`, falling back to the true goal when the path end is not
    /// an acknowledged waypoint.
    pub fn next_target(&self, index: usize, agent: &Agent, path: &Path) -> (usize, usize) {
        self.effective_goal(index, agent, path).unwrap_or_else(|| {
            debug!(
                "agent {} path ends off its waypoint chain at {:?}, targeting final goal",
                agent.id,
                path.last()
            );
            agent.goal
        })
    }

    /// First segment target for a fresh plan from the start.
    pub fn first_target(&self, index: usize) -> (usize, usize) {
        self.chain(index)[0]
    }

    /// `(cell, time)` for the start and every waypoint the path reaches in chain order.
    pub fn reached_waypoints(
        &self,
        index: usize,
        agent: &Agent,
        path: &Path,
    ) -> Vec<((usize, usize), usize)> {
        let mut reached = vec![(agent.start, 0)];
        let mut from_time = 0;
        for &waypoint in self.chain(index) {
            match (from_time..path.len()).find(|&t| path.position_at(t) == waypoint) {
                Some(time_step) => {
                    reached.push((waypoint, time_step));
                    from_time = time_step;
                }
                None => break,
            }
        }
        reached
    }

    /// Where a segment-local replan must begin so that a constraint at `time_step`
    /// can still be dodged: the last reached waypoint strictly before that time.
    pub fn segment_start(
        &self,
        index: usize,
        agent: &Agent,
        path: &Path,
        time_step: usize,
    ) -> ((usize, usize), usize) {
        self.reached_waypoints(index, agent, path)
            .into_iter()
            .filter(|&(_, reached_at)| reached_at < time_step)
            .last()
            .unwrap_or((agent.start, 0))
    }
}
