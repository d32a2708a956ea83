use super::branching::{spatial_children, BranchingPool};
use super::{Algorithm, HighLevelOrdering, Replanning, SolveResult, Solver, SolverSettings, Status};
use crate::algorithm::{search, LowLevelPolicy, SearchRequest};
use crate::common::{Agent, HighLevelNode, SearchContext, Solution};
use crate::decomposition::GoalDecomposition;
use crate::error::{MapfError, MapfResult};
use crate::map::Map;
use crate::stat::Stats;

use std::collections::{BTreeSet, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

enum Outcome {
    Solved(Arc<HighLevelNode>),
    /// Budget exhausted; carries the best node seen.
    Degraded(Arc<HighLevelNode>),
    NoInitialSolution,
}

/// Runs `body`, turning a panic into a [`MapfError::Runtime`] so nothing
/// unwinds past the solve boundary.
fn catch_panic<T>(body: impl FnOnce() -> MapfResult<T>) -> MapfResult<T> {
    catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(MapfError::Runtime(format!("search panicked: {message}")))
    })
}

/// Open list plus the id counter for newly inserted nodes.
struct Frontier {
    open: BTreeSet<Arc<HighLevelNode>>,
    next_id: usize,
}

impl Frontier {
    fn new() -> Self {
        Frontier {
            open: BTreeSet::new(),
            next_id: 0,
        }
    }

    fn push(&mut self, node: HighLevelNode) -> Arc<HighLevelNode> {
        let node = Arc::new(node.with_id(self.next_id));
        self.next_id += 1;
        self.open.insert(Arc::clone(&node));
        node
    }

    fn pop(&mut self, ordering: HighLevelOrdering, subopt_factor: f64) -> Option<Arc<HighLevelNode>> {
        match ordering {
            HighLevelOrdering::BestFirst => self.open.pop_first(),
            HighLevelOrdering::Focal => {
                // Focal is rebuilt from the whole open list on every pop.
                let f_min = self.open.first()?.f_cost;
                let bound = f_min as f64 * subopt_factor;
                let chosen = self
                    .open
                    .iter()
                    .filter(|node| node.f_cost as f64 <= bound)
                    .min_by_key(|node| node.focal_key())
                    .cloned()?;
                self.open.remove(&chosen);
                Some(chosen)
            }
        }
    }
}

/// Conflict-based search over one instance, configured by [`Algorithm`].
pub struct ConflictBasedSearch {
    map: Map,
    agents: Vec<Agent>,
    algorithm: Algorithm,
    settings: SolverSettings,
    stats: Stats,
}

impl ConflictBasedSearch {
    pub fn new(
        map: &Map,
        agents: Vec<Agent>,
        algorithm: Algorithm,
        settings: SolverSettings,
    ) -> Self {
        ConflictBasedSearch {
            map: map.clone(),
            agents,
            algorithm,
            settings,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn validate(&self, subopt_factor: f64) -> MapfResult<()> {
        if !subopt_factor.is_finite() || subopt_factor < 1.0 {
            return Err(MapfError::Config(format!(
                "sub-optimal factor must be at least 1.0, got {subopt_factor}"
            )));
        }

        let mut starts = HashSet::new();
        let mut goals = HashSet::new();
        for agent in &self.agents {
            if !agent.verify(&self.map) {
                return Err(MapfError::InvalidInstance(format!(
                    "agent {} starts or ends on a blocked cell",
                    agent.id
                )));
            }
            if !starts.insert(agent.start) || !goals.insert(agent.goal) {
                return Err(MapfError::InvalidInstance(format!(
                    "agent {} shares its start or goal with another agent",
                    agent.id
                )));
            }
        }
        Ok(())
    }

    /// Segment-local roots only plan to the first waypoint, so check the whole
    /// journey separately.
    fn unreachable_agent(&mut self, context: &SearchContext) -> Option<usize> {
        let empty = HashSet::new();
        for (index, agent) in context.agents.iter().enumerate() {
            let request = SearchRequest::new(index, agent.start, agent.goal, 0, &empty);
            if search(&request, LowLevelPolicy::Exact, &context.map, &mut self.stats).is_none() {
                return Some(agent.id);
            }
        }
        None
    }

    #[instrument(skip_all, name = "cbs", fields(solver = self.algorithm.label(), agents = self.agents.len()), level = "debug")]
    fn search(
        &mut self,
        start_time: Instant,
        timeout: Duration,
        subopt_factor: f64,
    ) -> MapfResult<Outcome> {
        self.validate(subopt_factor)?;
        let config = self.algorithm.solver_config(subopt_factor);

        let decomposition = GoalDecomposition::new(&self.agents, &self.map);
        let context = Arc::new(SearchContext {
            map: self.map.clone(),
            agents: self.agents.clone(),
            decomposition,
            low_level: config.low_level,
            replanning: config.replanning,
            subopt_factor,
        });

        // Dropped on every return below, which shuts the workers down.
        let pool = if config.concurrent_branching {
            Some(BranchingPool::new(&self.settings)?)
        } else {
            None
        };

        if config.replanning == Replanning::SegmentLocal {
            if let Some(agent) = self.unreachable_agent(&context) {
                debug!("agent {agent} cannot reach its goal");
                return Ok(Outcome::NoInitialSolution);
            }
        }

        let Some(root) = HighLevelNode::root(&context, &mut self.stats) else {
            return Ok(Outcome::NoInitialSolution);
        };

        let mut frontier = Frontier::new();
        let mut best = frontier.push(root);
        self.stats.high_level_generate_nodes += 1;
        let mut iterations = 0;

        loop {
            if start_time.elapsed() >= timeout {
                debug!("timeout after {iterations} iterations");
                break;
            }
            if iterations >= self.settings.iteration_limit {
                warn!("iteration limit {} reached", self.settings.iteration_limit);
                break;
            }
            let Some(current) = frontier.pop(config.ordering, subopt_factor) else {
                debug!("open list exhausted");
                break;
            };
            iterations += 1;
            self.stats.high_level_expand_nodes += 1;
            debug!(
                "Node {} ({}): f {} g {} e {} conflicts {}",
                current.id,
                current.tag,
                current.f_cost,
                current.g_cost,
                current.e_cost,
                current.conflicts.len()
            );

            if current.is_better_than(&best) {
                best = Arc::clone(&current);
            }

            if current.conflicts.is_empty() {
                if current.all_at_final_goals(&context) {
                    return Ok(Outcome::Solved(current));
                }
                match current.advance(&context, &mut self.stats) {
                    Some(advanced) => {
                        frontier.push(advanced);
                        self.stats.high_level_generate_nodes += 1;
                    }
                    None => debug!("Node {} cannot advance, dropped", current.id),
                }
                continue;
            }

            let conflict = current.conflicts[0];
            debug!("conflict: {conflict:?}");
            let children = match &pool {
                Some(pool) => pool.branch(&context, &current, conflict, &mut self.stats),
                None => spatial_children(&context, &current, &conflict, None, &mut self.stats),
            };
            for child in children {
                let child = frontier.push(child);
                self.stats.high_level_generate_nodes += 1;
                debug!("Expand Node {} into Node {} ({})", current.id, child.id, child.tag);
            }
        }

        Ok(Outcome::Degraded(best))
    }

    fn finish(&mut self, outcome: MapfResult<Outcome>, runtime: Duration) -> SolveResult {
        let (success, solution, cost, status) = match outcome {
            Ok(Outcome::Solved(node)) => (
                true,
                Some(Solution {
                    paths: node.paths.clone(),
                }),
                node.g_cost,
                Status::Solved,
            ),
            Ok(Outcome::Degraded(node)) => (
                false,
                Some(Solution {
                    paths: node.paths.clone(),
                }),
                node.g_cost,
                Status::SuboptimalTimeout,
            ),
            Ok(Outcome::NoInitialSolution) => (false, None, 0, Status::NoInitialSolution),
            Err(error) => {
                warn!("{} failed: {error}", self.algorithm);
                (false, None, 0, Status::Error(error.to_string()))
            }
        };

        self.stats.costs = cost;
        self.stats.time_ms = runtime.as_millis() as usize;
        self.stats.print(self.algorithm.label());

        SolveResult {
            algorithm: self.algorithm,
            success,
            optimal: success,
            solution,
            cost,
            runtime,
            status,
            stats: self.stats.clone(),
        }
    }
}

impl Solver for ConflictBasedSearch {
    fn solve(&mut self, timeout: Duration, subopt_factor: f64) -> SolveResult {
        let start_time = Instant::now();
        self.stats = Stats::default();
        let outcome = catch_panic(|| self.search(start_time, timeout, subopt_factor));
        let result = self.finish(outcome, start_time.elapsed());
        info!(
            "{}: {} in {:?}, cost {}",
            result.label(),
            result.status_label(),
            result.runtime,
            result.cost
        );
        result
    }
}
