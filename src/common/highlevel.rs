use super::{detect_conflicts, Agent, Conflict, Constraint, Path};
use crate::algorithm::{search, LowLevelPolicy, SearchRequest};
use crate::decomposition::GoalDecomposition;
use crate::map::{manhattan_distance, Map};
use crate::solver::Replanning;
use crate::stat::Stats;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Everything a node needs to rebuild paths, shared read-only by the main
/// loop and the branching workers.
#[derive(Debug)]
pub(crate) struct SearchContext {
    pub(crate) map: Map,
    pub(crate) agents: Vec<Agent>,
    pub(crate) decomposition: GoalDecomposition,
    pub(crate) low_level: LowLevelPolicy,
    pub(crate) replanning: Replanning,
    pub(crate) subopt_factor: f64,
}

/// How a node was produced, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchTag {
    Root,
    Advance,
    Spatial(usize),
    Temporal(usize),
    Priority(usize),
}

impl fmt::Display for BranchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchTag::Root => write!(f, "ROOT"),
            BranchTag::Advance => write!(f, "ADVANCE"),
            BranchTag::Spatial(agent) => write!(f, "SPATIAL-A{agent}"),
            BranchTag::Temporal(agent) => write!(f, "TEMPORAL-A{agent}"),
            BranchTag::Priority(agent) => write!(f, "PRIORITY-A{agent}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HighLevelNode {
    pub(crate) id: usize,
    pub(crate) paths: Vec<Path>,
    pub(crate) constraints: Vec<HashSet<Constraint>>,
    pub(crate) conflicts: Vec<Conflict>,
    pub(crate) g_cost: usize, // Sum of path costs
    pub(crate) h_cost: usize, // Sum of distances to the next unreached target
    pub(crate) f_cost: usize,
    pub(crate) e_cost: usize, // floor(g + w * h)
    pub(crate) tag: BranchTag,
}

// Open list order: f, then g, then creation order.
impl Ord for HighLevelNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost
            .cmp(&other.f_cost)
            .then_with(|| self.g_cost.cmp(&other.g_cost))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HighLevelNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HighLevelNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HighLevelNode {}

impl HighLevelNode {
    fn from_parts(
        context: &SearchContext,
        paths: Vec<Path>,
        constraints: Vec<HashSet<Constraint>>,
        tag: BranchTag,
    ) -> Self {
        let g_cost = paths.iter().map(Path::cost).sum();
        let h_cost = context
            .agents
            .iter()
            .zip(&paths)
            .enumerate()
            .map(|(index, (agent, path))| {
                let target = context.decomposition.next_target(index, agent, path);
                manhattan_distance(path.last(), target)
            })
            .sum();
        let e_cost = (g_cost as f64 + context.subopt_factor * h_cost as f64) as usize;
        let conflicts = detect_conflicts(&paths);

        HighLevelNode {
            id: 0,
            paths,
            constraints,
            conflicts,
            g_cost,
            h_cost,
            f_cost: g_cost + h_cost,
            e_cost,
            tag,
        }
    }

    pub(crate) fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Focal list order: weighted cost, then conflict count, then creation order.
    pub(crate) fn focal_key(&self) -> (usize, usize, usize) {
        (self.e_cost, self.conflicts.len(), self.id)
    }

    /// Unconstrained plan for every agent: to the true goal for full replanning,
    /// to the first waypoint for segment-local replanning. `None` if any agent
    /// cannot be planned.
    pub(crate) fn root(context: &SearchContext, stats: &mut Stats) -> Option<Self> {
        let empty = HashSet::new();
        let mut paths = Vec::with_capacity(context.agents.len());

        for (index, agent) in context.agents.iter().enumerate() {
            let goal = match context.replanning {
                Replanning::Full => agent.goal,
                Replanning::SegmentLocal => context.decomposition.first_target(index),
            };
            let request = SearchRequest::new(index, agent.start, goal, 0, &empty);
            let Some(path) = search(&request, context.low_level, &context.map, stats) else {
                debug!("agent {} has no initial path to {goal:?}", agent.id);
                return None;
            };
            paths.push(path);
        }

        Some(Self::from_parts(
            context,
            paths,
            vec![HashSet::new(); context.agents.len()],
            BranchTag::Root,
        ))
    }

    /// Child with one more constraint on `agent`, whose path is rebuilt under
    /// its enlarged constraint set. `None` if the constraint is already present
    /// or the replan fails.
    pub(crate) fn constrained_child(
        &self,
        context: &SearchContext,
        agent: usize,
        constraint: Constraint,
        tag: BranchTag,
        deadline: Option<Instant>,
        stats: &mut Stats,
    ) -> Option<Self> {
        let mut constraints = self.constraints.clone();
        if !constraints[agent].insert(constraint) {
            debug!("agent {agent} already has {constraint:?}");
            return None;
        }

        let new_path = self.replan(context, agent, &constraints[agent], constraint, deadline, stats)?;
        debug!(
            "{tag}: agent {agent} replanned under {constraint:?}, cost {} -> {}",
            self.paths[agent].cost(),
            new_path.cost()
        );

        let mut paths = self.paths.clone();
        paths[agent] = new_path;
        Some(Self::from_parts(context, paths, constraints, tag))
    }

    fn replan(
        &self,
        context: &SearchContext,
        agent: usize,
        constraints: &HashSet<Constraint>,
        constraint: Constraint,
        deadline: Option<Instant>,
        stats: &mut Stats,
    ) -> Option<Path> {
        let info = &context.agents[agent];
        match context.replanning {
            Replanning::Full => {
                let request = SearchRequest::new(agent, info.start, info.goal, 0, constraints)
                    .with_deadline(deadline);
                search(&request, context.low_level, &context.map, stats)
            }
            Replanning::SegmentLocal => {
                let path = &self.paths[agent];
                // Parked on a waypoint when the constraint bites: move on to the
                // next target instead of coming back to the same cell later.
                if constraint.time_step() > path.cost() && path.last() != info.goal {
                    let target = context.decomposition.next_target(agent, info, path);
                    let start_time = path.cost();
                    let request =
                        SearchRequest::new(agent, path.last(), target, start_time, constraints)
                            .with_deadline(deadline);
                    let segment = search(&request, context.low_level, &context.map, stats)?;
                    return Some(path.splice(start_time, &segment));
                }

                let (segment_start, start_time) = context.decomposition.segment_start(
                    agent,
                    info,
                    path,
                    constraint.time_step(),
                );
                let request =
                    SearchRequest::new(agent, segment_start, path.last(), start_time, constraints)
                        .with_deadline(deadline);
                let segment = search(&request, context.low_level, &context.map, stats)?;
                Some(path.splice(start_time, &segment))
            }
        }
    }

    /// Extends every agent parked on an intermediate waypoint towards its next
    /// target. `None` if any extension fails.
    pub(crate) fn advance(&self, context: &SearchContext, stats: &mut Stats) -> Option<Self> {
        let mut paths = self.paths.clone();

        for (index, agent) in context.agents.iter().enumerate() {
            let path = &self.paths[index];
            if path.last() == agent.goal {
                continue;
            }

            let target = context.decomposition.next_target(index, agent, path);
            let start_time = path.cost();
            let request = SearchRequest::new(
                index,
                path.last(),
                target,
                start_time,
                &self.constraints[index],
            );
            let Some(segment) = search(&request, context.low_level, &context.map, stats) else {
                debug!(
                    "agent {} cannot extend from {:?} to {target:?} at {start_time}",
                    agent.id,
                    path.last()
                );
                return None;
            };
            paths[index] = path.splice(start_time, &segment);
        }

        Some(Self::from_parts(
            context,
            paths,
            self.constraints.clone(),
            BranchTag::Advance,
        ))
    }

    pub(crate) fn all_at_final_goals(&self, context: &SearchContext) -> bool {
        context
            .agents
            .iter()
            .zip(&self.paths)
            .all(|(agent, path)| path.last() == agent.goal)
    }

    pub(crate) fn is_terminal(&self, context: &SearchContext) -> bool {
        self.conflicts.is_empty() && self.all_at_final_goals(context)
    }

    /// Ranking for the best-effort answer: fewer conflicts first, then lower cost.
    pub(crate) fn is_better_than(&self, other: &HighLevelNode) -> bool {
        (self.conflicts.len(), self.g_cost) < (other.conflicts.len(), other.g_cost)
    }
}
