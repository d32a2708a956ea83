use super::SolverSettings;
use crate::common::{BranchTag, Conflict, HighLevelNode, SearchContext};
use crate::error::{MapfError, MapfResult};
use crate::map::manhattan_distance;
use crate::stat::Stats;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

/// Ways of turning one conflict into constrained children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Interval constraint on the cell each agent enters.
    Temporal,
    /// Vertex constraint, or the matching directed edge constraint for a swap.
    Spatial,
    /// Spatial constraint on the agent closer to its final goal only.
    Priority,
}

impl Strategy {
    pub(crate) const ALL: [Strategy; 3] = [
        Strategy::Temporal,
        Strategy::Spatial,
        Strategy::Priority,
    ];

    pub(crate) fn generate(
        self,
        context: &SearchContext,
        parent: &HighLevelNode,
        conflict: &Conflict,
        interval_duration: usize,
        deadline: Option<Instant>,
        stats: &mut Stats,
    ) -> Vec<HighLevelNode> {
        let children = match self {
            Strategy::Temporal => {
                temporal_children(context, parent, conflict, interval_duration, deadline, stats)
            }
            Strategy::Spatial => spatial_children(context, parent, conflict, deadline, stats),
            Strategy::Priority => priority_children(context, parent, conflict, deadline, stats),
        };

        // Late results are dropped as a whole, as if the strategy never ran.
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Vec::new();
        }
        children
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Temporal => write!(f, "temporal"),
            Strategy::Spatial => write!(f, "spatial"),
            Strategy::Priority => write!(f, "priority"),
        }
    }
}

pub(crate) fn spatial_children(
    context: &SearchContext,
    parent: &HighLevelNode,
    conflict: &Conflict,
    deadline: Option<Instant>,
    stats: &mut Stats,
) -> Vec<HighLevelNode> {
    [conflict.agent_1, conflict.agent_2]
        .into_iter()
        .filter_map(|agent| {
            parent.constrained_child(
                context,
                agent,
                conflict.spatial_constraint(agent),
                BranchTag::Spatial(agent),
                deadline,
                stats,
            )
        })
        .collect()
}

pub(crate) fn temporal_children(
    context: &SearchContext,
    parent: &HighLevelNode,
    conflict: &Conflict,
    interval_duration: usize,
    deadline: Option<Instant>,
    stats: &mut Stats,
) -> Vec<HighLevelNode> {
    [conflict.agent_1, conflict.agent_2]
        .into_iter()
        .filter_map(|agent| {
            parent.constrained_child(
                context,
                agent,
                conflict.interval_constraint(agent, interval_duration),
                BranchTag::Temporal(agent),
                deadline,
                stats,
            )
        })
        .collect()
}

/// The agent with further to go keeps its path; the other one is constrained.
/// On a tie the second agent yields.
pub(crate) fn priority_children(
    context: &SearchContext,
    parent: &HighLevelNode,
    conflict: &Conflict,
    deadline: Option<Instant>,
    stats: &mut Stats,
) -> Vec<HighLevelNode> {
    let remaining =
        |agent: usize| manhattan_distance(parent.paths[agent].last(), context.agents[agent].goal);
    let constrained = if remaining(conflict.agent_1) < remaining(conflict.agent_2) {
        conflict.agent_1
    } else {
        conflict.agent_2
    };

    parent
        .constrained_child(
            context,
            constrained,
            conflict.spatial_constraint(constrained),
            BranchTag::Priority(constrained),
            deadline,
            stats,
        )
        .into_iter()
        .collect()
}

fn child_score(parent: &HighLevelNode, child: &HighLevelNode) -> f64 {
    let cost_increase = child.g_cost as f64 - parent.g_cost as f64;
    0.4 * cost_increase + 0.3 * child.conflicts.len() as f64 * 10.0 + 0.2 * child.f_cost as f64
}

/// Keeps at most `cap` children, lowest score first.
pub(crate) fn prune_children(
    parent: &HighLevelNode,
    mut children: Vec<HighLevelNode>,
    cap: usize,
) -> Vec<HighLevelNode> {
    if children.len() <= cap {
        return children;
    }
    children.sort_by(|a, b| child_score(parent, a).total_cmp(&child_score(parent, b)));
    children.truncate(cap);
    children
}

/// Runs all branching strategies for a conflict on a small blocking pool and
/// keeps whatever finishes inside the time slice. Owned by one solve call; the
/// runtime is shut down when the pool is dropped.
pub(crate) struct BranchingPool {
    runtime: Option<Runtime>,
    time_slice: Duration,
    max_children: usize,
    interval_duration: usize,
}

impl BranchingPool {
    pub(crate) fn new(settings: &SolverSettings) -> MapfResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(settings.branching_workers.max(1))
            .thread_name("branching-worker")
            .build()
            .map_err(|error| MapfError::Runtime(format!("cannot start branching pool: {error}")))?;

        Ok(BranchingPool {
            runtime: Some(runtime),
            time_slice: settings.branching_time_slice,
            max_children: settings.max_children_per_conflict,
            interval_duration: settings.interval_duration,
        })
    }

    pub(crate) fn branch(
        &self,
        context: &Arc<SearchContext>,
        parent: &Arc<HighLevelNode>,
        conflict: Conflict,
        stats: &mut Stats,
    ) -> Vec<HighLevelNode> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Vec::new();
        };

        stats.branching_rounds += 1;
        let deadline = Instant::now() + self.time_slice;
        let interval_duration = self.interval_duration;

        let children = runtime.block_on(async {
            let handles: Vec<_> = Strategy::ALL
                .into_iter()
                .map(|strategy| {
                    let context = Arc::clone(context);
                    let parent = Arc::clone(parent);
                    let handle = tokio::task::spawn_blocking(move || {
                        let mut stats = Stats::default();
                        let children = strategy.generate(
                            &context,
                            &parent,
                            &conflict,
                            interval_duration,
                            Some(deadline),
                            &mut stats,
                        );
                        (children, stats)
                    });
                    (strategy, handle)
                })
                .collect();

            let mut children = Vec::new();
            for (strategy, handle) in handles {
                match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), handle).await
                {
                    Ok(Ok((mut generated, strategy_stats))) => {
                        debug!("{strategy} strategy produced {} children", generated.len());
                        stats.merge(&strategy_stats);
                        children.append(&mut generated);
                    }
                    Ok(Err(error)) => warn!("{strategy} strategy failed: {error}"),
                    Err(_) => {
                        stats.branching_timeouts += 1;
                        debug!("{strategy} strategy missed its time slice");
                    }
                }
            }
            children
        });

        prune_children(parent, children, self.max_children)
    }
}

impl Drop for BranchingPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::LowLevelPolicy;
    use crate::common::{Agent, ConflictType, Constraint};
    use crate::decomposition::GoalDecomposition;
    use crate::map::Map;
    use crate::solver::Replanning;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    }

    // Agent 0 crosses the row, agent 1 crosses the column; they meet at (2, 2).
    fn crossing_context() -> SearchContext {
        let map = Map::new(5, 5);
        let agents = vec![
            Agent {
                id: 0,
                start: (0, 2),
                goal: (4, 2),
            },
            Agent {
                id: 1,
                start: (2, 0),
                goal: (2, 3),
            },
        ];
        let decomposition = GoalDecomposition::new(&agents, &map);
        SearchContext {
            map,
            agents,
            decomposition,
            low_level: LowLevelPolicy::Exact,
            replanning: Replanning::Full,
            subopt_factor: 1.2,
        }
    }

    fn crossing_root(context: &SearchContext) -> (HighLevelNode, Conflict) {
        let root = HighLevelNode::root(context, &mut Stats::default()).unwrap();
        let conflict = *root
            .conflicts
            .iter()
            .find(|c| matches!(c.conflict_type, ConflictType::Vertex { .. }))
            .unwrap();
        (root, conflict)
    }

    #[test]
    fn test_spatial_and_temporal_children_constrain_each_agent() {
        init_tracing();
        let context = crossing_context();
        let (root, conflict) = crossing_root(&context);

        let spatial = spatial_children(&context, &root, &conflict, None, &mut Stats::default());
        assert_eq!(spatial.len(), 2);
        assert_eq!(spatial[0].tag, BranchTag::Spatial(conflict.agent_1));
        assert_eq!(spatial[1].tag, BranchTag::Spatial(conflict.agent_2));

        let temporal =
            temporal_children(&context, &root, &conflict, 2, None, &mut Stats::default());
        assert_eq!(temporal.len(), 2);
        let expected = Constraint::Interval {
            position: conflict.entered_cell(conflict.agent_1),
            time_step: conflict.time_step(),
            duration: 2,
        };
        assert!(temporal[0].constraints[conflict.agent_1].contains(&expected));
    }

    #[test]
    fn test_priority_constrains_agent_closer_to_goal() {
        init_tracing();
        let context = crossing_context();
        let (root, conflict) = crossing_root(&context);

        // Both paths already end on their goals: a tie, so agent 2 yields.
        let children = priority_children(&context, &root, &conflict, None, &mut Stats::default());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].tag, BranchTag::Priority(conflict.agent_2));
    }

    #[test]
    fn test_prune_keeps_lowest_scores() {
        let context = crossing_context();
        let (root, conflict) = crossing_root(&context);
        let mut children = Vec::new();
        for strategy in Strategy::ALL {
            children.extend(strategy.generate(
                &context,
                &root,
                &conflict,
                2,
                None,
                &mut Stats::default(),
            ));
        }
        assert_eq!(children.len(), 5);

        let mut scores: Vec<f64> = children.iter().map(|c| child_score(&root, c)).collect();
        scores.sort_by(f64::total_cmp);
        let kept = prune_children(&root, children, 4);
        let kept_scores: Vec<f64> = kept.iter().map(|c| child_score(&root, c)).collect();
        assert_eq!(kept_scores, scores[..4]);
    }

    #[test]
    fn test_pool_branches_within_time_slice() {
        init_tracing();
        let context = Arc::new(crossing_context());
        let (root, conflict) = crossing_root(&context);
        let root = Arc::new(root);

        let pool = BranchingPool::new(&SolverSettings::default()).unwrap();
        let mut stats = Stats::default();
        let children = pool.branch(&context, &root, conflict, &mut stats);
        assert_eq!(children.len(), 4);
        assert_eq!(stats.branching_rounds, 1);
        assert_eq!(stats.branching_timeouts, 0);
        assert!(stats.low_level_expand_nodes > 0);
        drop(pool);
    }

    #[test]
    fn test_pool_with_expired_slice_yields_nothing() {
        init_tracing();
        let context = Arc::new(crossing_context());
        let (root, conflict) = crossing_root(&context);
        let root = Arc::new(root);

        let settings = SolverSettings {
            branching_time_slice: Duration::ZERO,
            ..SolverSettings::default()
        };
        let pool = BranchingPool::new(&settings).unwrap();
        let children = pool.branch(&context, &root, conflict, &mut Stats::default());
        assert!(children.is_empty());
    }
}
