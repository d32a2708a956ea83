use super::{construct_path, SearchRequest, Trace};
use crate::common::{LowLevelOpenNode, Path};
use crate::map::Map;
use crate::stat::Stats;

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, instrument, trace};

#[instrument(skip_all, name="a_star", fields(agent = request.agent, start = format!("{:?}", request.start), goal = format!("{:?}", request.goal), start_time = request.start_time), level = "debug")]
pub(crate) fn a_star_search(map: &Map, request: &SearchRequest, stats: &mut Stats) -> Option<Path> {
    let constraint_limit_time_step = request.constraint_limit_time_step();
    debug!(
        "constraints: {:?}, limit time step: {constraint_limit_time_step:?}",
        request.constraints
    );

    let mut open_list = BTreeSet::new();
    let mut closed_list = HashSet::new();
    let mut trace = Trace::new();

    open_list.insert(LowLevelOpenNode {
        position: request.start,
        f_open_cost: request.heuristic(request.start),
        g_cost: 0,
        time_step: 0,
    });

    while let Some(current) = open_list.pop_first() {
        if request.timed_out() {
            debug!("search interrupted by deadline");
            return None;
        }

        // Duplicates of a closed state may linger after the time dimension collapses.
        if !closed_list.insert((current.position, current.time_step)) {
            continue;
        }
        trace!("expand node: {current:?}");
        stats.low_level_expand_nodes += 1;

        if request.accepts_goal(current.position, current.g_cost) {
            return Some(construct_path(
                &trace,
                (current.position, current.g_cost),
            ));
        }

        // Assuming uniform cost, which also indicate the current time.
        let tentative_g_cost = current.g_cost + 1;

        // Tricky: after the constraint limit we freeze the time step, so the
        // search demotes to 2-D A* and the closed list bounds it.
        let tentative_time_step = if current.time_step > constraint_limit_time_step {
            current.time_step
        } else {
            current.time_step + 1
        };

        for neighbor in map.get_neighbors(current.position.0, current.position.1) {
            if closed_list.contains(&(neighbor, tentative_time_step)) {
                continue;
            }

            if request.is_violated(current.position, neighbor, tentative_g_cost) {
                continue; // This move is prohibited due to a constraint.
            }

            // If this node is already in the open list, we ignore this update.
            if open_list.insert(LowLevelOpenNode {
                position: neighbor,
                f_open_cost: tentative_g_cost + request.heuristic(neighbor),
                g_cost: tentative_g_cost,
                time_step: tentative_time_step,
            }) {
                trace
                    .entry((neighbor, tentative_g_cost))
                    .or_insert((current.position, current.g_cost));
            }
        }
    }

    debug!("cannot find solution");
    None
}
