use super::{construct_path, inflated_heuristic, SearchRequest, Trace};
use crate::common::{LowLevelOpenNode, Path};
use crate::map::Map;
use crate::stat::Stats;

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, instrument, trace};

/// Bounded-suboptimal A*: the path cost is at most `subopt_factor` times optimal.
///
/// The focal list is rebuilt from the whole open list before every expansion:
/// every open node with `f <= subopt_factor * f_min` is a candidate and the one
/// with the smallest inflated heuristic wins.
#[instrument(skip_all, name="focal_a_star", fields(agent = request.agent, subopt_factor = subopt_factor, start = format!("{:?}", request.start), goal = format!("{:?}", request.goal), start_time = request.start_time), level = "debug")]
pub(crate) fn focal_a_star_search(
    map: &Map,
    request: &SearchRequest,
    subopt_factor: f64,
    heuristic_inflation: f64,
    stats: &mut Stats,
) -> Option<Path> {
    let constraint_limit_time_step = request.constraint_limit_time_step();
    debug!(
        "constraints: {:?}, limit time step: {constraint_limit_time_step:?}",
        request.constraints
    );

    // Open list is indexed based on (f_open_cost, g_cost(time), position)
    let mut open_list = BTreeSet::new();
    let mut closed_list = HashSet::new();
    let mut trace = Trace::new();

    open_list.insert(LowLevelOpenNode {
        position: request.start,
        f_open_cost: request.heuristic(request.start),
        g_cost: 0,
        time_step: 0,
    });

    while let Some(f_min) = open_list.first().map(|node| node.f_open_cost) {
        if request.timed_out() {
            debug!("search interrupted by deadline");
            return None;
        }

        let bound = f_min as f64 * subopt_factor;
        let Some(current) = open_list
            .iter()
            .filter(|node| node.f_open_cost as f64 <= bound)
            .map(|node| {
                node.to_focal_node(inflated_heuristic(
                    request.heuristic(node.position),
                    heuristic_inflation,
                ))
            })
            .min()
        else {
            break;
        };

        let current = current.to_open_node();
        open_list.remove(&current);

        if !closed_list.insert((current.position, current.time_step)) {
            continue;
        }
        trace!("expand node: {current:?}");
        stats.low_level_expand_nodes += 1;

        if request.accepts_goal(current.position, current.g_cost) {
            debug!("find solution with f min {f_min:?}");
            return Some(construct_path(
                &trace,
                (current.position, current.g_cost),
            ));
        }

        // Assuming uniform cost.
        let tentative_g_cost = current.g_cost + 1;
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
                continue; // This move is prohibited due to a constraint
            }

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
