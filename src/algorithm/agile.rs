use super::{construct_path, inflated_heuristic, SearchRequest, Trace};
use crate::common::{LowLevelOpenNode, Path};
use crate::map::Map;
use crate::stat::Stats;

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, instrument, trace};

/// Aggressive focal search. The closed list is keyed by position alone, so a
/// cell is expanded at most once and the agent never waits: fast, but neither
/// complete nor bounded once constraints force waiting.
#[instrument(skip_all, name="agile_a_star", fields(agent = request.agent, start = format!("{:?}", request.start), goal = format!("{:?}", request.goal), start_time = request.start_time), level = "debug")]
pub(crate) fn agile_a_star_search(
    map: &Map,
    request: &SearchRequest,
    subopt_factor: f64,
    heuristic_inflation: f64,
    stats: &mut Stats,
) -> Option<Path> {
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

        // The goal is never closed, so a later arrival can still be accepted
        // when an earlier one was too soon to stay.
        if current.position != request.goal && !closed_list.insert(current.position) {
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

        let tentative_g_cost = current.g_cost + 1;
        for neighbor in map.get_neighbors(current.position.0, current.position.1) {
            if neighbor == current.position || closed_list.contains(&neighbor) {
                continue;
            }

            if request.is_violated(current.position, neighbor, tentative_g_cost) {
                continue;
            }

            if open_list.insert(LowLevelOpenNode {
                position: neighbor,
                f_open_cost: tentative_g_cost + request.heuristic(neighbor),
                g_cost: tentative_g_cost,
                time_step: tentative_g_cost,
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
