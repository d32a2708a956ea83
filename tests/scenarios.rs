use mapf_acbs::common::{detect_conflicts, Agent};
use mapf_acbs::decomposition::GoalDecomposition;
use mapf_acbs::map::Map;
use mapf_acbs::scenario::generate_random_agents;
use mapf_acbs::solver::{Algorithm, ConflictBasedSearch, SolveResult, Solver, SolverSettings, Status};

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn agent(id: usize, start: (usize, usize), goal: (usize, usize)) -> Agent {
    Agent { id, start, goal }
}

fn run(map: &Map, agents: &[Agent], algorithm: Algorithm, w: f64) -> SolveResult {
    let mut solver =
        ConflictBasedSearch::new(map, agents.to_vec(), algorithm, SolverSettings::default());
    solver.solve(Duration::from_secs(10), w)
}

fn assert_solved(map: &Map, agents: &[Agent], result: &SolveResult) {
    assert!(
        result.success,
        "{} did not solve: {}",
        result.label(),
        result.status_label()
    );
    assert!(result.optimal);
    assert_eq!(result.status, Status::Solved);
    let solution = result.solution.as_ref().unwrap();
    assert!(detect_conflicts(&solution.paths).is_empty());
    assert!(solution.verify(map, agents));
    assert_eq!(result.cost, solution.cost());
}

// Three agents that never meet on an 8x8 grid with a short wall.
#[test]
fn scenario_a_independent_agents() {
    init_tracing();
    let mut map = Map::new(8, 8);
    map.set_obstacle(3, 3, true);
    map.set_obstacle(3, 4, true);
    let agents = vec![
        agent(0, (0, 0), (4, 0)),
        agent(1, (7, 0), (7, 4)),
        agent(2, (0, 7), (4, 7)),
    ];

    for algorithm in Algorithm::ALL {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
        assert!(result.cost as f64 <= 12.0 * 1.2);
    }

    let result = run(&map, &agents, Algorithm::Cbs, 1.0);
    assert_eq!(result.cost, 12);
}

// A corridor with a single side pocket: the agents must swap ends.
fn swap_corridor() -> (Map, Vec<Agent>) {
    let mut map = Map::new(4, 2);
    for x in [0, 2, 3] {
        map.set_obstacle(x, 1, true);
    }
    let agents = vec![agent(0, (0, 0), (3, 0)), agent(1, (3, 0), (0, 0))];
    (map, agents)
}

#[test]
fn scenario_b_swap_is_resolved() {
    init_tracing();
    let (map, agents) = swap_corridor();

    for algorithm in [Algorithm::Cbs, Algorithm::Ecbs, Algorithm::Eecbs] {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
    }

    // Agent 0 ducks into the pocket and agent 1 slips past: 5 + 3.
    let result = run(&map, &agents, Algorithm::Cbs, 1.0);
    assert_eq!(result.cost, 8);
}

#[test]
fn scenario_b_agile_variant_never_claims_a_bad_solution() {
    init_tracing();
    let (map, agents) = swap_corridor();
    let result = run(&map, &agents, Algorithm::Acbs, 1.2);
    if result.success {
        assert_solved(&map, &agents, &result);
    } else {
        assert!(!result.optimal);
        assert_eq!(result.status, Status::SuboptimalTimeout);
    }
}

#[test]
fn scenario_c_agent_already_at_goal() {
    init_tracing();
    let map = Map::new(5, 5);
    let agents = vec![agent(0, (2, 2), (2, 2)), agent(1, (0, 0), (4, 0))];

    for algorithm in Algorithm::ALL {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
        let solution = result.solution.unwrap();
        assert_eq!(solution.paths[0].steps(), &[(2, 2)]);
        assert_eq!(solution.paths[0].cost(), 0);
    }
}

#[test]
fn scenario_d_unreachable_goal() {
    init_tracing();
    let mut map = Map::new(5, 5);
    for y in 0..5 {
        map.set_obstacle(2, y, true);
    }
    let agents = vec![agent(0, (0, 0), (4, 4)), agent(1, (0, 4), (1, 0))];

    for algorithm in Algorithm::ALL {
        let result = run(&map, &agents, algorithm, 1.2);
        assert!(!result.success);
        assert!(!result.optimal);
        assert_eq!(result.status, Status::NoInitialSolution);
        assert_eq!(result.status.to_string(), "no-initial-solution");
        assert!(result.solution.is_none());
    }
}

#[test]
fn scenario_d_unreachable_goal_behind_reachable_waypoint() {
    init_tracing();
    let mut map = Map::new(14, 3);
    for y in 0..3 {
        map.set_obstacle(10, y, true);
    }
    let agents = vec![agent(0, (0, 1), (13, 1))];

    // The first waypoint lies before the wall; the goal does not.
    let decomposition = GoalDecomposition::new(&agents, &map);
    assert!(decomposition.chain(0).len() > 1);

    let result = run(&map, &agents, Algorithm::Acbs, 1.2);
    assert_eq!(result.status, Status::NoInitialSolution);
}

#[test]
fn long_journeys_are_solved_segment_by_segment() {
    init_tracing();
    let map = Map::new(20, 20);
    let agents = vec![
        agent(0, (0, 0), (19, 19)),
        agent(1, (19, 0), (0, 19)),
        agent(2, (0, 10), (19, 10)),
    ];
    let decomposition = GoalDecomposition::new(&agents, &map);
    assert!((0..agents.len()).all(|index| decomposition.chain(index).len() > 1));

    for algorithm in Algorithm::ALL {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
    }
}

#[test]
fn random_instances_success_means_conflict_free() {
    init_tracing();
    let mut map = Map::new(8, 8);
    for &(x, y) in &[(2, 2), (2, 3), (5, 4), (5, 5), (4, 1)] {
        map.set_obstacle(x, y, true);
    }

    for seed in 0..3 {
        let mut rng = StdRng::seed_from_u64(seed);
        let agents = generate_random_agents(&map, 5, &mut rng).unwrap();
        for algorithm in Algorithm::ALL {
            let mut solver = ConflictBasedSearch::new(
                &map,
                agents.clone(),
                algorithm,
                SolverSettings::default(),
            );
            let result = solver.solve(Duration::from_secs(3), 1.2);
            if result.success {
                assert_solved(&map, &agents, &result);
            } else {
                assert!(!result.optimal);
            }
        }
    }
}

#[test]
fn waypoint_chains_end_at_goals_on_free_cells() {
    let mut map = Map::new(32, 32);
    for y in 4..28 {
        map.set_obstacle(12, y, true);
        map.set_obstacle(20, 31 - y, true);
    }
    let mut rng = StdRng::seed_from_u64(11);
    let agents = generate_random_agents(&map, 40, &mut rng).unwrap();
    let decomposition = GoalDecomposition::new(&agents, &map);

    for (index, agent) in agents.iter().enumerate() {
        let chain = decomposition.chain(index);
        assert_eq!(chain.last(), Some(&agent.goal));
        assert!(chain.iter().all(|&(x, y)| map.is_passable(x, y)));
    }
}

// Four agents rotating around a 2x2 block plus two long crossers.
#[test]
fn deadlock_rotation_is_untangled() {
    init_tracing();
    let map = Map::new(6, 6);
    let agents = vec![
        agent(0, (1, 1), (1, 2)),
        agent(1, (1, 2), (2, 2)),
        agent(2, (2, 2), (2, 1)),
        agent(3, (2, 1), (1, 1)),
        agent(4, (4, 1), (4, 4)),
        agent(5, (1, 4), (4, 1)),
    ];

    for algorithm in Algorithm::ALL {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
    }

    // The ring turns in one step: 4 + 3 + 6.
    let result = run(&map, &agents, Algorithm::Cbs, 1.0);
    assert_eq!(result.cost, 13);
}

// Diagonal and axis crossers around a 2x2 block in the middle of an 8x8 grid.
#[test]
fn crossing_diagonals_around_central_block() {
    init_tracing();
    let mut map = Map::new(8, 8);
    for &(x, y) in &[(3, 3), (3, 4), (4, 3), (4, 4)] {
        map.set_obstacle(x, y, true);
    }
    let agents = vec![
        agent(0, (0, 0), (7, 7)),
        agent(1, (7, 0), (0, 7)),
        agent(2, (3, 0), (3, 7)),
        agent(3, (0, 3), (7, 3)),
    ];

    for algorithm in [Algorithm::Cbs, Algorithm::Ecbs, Algorithm::Eecbs] {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
    }

    let result = run(&map, &agents, Algorithm::Acbs, 1.2);
    if result.success {
        assert_solved(&map, &agents, &result);
    } else {
        assert!(!result.optimal);
    }
}

// One agent stops on its first waypoint long before a second agent, on a
// longer first segment, walks over the same cell.
#[test]
fn waypoint_crossed_after_arrival_is_resolved() {
    init_tracing();
    let map = Map::new(32, 32);
    let agents = vec![agent(0, (0, 10), (18, 10)), agent(1, (6, 0), (6, 30))];
    let decomposition = GoalDecomposition::new(&agents, &map);
    assert_eq!(decomposition.first_target(0), (6, 10));
    assert_eq!(decomposition.first_target(1), (6, 10));

    for algorithm in Algorithm::ALL {
        let result = run(&map, &agents, algorithm, 1.2);
        assert_solved(&map, &agents, &result);
    }
}
