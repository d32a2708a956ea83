mod constraint;
mod highlevel;
mod lowlevel;

pub use constraint::{detect_conflicts, Conflict, ConflictType, Constraint};
pub(crate) use highlevel::{BranchTag, HighLevelNode, SearchContext};
pub(crate) use lowlevel::LowLevelOpenNode;

use serde::{Deserialize, Serialize};

use crate::map::Map;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: usize,
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

impl Agent {
    pub fn verify(&self, map: &Map) -> bool {
        map.is_passable(self.start.0, self.start.1) && map.is_passable(self.goal.0, self.goal.1)
    }
}

/// One cell per time step starting at step 0. Sampling past the end yields the
/// last cell: the agent waits at its destination indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    steps: Vec<(usize, usize)>,
}

impl Path {
    /// Paths always contain at least the starting cell.
    pub fn new(steps: Vec<(usize, usize)>) -> Self {
        assert!(!steps.is_empty(), "a path needs at least one cell");
        Path { steps }
    }

    pub fn position_at(&self, time_step: usize) -> (usize, usize) {
        self.steps
            .get(time_step)
            .copied()
            .unwrap_or_else(|| self.last())
    }

    pub fn last(&self) -> (usize, usize) {
        self.steps[self.steps.len() - 1]
    }

    pub fn first(&self) -> (usize, usize) {
        self.steps[0]
    }

    pub fn cost(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[(usize, usize)] {
        &self.steps
    }

    /// Keep `self` up to (excluding) `time_step` and continue with `segment`,
    /// whose first cell must be the cell occupied at `time_step`.
    pub(crate) fn splice(&self, time_step: usize, segment: &Path) -> Path {
        debug_assert_eq!(self.position_at(time_step), segment.first());
        let prefix_len = time_step.min(self.steps.len());
        let mut steps = self.steps[..prefix_len].to_vec();
        // A segment may start beyond the stored path while the agent waits.
        while steps.len() < time_step {
            steps.push(self.last());
        }
        steps.extend_from_slice(segment.steps());
        Path::new(steps)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub paths: Vec<Path>,
}

impl Solution {
    pub fn cost(&self) -> usize {
        self.paths.iter().map(Path::cost).sum()
    }

    /// Checks endpoints, move legality and pairwise conflicts.
    pub fn verify(&self, map: &Map, agents: &[Agent]) -> bool {
        if self.paths.len() != agents.len() {
            return false;
        }

        for (agent, path) in agents.iter().zip(&self.paths) {
            if path.first() != agent.start || path.last() != agent.goal {
                return false;
            }
            for window in path.steps().windows(2) {
                let (from, to) = (window[0], window[1]);
                if !map.get_neighbors(from.0, from.1).contains(&to) {
                    return false;
                }
            }
        }

        detect_conflicts(&self.paths).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_past_end_is_last_cell() {
        let path = Path::new(vec![(0, 0), (1, 0), (2, 0)]);
        assert_eq!(path.cost(), 2);
        assert_eq!(path.position_at(1), (1, 0));
        assert_eq!(path.position_at(2), (2, 0));
        assert_eq!(path.position_at(3), (2, 0));
        assert_eq!(path.position_at(100), (2, 0));
    }

    #[test]
    fn test_single_cell_path_has_zero_cost() {
        let path = Path::new(vec![(4, 4)]);
        assert_eq!(path.cost(), 0);
        assert_eq!(path.position_at(7), (4, 4));
    }

    #[test]
    fn test_splice_replaces_suffix() {
        let path = Path::new(vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
        let segment = Path::new(vec![(1, 0), (1, 1), (2, 1)]);
        let spliced = path.splice(1, &segment);
        assert_eq!(spliced.steps(), &[(0, 0), (1, 0), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_splice_past_end_pads_with_wait() {
        let path = Path::new(vec![(0, 0), (1, 0)]);
        let segment = Path::new(vec![(1, 0), (2, 0)]);
        let spliced = path.splice(3, &segment);
        assert_eq!(spliced.steps(), &[(0, 0), (1, 0), (1, 0), (1, 0), (2, 0)]);
    }

    #[test]
    fn test_verify_rejects_teleport() {
        let map = Map::new(4, 1);
        let agents = vec![Agent {
            id: 0,
            start: (0, 0),
            goal: (2, 0),
        }];
        let good = Solution {
            paths: vec![Path::new(vec![(0, 0), (1, 0), (2, 0)])],
        };
        let bad = Solution {
            paths: vec![Path::new(vec![(0, 0), (2, 0)])],
        };
        assert!(good.verify(&map, &agents));
        assert!(!bad.verify(&map, &agents));
    }
}
