use super::Path;

use std::hash::Hash;
use tracing::trace;

/// A restriction on one agent, always expressed in global time.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, Ord, PartialOrd)]
pub enum Constraint {
    /// Forbids being at `position` at exactly `time_step`.
    Vertex {
        position: (usize, usize),
        time_step: usize,
    },
    /// Forbids the transition `from_position -> to_position` arriving at `to_time_step`.
    Edge {
        from_position: (usize, usize),
        to_position: (usize, usize),
        to_time_step: usize,
    },
    /// Forbids `position` for every time in `[time_step, time_step + duration)`.
    Interval {
        position: (usize, usize),
        time_step: usize,
        duration: usize,
    },
}

impl Constraint {
    /// Would moving `from -> to`, arriving at global `time`, break this constraint?
    pub fn is_violated(&self, from: (usize, usize), to: (usize, usize), time: usize) -> bool {
        match *self {
            Constraint::Vertex {
                position,
                time_step,
            } => to == position && time == time_step,
            Constraint::Edge {
                from_position,
                to_position,
                to_time_step,
            } => from == from_position && to == to_position && time == to_time_step,
            Constraint::Interval {
                position,
                time_step,
                duration,
            } => to == position && time >= time_step && time < time_step + duration,
        }
    }

    /// First global time step this constraint can affect.
    pub fn time_step(&self) -> usize {
        match *self {
            Constraint::Vertex { time_step, .. } | Constraint::Interval { time_step, .. } => {
                time_step
            }
            Constraint::Edge { to_time_step, .. } => to_time_step,
        }
    }

    /// Last global time step this constraint can affect.
    pub fn horizon(&self) -> usize {
        match *self {
            Constraint::Vertex { time_step, .. } => time_step,
            Constraint::Edge { to_time_step, .. } => to_time_step,
            Constraint::Interval {
                time_step,
                duration,
                ..
            } => (time_step + duration).saturating_sub(1),
        }
    }

    /// Last global time step at which standing on `cell` is forbidden, if any.
    pub fn blocks_cell_until(&self, cell: (usize, usize)) -> Option<usize> {
        match *self {
            Constraint::Vertex {
                position,
                time_step,
            } if position == cell => Some(time_step),
            Constraint::Interval {
                position,
                time_step,
                duration,
            } if position == cell && duration > 0 => Some(time_step + duration - 1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictType {
    /// Both agents occupy `position` at `time_step`.
    Vertex {
        position: (usize, usize),
        time_step: usize,
    },
    /// Agent 1 moves `from -> to` while agent 2 moves `to -> from`, arriving at `time_step`.
    Edge {
        from: (usize, usize),
        to: (usize, usize),
        time_step: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Conflict {
    pub agent_1: usize,
    pub agent_2: usize,
    pub conflict_type: ConflictType,
}

impl Conflict {
    pub fn time_step(&self) -> usize {
        match self.conflict_type {
            ConflictType::Vertex { time_step, .. } | ConflictType::Edge { time_step, .. } => {
                time_step
            }
        }
    }

    /// The cell `agent` enters at the conflict time.
    pub fn entered_cell(&self, agent: usize) -> (usize, usize) {
        match self.conflict_type {
            ConflictType::Vertex { position, .. } => position,
            ConflictType::Edge { from, to, .. } => {
                if agent == self.agent_1 {
                    to
                } else {
                    from
                }
            }
        }
    }

    /// Cell or move constraint that forbids `agent`'s part in this conflict.
    pub fn spatial_constraint(&self, agent: usize) -> Constraint {
        match self.conflict_type {
            ConflictType::Vertex {
                position,
                time_step,
            } => Constraint::Vertex {
                position,
                time_step,
            },
            ConflictType::Edge {
                from,
                to,
                time_step,
            } => {
                let (from_position, to_position) = if agent == self.agent_1 {
                    (from, to)
                } else {
                    (to, from)
                };
                Constraint::Edge {
                    from_position,
                    to_position,
                    to_time_step: time_step,
                }
            }
        }
    }

    /// Interval constraint on the cell `agent` enters at the conflict time.
    pub fn interval_constraint(&self, agent: usize, duration: usize) -> Constraint {
        Constraint::Interval {
            position: self.entered_cell(agent),
            time_step: self.time_step(),
            duration,
        }
    }
}

/// All vertex and edge conflicts between every unordered pair of paths.
pub fn detect_conflicts(paths: &[Path]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            let path1 = &paths[i];
            let path2 = &paths[j];
            let max_length = path1.len().max(path2.len());

            for step in 0..max_length {
                let pos1 = path1.position_at(step);
                let pos2 = path2.position_at(step);

                // Check for Vertex Conflict.
                if pos1 == pos2 {
                    conflicts.push(Conflict {
                        agent_1: i,
                        agent_2: j,
                        conflict_type: ConflictType::Vertex {
                            position: pos1,
                            time_step: step,
                        },
                    });
                }

                if step == 0 {
                    continue;
                }

                // Check for Edge Conflict. Two agents waiting together is only a vertex conflict.
                let prev_pos1 = path1.position_at(step - 1);
                let prev_pos2 = path2.position_at(step - 1);
                if prev_pos1 != pos1 && pos1 == prev_pos2 && pos2 == prev_pos1 {
                    conflicts.push(Conflict {
                        agent_1: i,
                        agent_2: j,
                        conflict_type: ConflictType::Edge {
                            from: prev_pos1,
                            to: pos1,
                            time_step: step,
                        },
                    });
                }
            }
        }
    }

    trace!("Detect conflicts: {:?}", conflicts);
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(steps: &[(usize, usize)]) -> Path {
        Path::new(steps.to_vec())
    }

    #[test]
    fn test_vertex_conflict_detected() {
        let paths = vec![
            path(&[(0, 0), (1, 0), (2, 0)]),
            path(&[(1, 1), (1, 0), (1, 1)]),
        ];
        let conflicts = detect_conflicts(&paths);
        assert_eq!(
            conflicts,
            vec![Conflict {
                agent_1: 0,
                agent_2: 1,
                conflict_type: ConflictType::Vertex {
                    position: (1, 0),
                    time_step: 1,
                },
            }]
        );
    }

    #[test]
    fn test_edge_conflict_detected() {
        let paths = vec![
            path(&[(0, 0), (1, 0), (2, 0), (3, 0)]),
            path(&[(3, 0), (2, 0), (1, 0), (0, 0)]),
        ];
        let conflicts = detect_conflicts(&paths);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].conflict_type,
            ConflictType::Edge {
                from: (1, 0),
                to: (2, 0),
                time_step: 2,
            }
        );
    }

    #[test]
    fn test_conflict_with_agent_waiting_at_goal() {
        // Agent 0 finished at (1, 0); agent 1 passes through at step 3.
        let paths = vec![
            path(&[(0, 0), (1, 0)]),
            path(&[(1, 3), (1, 2), (1, 1), (1, 0), (2, 0)]),
        ];
        let conflicts = detect_conflicts(&paths);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].time_step(), 3);
    }

    #[test]
    fn test_shared_wait_is_not_an_edge_conflict() {
        let paths = vec![path(&[(0, 0), (1, 0), (1, 0)]), path(&[(2, 0), (1, 0), (1, 0)])];
        let conflicts = detect_conflicts(&paths);
        assert!(conflicts
            .iter()
            .all(|c| matches!(c.conflict_type, ConflictType::Vertex { .. })));
        assert_eq!(conflicts.len(), 2);
    }

    #[test]
    fn test_constraint_violation_and_horizon() {
        let vertex = Constraint::Vertex {
            position: (1, 1),
            time_step: 3,
        };
        assert!(vertex.is_violated((0, 1), (1, 1), 3));
        assert!(!vertex.is_violated((0, 1), (1, 1), 4));
        assert_eq!(vertex.blocks_cell_until((1, 1)), Some(3));

        let edge = Constraint::Edge {
            from_position: (0, 1),
            to_position: (1, 1),
            to_time_step: 2,
        };
        assert!(edge.is_violated((0, 1), (1, 1), 2));
        assert!(!edge.is_violated((1, 0), (1, 1), 2));
        assert_eq!(edge.blocks_cell_until((1, 1)), None);

        let interval = Constraint::Interval {
            position: (2, 2),
            time_step: 4,
            duration: 2,
        };
        assert!(!interval.is_violated((2, 1), (2, 2), 3));
        assert!(interval.is_violated((2, 1), (2, 2), 4));
        assert!(interval.is_violated((2, 2), (2, 2), 5));
        assert!(!interval.is_violated((2, 1), (2, 2), 6));
        assert_eq!(interval.horizon(), 5);
    }

    #[test]
    fn test_conflict_constraints_per_agent() {
        let conflict = Conflict {
            agent_1: 0,
            agent_2: 1,
            conflict_type: ConflictType::Edge {
                from: (1, 0),
                to: (2, 0),
                time_step: 2,
            },
        };
        assert_eq!(
            conflict.spatial_constraint(1),
            Constraint::Edge {
                from_position: (2, 0),
                to_position: (1, 0),
                to_time_step: 2,
            }
        );
        assert_eq!(
            conflict.interval_constraint(0, 2),
            Constraint::Interval {
                position: (2, 0),
                time_step: 2,
                duration: 2,
            }
        );
    }
}
