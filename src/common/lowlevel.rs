use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LowLevelOpenNode {
    pub(crate) position: (usize, usize),
    pub(crate) f_open_cost: usize,
    pub(crate) g_cost: usize,
    pub(crate) time_step: usize, // before reaching the constraint horizon, time_step equals g_cost
}

impl Ord for LowLevelOpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_open_cost
            .cmp(&other.f_open_cost)
            // Higher g cost (further along) has higher priority
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| self.position.cmp(&other.position))
            .then_with(|| self.time_step.cmp(&other.time_step))
    }
}

impl PartialOrd for LowLevelOpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl LowLevelOpenNode {
    pub(crate) fn to_focal_node(self, f_focal_cost: usize) -> LowLevelFocalNode {
        LowLevelFocalNode {
            position: self.position,
            f_focal_cost,
            f_open_cost: self.f_open_cost,
            g_cost: self.g_cost,
            time_step: self.time_step,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LowLevelFocalNode {
    pub(crate) position: (usize, usize),
    pub(crate) f_focal_cost: usize,
    pub(crate) f_open_cost: usize,
    pub(crate) g_cost: usize,
    pub(crate) time_step: usize,
}

impl Ord for LowLevelFocalNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_focal_cost
            .cmp(&other.f_focal_cost)
            .then_with(|| self.f_open_cost.cmp(&other.f_open_cost))
            // Higher g cost has higher priority
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| self.position.cmp(&other.position))
            .then_with(|| self.time_step.cmp(&other.time_step))
    }
}

impl PartialOrd for LowLevelFocalNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl LowLevelFocalNode {
    pub(crate) fn to_open_node(self) -> LowLevelOpenNode {
        LowLevelOpenNode {
            position: self.position,
            f_open_cost: self.f_open_cost,
            g_cost: self.g_cost,
            time_step: self.time_step,
        }
    }
}
