use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Left, Side::Right, Side::Top, Side::Bottom];

    /// Unit vector pointing away from the node.
    pub fn outward(self) -> (f32, f32) {
        match self {
            Side::Left => (-1.0, 0.0),
            Side::Right => (1.0, 0.0),
            Side::Top => (0.0, -1.0),
            Side::Bottom => (0.0, 1.0),
        }
    }

    /// Left/Right sides spread their ports along y.
    pub fn is_vertical(self) -> bool {
        matches!(self, Side::Left | Side::Right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeEnd {
    Source,
    Target,
}

/// Fan-out slot, stored doubled so that even-sized groups (slots at ±0.5,
/// ±1.5, ...) stay integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Slot(i32);

impl Slot {
    /// Slot `index − (count − 1) / 2`.
    pub fn centered(index: usize, count: usize) -> Self {
        Self(2 * index as i32 - (count as i32 - 1))
    }

    pub fn value(self) -> f32 {
        self.0 as f32 / 2.0
    }

    pub fn doubled(self) -> i32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortAssignment {
    pub slot: Slot,
    /// Perpendicular offset from the side's midpoint.
    pub offset: f32,
}

type PortKey = (String, Side);
type EndKey = (String, EdgeEnd);

/// Spreads edges that share one node side symmetrically around its middle.
///
/// Registrations accumulate until [`PortArbiter::finalize`], which is the
/// batch boundary: offsets are only (re)computed there, so every edge of the
/// current change sees the same fan-out.
#[derive(Debug, Clone)]
pub struct PortArbiter {
    spacing: f32,
    members: FxHashMap<PortKey, BTreeSet<EndKey>>,
    ends: FxHashMap<EndKey, PortKey>,
    assignments: FxHashMap<EndKey, PortAssignment>,
    dirty: FxHashSet<PortKey>,
}

impl PortArbiter {
    pub fn new(spacing: f32) -> Self {
        Self {
            spacing,
            members: FxHashMap::default(),
            ends: FxHashMap::default(),
            assignments: FxHashMap::default(),
            dirty: FxHashSet::default(),
        }
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn register(&mut self, edge_id: &str, end: EdgeEnd, node_id: &str, side: Side) {
        let end_key = (edge_id.to_string(), end);
        let port_key = (node_id.to_string(), side);
        if self.ends.get(&end_key) == Some(&port_key) {
            return;
        }
        self.unregister(&end_key);
        self.members
            .entry(port_key.clone())
            .or_default()
            .insert(end_key.clone());
        self.dirty.insert(port_key.clone());
        self.ends.insert(end_key, port_key);
    }

    pub fn forget_edge(&mut self, edge_id: &str) {
        for end in [EdgeEnd::Source, EdgeEnd::Target] {
            let end_key = (edge_id.to_string(), end);
            self.unregister(&end_key);
            self.assignments.remove(&end_key);
        }
    }

    fn unregister(&mut self, end_key: &EndKey) {
        let Some(previous) = self.ends.remove(end_key) else {
            return;
        };
        if let Some(set) = self.members.get_mut(&previous) {
            set.remove(end_key);
            if set.is_empty() {
                self.members.remove(&previous);
            }
        }
        self.dirty.insert(previous);
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Closes the batch: recomputes offsets for every side whose sharing set
    /// changed and returns the ids of edges whose assignment moved.
    pub fn finalize(&mut self) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        let mut dirty: Vec<PortKey> = self.dirty.drain().collect();
        dirty.sort();
        for port_key in dirty {
            let Some(set) = self.members.get(&port_key) else {
                continue;
            };
            let count = set.len();
            for (index, end_key) in set.iter().enumerate() {
                let slot = Slot::centered(index, count);
                let assignment = PortAssignment {
                    slot,
                    offset: slot.value() * self.spacing,
                };
                if self.assignments.get(end_key) != Some(&assignment) {
                    changed.insert(end_key.0.clone());
                    self.assignments.insert(end_key.clone(), assignment);
                }
            }
        }
        changed
    }

    pub fn side_of(&self, edge_id: &str, end: EdgeEnd) -> Option<Side> {
        self.ends
            .get(&(edge_id.to_string(), end))
            .map(|(_, side)| *side)
    }

    /// `None` until the batch that registered this end has been finalized.
    pub fn assignment(&self, edge_id: &str, end: EdgeEnd) -> Option<PortAssignment> {
        let key = (edge_id.to_string(), end);
        if let Some(port) = self.ends.get(&key)
            && self.dirty.contains(port)
        {
            return None;
        }
        self.assignments.get(&key).copied()
    }

    /// Finalized offsets on one side, in slot order.
    pub fn fan_out(&self, node_id: &str, side: Side) -> Vec<(String, EdgeEnd, PortAssignment)> {
        let Some(set) = self.members.get(&(node_id.to_string(), side)) else {
            return Vec::new();
        };
        set.iter()
            .filter_map(|key| {
                self.assignments
                    .get(key)
                    .map(|assignment| (key.0.clone(), key.1, *assignment))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_side_fans_out_symmetrically() {
        let spacing = 12.0;
        for count in 1..=6usize {
            let mut arbiter = PortArbiter::new(spacing);
            for idx in 0..count {
                arbiter.register(&format!("e{idx}"), EdgeEnd::Source, "hub", Side::Right);
            }
            arbiter.finalize();
            let fan = arbiter.fan_out("hub", Side::Right);
            assert_eq!(fan.len(), count);
            let offsets: Vec<f32> = fan.iter().map(|(_, _, a)| a.offset).collect();
            let sum: f32 = offsets.iter().sum();
            assert!(sum.abs() < 1e-4, "not symmetric: {offsets:?}");
            for pair in offsets.windows(2) {
                assert!((pair[1] - pair[0] - spacing).abs() < 1e-4, "{offsets:?}");
            }
        }
    }

    #[test]
    fn offsets_are_withheld_until_batch_boundary() {
        let mut arbiter = PortArbiter::new(10.0);
        arbiter.register("a", EdgeEnd::Source, "n", Side::Top);
        assert!(arbiter.assignment("a", EdgeEnd::Source).is_none());
        arbiter.finalize();
        assert_eq!(arbiter.assignment("a", EdgeEnd::Source).unwrap().offset, 0.0);

        arbiter.register("b", EdgeEnd::Source, "n", Side::Top);
        assert!(arbiter.assignment("a", EdgeEnd::Source).is_none());
        let changed = arbiter.finalize();
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(arbiter.assignment("a", EdgeEnd::Source).unwrap().offset, -5.0);
        assert_eq!(arbiter.assignment("b", EdgeEnd::Source).unwrap().offset, 5.0);
    }

    #[test]
    fn order_follows_edge_ids_not_registration() {
        let mut first = PortArbiter::new(10.0);
        let mut second = PortArbiter::new(10.0);
        for id in ["z", "m", "a"] {
            first.register(id, EdgeEnd::Target, "n", Side::Left);
        }
        for id in ["a", "z", "m"] {
            second.register(id, EdgeEnd::Target, "n", Side::Left);
        }
        first.finalize();
        second.finalize();
        assert_eq!(first.fan_out("n", Side::Left), second.fan_out("n", Side::Left));
        assert_eq!(first.assignment("a", EdgeEnd::Target).unwrap().slot.value(), -1.0);
    }

    #[test]
    fn forgetting_an_edge_recenters_the_rest() {
        let mut arbiter = PortArbiter::new(10.0);
        arbiter.register("a", EdgeEnd::Source, "n", Side::Bottom);
        arbiter.register("b", EdgeEnd::Source, "n", Side::Bottom);
        arbiter.finalize();
        arbiter.forget_edge("a");
        let changed = arbiter.finalize();
        assert!(changed.contains("b"));
        assert_eq!(arbiter.assignment("b", EdgeEnd::Source).unwrap().offset, 0.0);
        assert!(arbiter.assignment("a", EdgeEnd::Source).is_none());
    }

    #[test]
    fn unchanged_registration_is_not_dirty() {
        let mut arbiter = PortArbiter::new(10.0);
        arbiter.register("a", EdgeEnd::Source, "n", Side::Bottom);
        arbiter.finalize();
        arbiter.register("a", EdgeEnd::Source, "n", Side::Bottom);
        assert!(!arbiter.has_pending());
        assert!(arbiter.finalize().is_empty());
    }
}
