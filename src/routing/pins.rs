use rustc_hash::FxHashMap;

use crate::geometry::{Geometry, Point};

use super::ports::{Side, Slot};

/// Quantisation for pin offsets: 1/100 px.
const PIN_OFFSET_SCALE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(u32);

/// Identity of a connection point. Two requests with equal keys share a pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinKey {
    pub node_id: String,
    pub offset_x: i32,
    pub offset_y: i32,
    pub edge_slot: i32,
    pub spacing: u32,
}

impl PinKey {
    fn new(node_id: &str, rect: &Geometry, position: Point, slot: Slot, spacing: f32) -> Self {
        Self {
            node_id: node_id.to_string(),
            offset_x: ((position.x - rect.x) * PIN_OFFSET_SCALE).round() as i32,
            offset_y: ((position.y - rect.y) * PIN_OFFSET_SCALE).round() as i32,
            edge_slot: slot.doubled(),
            spacing: spacing.to_bits(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pin {
    pub id: PinId,
    pub key: PinKey,
    /// `None` for a node's default centre pin.
    pub side: Option<Side>,
    pub position: Point,
}

/// Pins owned by one routing epoch. Never pruned piecemeal: the whole cache
/// goes away with its epoch.
#[derive(Debug, Clone, Default)]
pub struct PinCache {
    pins: Vec<Pin>,
    index: FxHashMap<PinKey, PinId>,
}

impl PinCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn center_pin(&mut self, node_id: &str, rect: &Geometry) -> PinId {
        self.intern(node_id, rect, None, rect.center(), Slot::default(), 0.0)
    }

    pub fn port_pin(
        &mut self,
        node_id: &str,
        rect: &Geometry,
        side: Side,
        position: Point,
        slot: Slot,
        spacing: f32,
    ) -> PinId {
        self.intern(node_id, rect, Some(side), position, slot, spacing)
    }

    fn intern(
        &mut self,
        node_id: &str,
        rect: &Geometry,
        side: Option<Side>,
        position: Point,
        slot: Slot,
        spacing: f32,
    ) -> PinId {
        let key = PinKey::new(node_id, rect, position, slot, spacing);
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = PinId(self.pins.len() as u32);
        self.pins.push(Pin {
            id,
            key: key.clone(),
            side,
            position,
        });
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: PinId) -> Option<&Pin> {
        self.pins.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn pins_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Pin> + 'a {
        self.pins.iter().filter(move |pin| pin.key.node_id == node_id)
    }
}
