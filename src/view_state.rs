use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Geometry, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStatus {
    #[default]
    Ok,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayoutMode {
    /// Geometry is authoritative; children move independently.
    #[default]
    Free,
    /// Geometry comes from the bulk layout engine; children move as one unit.
    Lock,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeView {
    pub waypoints: Vec<Point>,
    pub routing_status: RoutingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Geometry overlay keyed by domain id. Node and group positions are stored
/// relative to the parent group's origin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub node: BTreeMap<String, Geometry>,
    #[serde(default)]
    pub group: BTreeMap<String, Geometry>,
    #[serde(default)]
    pub edge: BTreeMap<String, EdgeView>,
    #[serde(default)]
    pub layout_mode: BTreeMap<String, LayoutMode>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout_mode(&self, group_id: &str) -> LayoutMode {
        self.layout_mode.get(group_id).copied().unwrap_or_default()
    }

    /// Writes node geometry and keeps a group's mirror entry in step.
    pub fn set_node_geometry(&mut self, id: &str, geometry: Geometry) {
        self.node.insert(id.to_string(), geometry);
        if let Some(group) = self.group.get_mut(id) {
            *group = geometry;
        }
    }

    /// Mirrors the node entry into `group` once `id` has children.
    pub fn ensure_group_entry(&mut self, id: &str) {
        if let Some(geometry) = self.node.get(id).copied() {
            self.group.insert(id.to_string(), geometry);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty() && self.group.is_empty() && self.edge.is_empty()
    }
}
