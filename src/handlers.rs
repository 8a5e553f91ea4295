//! Edit handlers. Each one works on clones of the Domain Graph and the
//! ViewState and only replaces the live state once every check has passed:
//! mutate Domain, write or adjust ViewState, clean up, verify, commit, render.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::cleanup::clean_view_state;
use crate::config::NodeDefaults;
use crate::domain::{DomainEdge, DomainGraph, DomainNode, ROOT_ID, normalize_parent};
use crate::error::{EditError, Result};
use crate::geometry::Geometry;
use crate::reparent::{ReparentAdjustment, adjust_for_reparent, group_world_pos};
use crate::view_state::{LayoutMode, ViewState};

const INTEGRITY_TARGET: &str = "canvas_router::integrity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderReason {
    NodeAdded,
    NodeDeleted,
    NodeMoved,
    EdgeAdded,
    EdgeDeleted,
    GeometryChanged,
    LayoutModeChanged,
}

/// Hook into whatever draws the canvas.
pub trait RenderTrigger {
    fn request_render(&mut self, reason: RenderReason);

    fn select(&mut self, _id: &str) {}
}

/// Remembers what was requested. Doubles as the trigger for headless use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingTrigger {
    pub renders: Vec<RenderReason>,
    pub selected: Option<String>,
}

impl RenderTrigger for RecordingTrigger {
    fn request_render(&mut self, reason: RenderReason) {
        self.renders.push(reason);
    }

    fn select(&mut self, id: &str) {
        self.selected = Some(id.to_string());
    }
}

/// Bulk layout for LOCK groups. Given the group, returns parent-relative
/// geometry for the nodes it wants to place.
pub trait LockLayoutEngine {
    fn layout(
        &self,
        domain: &DomainGraph,
        view: &ViewState,
        group_id: &str,
    ) -> BTreeMap<String, Geometry>;
}

pub struct StateRefs<'a> {
    pub domain: &'a mut DomainGraph,
    pub view: &'a mut ViewState,
    pub render: &'a mut dyn RenderTrigger,
    pub lock_layout: Option<&'a dyn LockLayoutEngine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Applied {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: Option<f32>,
    pub y: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNode {
    pub node_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub position: Option<Position>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNode {
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNode {
    pub node_id: Option<String>,
    #[serde(default)]
    pub new_parent_id: Option<String>,
    #[serde(default)]
    pub old_parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEdge {
    pub edge_id: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEdge {
    pub edge_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGeometry {
    pub node_id: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLayoutMode {
    pub group_id: Option<String>,
    pub mode: LayoutMode,
}

fn require_id(id: Option<String>) -> Result<String> {
    match id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(EditError::MissingId),
    }
}

fn commit(refs: &mut StateRefs<'_>, domain: Option<DomainGraph>, view: ViewState) {
    if let Some(domain) = domain {
        *refs.domain = domain;
    }
    *refs.view = view;
}

fn geometry_lost(node_id: &str) -> EditError {
    error!(
        target: INTEGRITY_TARGET,
        node = node_id,
        "cleanup discarded geometry that was just written"
    );
    EditError::GeometryLost {
        node_id: node_id.to_string(),
    }
}

fn check_child_count(node_id: &str, parent_id: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    error!(
        target: INTEGRITY_TARGET,
        node = node_id,
        parent = parent_id,
        expected,
        actual,
        "domain mutation changed the wrong number of children"
    );
    Err(EditError::MutationIntegrity {
        node_id: node_id.to_string(),
        parent_id: parent_id.to_string(),
        expected,
        actual,
    })
}

pub fn add_node(refs: &mut StateRefs<'_>, intent: AddNode, defaults: &NodeDefaults) -> Result<Applied> {
    let node_id = require_id(intent.node_id)?;
    let (x, y) = match intent.position {
        Some(Position {
            x: Some(x),
            y: Some(y),
        }) => (x, y),
        _ => return Err(EditError::MissingPosition { node_id }),
    };
    let size = intent.size.unwrap_or(if intent.is_group {
        Size {
            w: defaults.group_width,
            h: defaults.group_height,
        }
    } else {
        Size {
            w: defaults.leaf_width,
            h: defaults.leaf_height,
        }
    });
    let geometry = Geometry::new(x, y, size.w, size.h);
    if !geometry.is_valid() {
        return Err(EditError::InvalidGeometry { node_id });
    }
    let parent_id = normalize_parent(intent.parent_id.as_deref()).to_string();

    let mut domain = refs.domain.clone();
    let before = domain
        .child_count(&parent_id)
        .ok_or_else(|| EditError::UnknownNode(parent_id.clone()))?;
    domain.insert_node(&parent_id, DomainNode::new(node_id.clone()).with_data(intent.data))?;
    let after = domain.child_count(&parent_id).unwrap_or(0);
    check_child_count(&node_id, &parent_id, before + 1, after)?;

    let mut view = refs.view.clone();
    view.set_node_geometry(&node_id, geometry);
    if parent_id != ROOT_ID {
        view.ensure_group_entry(&parent_id);
    }

    let cleaned = clean_view_state(&domain, &view);
    if !cleaned.node.contains_key(&node_id) {
        return Err(geometry_lost(&node_id));
    }

    commit(refs, Some(domain), cleaned);
    debug!(node = %node_id, parent = %parent_id, x, y, "node added");
    refs.render.request_render(RenderReason::NodeAdded);
    refs.render.select(&node_id);
    Ok(Applied::Changed)
}

fn collect_subtree_edges(node: &DomainNode, out: &mut Vec<DomainEdge>) {
    out.extend(node.edges.iter().cloned());
    for child in &node.children {
        collect_subtree_edges(child, out);
    }
}

pub fn delete_node(refs: &mut StateRefs<'_>, intent: DeleteNode) -> Result<Applied> {
    let node_id = require_id(intent.node_id)?;
    if node_id == ROOT_ID {
        return Err(EditError::RootImmutable);
    }
    let parent_id = refs
        .domain
        .parent_of(&node_id)
        .ok_or_else(|| EditError::UnknownNode(node_id.clone()))?
        .to_string();

    let mut domain = refs.domain.clone();
    let removed_ids: HashSet<String> = domain.subtree_ids(&node_id).into_iter().collect();
    let detached = domain.detach(&node_id)?;

    // Edges stored inside the removed subtree that connect surviving nodes
    // move up to the old parent instead of disappearing with it.
    let mut owned = Vec::new();
    collect_subtree_edges(&detached, &mut owned);
    let mut rehomed = 0usize;
    for edge in owned {
        if !removed_ids.contains(&edge.source) && !removed_ids.contains(&edge.target) {
            domain.add_edge(&parent_id, edge)?;
            rehomed += 1;
        }
    }
    let removed_edges = domain.remove_edges_touching(&removed_ids);

    let cleaned = clean_view_state(&domain, refs.view);
    if domain.root().children.iter().any(|child| child.id == node_id) {
        error!(
            target: INTEGRITY_TARGET,
            node = %node_id,
            "deleted node is still a child of the root"
        );
    }

    commit(refs, Some(domain), cleaned);
    debug!(
        node = %node_id,
        nodes = removed_ids.len(),
        edges = removed_edges.len(),
        rehomed,
        "node deleted"
    );
    refs.render.request_render(RenderReason::NodeDeleted);
    Ok(Applied::Changed)
}

pub fn move_node(refs: &mut StateRefs<'_>, intent: MoveNode) -> Result<Applied> {
    let node_id = require_id(intent.node_id)?;
    if node_id == ROOT_ID {
        return Err(EditError::RootImmutable);
    }
    let new_parent = normalize_parent(intent.new_parent_id.as_deref()).to_string();
    let claimed_old = normalize_parent(intent.old_parent_id.as_deref());
    let old_parent = refs
        .domain
        .parent_of(&node_id)
        .ok_or_else(|| EditError::UnknownNode(node_id.clone()))?
        .to_string();
    if claimed_old != old_parent {
        warn!(
            node = %node_id,
            claimed = claimed_old,
            actual = %old_parent,
            "moveNode old parent disagrees with the domain graph; using the domain"
        );
    }
    if new_parent == old_parent {
        return Ok(Applied::Unchanged);
    }

    let mut domain = refs.domain.clone();
    let before = domain
        .child_count(&new_parent)
        .ok_or_else(|| EditError::UnknownNode(new_parent.clone()))?;
    domain.relocate(&node_id, &new_parent)?;
    let after = domain.child_count(&new_parent).unwrap_or(0);
    check_child_count(&node_id, &new_parent, before + 1, after)?;

    let live_domain: &DomainGraph = &*refs.domain;
    let live_view: &ViewState = &*refs.view;
    let get_group_world_pos = |id: &str| group_world_pos(live_domain, live_view, id);
    let mut view = adjust_for_reparent(ReparentAdjustment {
        node_id: &node_id,
        old_parent_id: &old_parent,
        new_parent_id: &new_parent,
        view_state: live_view,
        get_group_world_pos: &get_group_world_pos,
    });
    if new_parent != ROOT_ID {
        view.ensure_group_entry(&new_parent);
    }

    let cleaned = clean_view_state(&domain, &view);
    if !cleaned.node.contains_key(&node_id) {
        return Err(geometry_lost(&node_id));
    }

    commit(refs, Some(domain), cleaned);
    debug!(node = %node_id, from = %old_parent, to = %new_parent, "node moved");
    refs.render.request_render(RenderReason::NodeMoved);
    Ok(Applied::Changed)
}

pub fn add_edge(refs: &mut StateRefs<'_>, intent: AddEdge) -> Result<Applied> {
    let edge_id = require_id(intent.edge_id)?;
    let source = require_id(intent.source)?;
    let target = require_id(intent.target)?;
    let owner = normalize_parent(intent.owner_id.as_deref()).to_string();

    let mut domain = refs.domain.clone();
    domain.add_edge(&owner, DomainEdge::new(edge_id.clone(), source, target))?;
    let cleaned = clean_view_state(&domain, refs.view);

    commit(refs, Some(domain), cleaned);
    debug!(edge = %edge_id, owner = %owner, "edge added");
    refs.render.request_render(RenderReason::EdgeAdded);
    Ok(Applied::Changed)
}

pub fn delete_edge(refs: &mut StateRefs<'_>, intent: DeleteEdge) -> Result<Applied> {
    let edge_id = require_id(intent.edge_id)?;
    let mut domain = refs.domain.clone();
    domain.remove_edge(&edge_id)?;
    let cleaned = clean_view_state(&domain, refs.view);

    commit(refs, Some(domain), cleaned);
    debug!(edge = %edge_id, "edge deleted");
    refs.render.request_render(RenderReason::EdgeDeleted);
    Ok(Applied::Changed)
}

/// Drag and resize. Nodes inside a LOCK group are placed by the layout
/// engine and refuse direct edits.
pub fn set_geometry(refs: &mut StateRefs<'_>, intent: SetGeometry) -> Result<Applied> {
    let node_id = require_id(intent.node_id)?;
    if node_id == ROOT_ID {
        return Err(EditError::RootImmutable);
    }
    if !refs.domain.contains(&node_id) {
        return Err(EditError::UnknownNode(node_id));
    }
    if !intent.geometry.is_valid() {
        return Err(EditError::InvalidGeometry { node_id });
    }
    if let Some(group_id) = refs
        .domain
        .ancestors(&node_id)
        .into_iter()
        .find(|id| id != ROOT_ID && refs.view.layout_mode(id) == LayoutMode::Lock)
    {
        return Err(EditError::LockedGeometry { node_id, group_id });
    }
    if refs.view.node.get(&node_id) == Some(&intent.geometry) {
        return Ok(Applied::Unchanged);
    }

    let mut view = refs.view.clone();
    view.set_node_geometry(&node_id, intent.geometry);
    let cleaned = clean_view_state(refs.domain, &view);
    if !cleaned.node.contains_key(&node_id) {
        return Err(geometry_lost(&node_id));
    }

    commit(refs, None, cleaned);
    refs.render.request_render(RenderReason::GeometryChanged);
    Ok(Applied::Changed)
}

pub fn set_layout_mode(refs: &mut StateRefs<'_>, intent: SetLayoutMode) -> Result<Applied> {
    let group_id = require_id(intent.group_id)?;
    if group_id == ROOT_ID {
        return Err(EditError::RootImmutable);
    }
    if !refs.domain.contains(&group_id) {
        return Err(EditError::UnknownNode(group_id));
    }

    let mut view = refs.view.clone();
    view.layout_mode.insert(group_id.clone(), intent.mode);
    if intent.mode == LayoutMode::Lock
        && let Some(engine) = refs.lock_layout
    {
        let placed = engine.layout(refs.domain, &view, &group_id);
        for (id, geometry) in placed {
            if !refs.domain.is_within(&id, &group_id) {
                warn!(group = %group_id, node = %id, "layout engine placed a node outside the group");
                continue;
            }
            if !geometry.is_valid() {
                warn!(group = %group_id, node = %id, "layout engine returned invalid geometry");
                continue;
            }
            view.set_node_geometry(&id, geometry);
        }
    }
    let cleaned = clean_view_state(refs.domain, &view);

    commit(refs, None, cleaned);
    debug!(group = %group_id, mode = ?intent.mode, "layout mode set");
    refs.render.request_render(RenderReason::LayoutModeChanged);
    Ok(Applied::Changed)
}
