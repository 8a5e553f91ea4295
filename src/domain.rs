use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EditError, Result};

pub const ROOT_ID: &str = "root";

/// Maps an absent or empty parent reference onto the root.
pub fn normalize_parent(parent: Option<&str>) -> &str {
    match parent {
        Some(id) if !id.is_empty() => id,
        _ => ROOT_ID,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl DomainEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainNode {
    pub id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub children: Vec<DomainNode>,
    #[serde(default)]
    pub edges: Vec<DomainEdge>,
}

impl DomainNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Value::Null,
            children: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    fn find(&self, id: &str) -> Option<&DomainNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut DomainNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    fn parent_of(&self, id: &str) -> Option<&DomainNode> {
        if self.children.iter().any(|child| child.id == id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.parent_of(id))
    }

    fn detach(&mut self, id: &str) -> Option<DomainNode> {
        if let Some(pos) = self.children.iter().position(|child| child.id == id) {
            return Some(self.children.remove(pos));
        }
        self.children.iter_mut().find_map(|child| child.detach(id))
    }

    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    fn retain_edges(&mut self, keep: &mut impl FnMut(&DomainEdge) -> bool, removed: &mut Vec<DomainEdge>) {
        let mut idx = 0;
        while idx < self.edges.len() {
            if keep(&self.edges[idx]) {
                idx += 1;
            } else {
                removed.push(self.edges.remove(idx));
            }
        }
        for child in &mut self.children {
            child.retain_edges(keep, removed);
        }
    }

    fn visit<'a>(&'a self, parent: Option<&'a DomainNode>, f: &mut impl FnMut(&'a DomainNode, Option<&'a DomainNode>)) {
        f(self, parent);
        for child in &self.children {
            child.visit(Some(self), f);
        }
    }
}

/// Coordinate-free structure: a node tree under a reserved root, with edges
/// attached at whatever tree level owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainGraph {
    root: DomainNode,
}

impl Default for DomainGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainGraph {
    pub fn new() -> Self {
        Self {
            root: DomainNode::new(ROOT_ID),
        }
    }

    /// Wraps an existing tree. Fails if the root id is not [`ROOT_ID`], if
    /// ids repeat, or if an edge references a missing node.
    pub fn from_root(root: DomainNode) -> Result<Self> {
        if root.id != ROOT_ID {
            return Err(EditError::UnknownNode(ROOT_ID.to_string()));
        }
        let graph = Self { root };
        let mut seen = HashSet::new();
        for id in graph.all_ids() {
            if !seen.insert(id.clone()) {
                return Err(EditError::DuplicateId(id));
            }
        }
        for edge in graph.edges() {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) || endpoint == ROOT_ID {
                    return Err(EditError::UnknownNode(endpoint.clone()));
                }
            }
        }
        Ok(graph)
    }

    pub fn root(&self) -> &DomainNode {
        &self.root
    }

    pub fn find(&self, id: &str) -> Option<&DomainNode> {
        self.root.find(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.root.parent_of(id).map(|parent| parent.id.as_str())
    }

    pub fn child_count(&self, id: &str) -> Option<usize> {
        self.find(id).map(|node| node.children.len())
    }

    pub fn is_group(&self, id: &str) -> bool {
        id != ROOT_ID && self.find(id).is_some_and(DomainNode::is_group)
    }

    /// Parent chain from the direct parent up to (and including) the root.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            out.push(parent.to_string());
            current = parent;
        }
        out
    }

    /// `id` and every node below it, preorder.
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.find(id) {
            node.collect_ids(&mut out);
        }
        out
    }

    pub fn is_within(&self, id: &str, ancestor: &str) -> bool {
        id == ancestor || self.ancestors(id).iter().any(|candidate| candidate == ancestor)
    }

    fn all_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_ids(&mut out);
        out
    }

    /// Every non-root node id, preorder.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids = self.all_ids();
        ids.remove(0);
        ids
    }

    /// Visits every node with its parent (`None` for the root), preorder.
    pub fn visit<'a>(&'a self, mut f: impl FnMut(&'a DomainNode, Option<&'a DomainNode>)) {
        self.root.visit(None, &mut f);
    }

    /// Edges gathered from every tree level.
    pub fn edges(&self) -> Vec<&DomainEdge> {
        let mut out = Vec::new();
        self.visit(|node, _| out.extend(node.edges.iter()));
        out
    }

    pub fn find_edge(&self, id: &str) -> Option<&DomainEdge> {
        self.edges().into_iter().find(|edge| edge.id == id)
    }

    pub fn insert_node(&mut self, parent_id: &str, node: DomainNode) -> Result<()> {
        let mut incoming = Vec::new();
        node.collect_ids(&mut incoming);
        for id in &incoming {
            if id == ROOT_ID || self.contains(id) {
                return Err(EditError::DuplicateId(id.clone()));
            }
        }
        let parent = self
            .root
            .find_mut(parent_id)
            .ok_or_else(|| EditError::UnknownNode(parent_id.to_string()))?;
        parent.children.push(node);
        Ok(())
    }

    /// Removes `id` and its subtree from the tree. Edges are left in place;
    /// see [`DomainGraph::remove_edges_touching`].
    pub fn detach(&mut self, id: &str) -> Result<DomainNode> {
        if id == ROOT_ID {
            return Err(EditError::RootImmutable);
        }
        self.root
            .detach(id)
            .ok_or_else(|| EditError::UnknownNode(id.to_string()))
    }

    /// Moves `id` (with its subtree) under `new_parent_id`.
    pub fn relocate(&mut self, id: &str, new_parent_id: &str) -> Result<()> {
        if id == ROOT_ID {
            return Err(EditError::RootImmutable);
        }
        if !self.contains(new_parent_id) {
            return Err(EditError::UnknownNode(new_parent_id.to_string()));
        }
        if self.is_within(new_parent_id, id) {
            return Err(EditError::InvalidReparent {
                node_id: id.to_string(),
                new_parent_id: new_parent_id.to_string(),
            });
        }
        let node = self.detach(id)?;
        let parent = self
            .root
            .find_mut(new_parent_id)
            .ok_or_else(|| EditError::UnknownNode(new_parent_id.to_string()))?;
        parent.children.push(node);
        Ok(())
    }

    /// Drops every edge, at any level, with an endpoint in `ids`.
    pub fn remove_edges_touching(&mut self, ids: &HashSet<String>) -> Vec<DomainEdge> {
        let mut removed = Vec::new();
        let mut keep =
            |edge: &DomainEdge| !ids.contains(&edge.source) && !ids.contains(&edge.target);
        self.root.retain_edges(&mut keep, &mut removed);
        removed
    }

    pub fn add_edge(&mut self, owner_id: &str, edge: DomainEdge) -> Result<()> {
        if edge.id.is_empty() {
            return Err(EditError::MissingId);
        }
        if self.find_edge(&edge.id).is_some() {
            return Err(EditError::DuplicateId(edge.id));
        }
        for endpoint in [&edge.source, &edge.target] {
            if endpoint == ROOT_ID || !self.contains(endpoint) {
                return Err(EditError::UnknownNode(endpoint.clone()));
            }
        }
        let owner = self
            .root
            .find_mut(owner_id)
            .ok_or_else(|| EditError::UnknownNode(owner_id.to_string()))?;
        owner.edges.push(edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<DomainEdge> {
        let mut removed = Vec::new();
        let mut keep = |edge: &DomainEdge| edge.id != id;
        self.root.retain_edges(&mut keep, &mut removed);
        removed
            .pop()
            .ok_or_else(|| EditError::UnknownEdge(id.to_string()))
    }
}
