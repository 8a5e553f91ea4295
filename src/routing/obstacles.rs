use std::collections::HashSet;

use rustc_hash::FxHashMap;

use crate::domain::DomainGraph;
use crate::geometry::{Geometry, Obstacle, Point};
use crate::view_state::ViewState;

/// World-space rectangles for every positioned node. Groups carry their
/// descendant ids so edges into a group can pass through its frame.
pub fn build_obstacles(domain: &DomainGraph, view: &ViewState) -> Vec<Obstacle> {
    let mut origins: FxHashMap<&str, Point> = FxHashMap::default();
    let mut obstacles = Vec::new();
    domain.visit(|node, parent| {
        let Some(parent) = parent else {
            origins.insert(node.id.as_str(), Point::ORIGIN);
            return;
        };
        let parent_origin = origins
            .get(parent.id.as_str())
            .copied()
            .unwrap_or(Point::ORIGIN);
        let Some(stored) = view.node.get(&node.id) else {
            origins.insert(node.id.as_str(), parent_origin);
            return;
        };
        let world = stored.translated(parent_origin.x, parent_origin.y);
        origins.insert(node.id.as_str(), world.origin());
        if !world.is_valid() {
            return;
        }
        if node.is_group() {
            let members: HashSet<String> =
                domain.subtree_ids(&node.id).into_iter().skip(1).collect();
            obstacles.push(Obstacle::group(node.id.clone(), world, members));
        } else {
            obstacles.push(Obstacle::node(node.id.clone(), world));
        }
    });
    obstacles
}

/// World rectangle of one node, if it has geometry.
pub fn world_rect(domain: &DomainGraph, view: &ViewState, id: &str) -> Option<Geometry> {
    let stored = view.node.get(id)?;
    let parent = domain.parent_of(id)?;
    let origin = crate::reparent::world_origin(domain, view, parent);
    Some(stored.translated(origin.x, origin.y))
}
