use std::collections::HashSet;

use crate::domain::DomainGraph;
use crate::view_state::ViewState;

#[derive(Debug, Default)]
struct LiveIds {
    nodes: HashSet<String>,
    groups: HashSet<String>,
    edges: HashSet<String>,
}

fn collect_live_ids(domain: &DomainGraph) -> LiveIds {
    let mut live = LiveIds::default();
    let mut candidate_edges = Vec::new();
    domain.visit(|node, parent| {
        if parent.is_some() {
            live.nodes.insert(node.id.clone());
            if node.is_group() {
                live.groups.insert(node.id.clone());
            }
        }
        candidate_edges.extend(node.edges.iter());
    });
    // Endpoints are checked after the walk: an edge may reference a node that
    // sits later in preorder.
    for edge in candidate_edges {
        if live.nodes.contains(&edge.source) && live.nodes.contains(&edge.target) {
            live.edges.insert(edge.id.clone());
        }
    }
    live
}

/// Returns a copy of `view` holding only entries backed by a live domain
/// entity. Never mutates its inputs; applying it twice changes nothing.
pub fn clean_view_state(domain: &DomainGraph, view: &ViewState) -> ViewState {
    let live = collect_live_ids(domain);
    ViewState {
        node: view
            .node
            .iter()
            .filter(|(id, _)| live.nodes.contains(*id))
            .map(|(id, geometry)| (id.clone(), *geometry))
            .collect(),
        group: view
            .group
            .iter()
            .filter(|(id, _)| live.groups.contains(*id))
            .map(|(id, geometry)| (id.clone(), *geometry))
            .collect(),
        edge: view
            .edge
            .iter()
            .filter(|(id, _)| live.edges.contains(*id))
            .map(|(id, edge)| (id.clone(), edge.clone()))
            .collect(),
        layout_mode: view
            .layout_mode
            .iter()
            .filter(|(id, _)| live.nodes.contains(*id))
            .map(|(id, mode)| (id.clone(), *mode))
            .collect(),
    }
}
