use crate::domain::{DomainGraph, ROOT_ID};
use crate::geometry::Point;
use crate::view_state::ViewState;

pub struct ReparentAdjustment<'a> {
    pub node_id: &'a str,
    pub old_parent_id: &'a str,
    pub new_parent_id: &'a str,
    pub view_state: &'a ViewState,
    /// World-space origin of a group; `None` (root, non-groups) reads as `(0, 0)`.
    pub get_group_world_pos: &'a dyn Fn(&str) -> Option<Point>,
}

/// Re-expresses the node's stored position in the new parent's frame so that
/// `parent_origin + stored` is the same world point before and after.
pub fn adjust_for_reparent(request: ReparentAdjustment<'_>) -> ViewState {
    let mut view = request.view_state.clone();
    let Some(geometry) = view.node.get(request.node_id).copied() else {
        return view;
    };
    let old_origin = (request.get_group_world_pos)(request.old_parent_id).unwrap_or(Point::ORIGIN);
    let new_origin = (request.get_group_world_pos)(request.new_parent_id).unwrap_or(Point::ORIGIN);
    let adjusted = geometry.translated(old_origin.x - new_origin.x, old_origin.y - new_origin.y);
    view.set_node_geometry(request.node_id, adjusted);
    view
}

/// World-space origin of `id`: its stored position plus every ancestor's.
/// The root and unknown ids sit at `(0, 0)`.
pub fn world_origin(domain: &DomainGraph, view: &ViewState, id: &str) -> Point {
    if id == ROOT_ID {
        return Point::ORIGIN;
    }
    let mut origin = Point::ORIGIN;
    for ancestor in std::iter::once(id.to_string()).chain(domain.ancestors(id)) {
        if let Some(geometry) = view.node.get(&ancestor) {
            origin = origin.offset(geometry.x, geometry.y);
        }
    }
    origin
}

/// Origin lookup used by handlers: groups resolve to their world origin,
/// everything else to `None`.
pub fn group_world_pos(domain: &DomainGraph, view: &ViewState, id: &str) -> Option<Point> {
    if id == ROOT_ID || !view.node.contains_key(id) {
        return None;
    }
    Some(world_origin(domain, view, id))
}
