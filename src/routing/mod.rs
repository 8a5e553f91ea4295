//! Incremental orthogonal connector routing.
//!
//! All cached state (pins, port offsets, routes) lives in a [`RouterContext`]
//! keyed by a [`RoutingEpoch`]. The [`RouterManager`] owns at most one
//! context and throws the whole thing away when the epoch changes.

mod context;
mod epoch;
mod grid;
mod obstacles;
mod path;
mod pins;
mod ports;
mod sides;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::RouterConfig;
use crate::geometry::Obstacle;
use crate::view_state::{EdgeView, ViewState};

pub use context::{BatchStats, EdgeRequest, RoutedEdge, RouterContext};
pub use epoch::{ObstacleSignature, RoutingEpoch};
pub use grid::{CostModel, EdgeOccupancy, RoutingGrid, SearchQuery, SolveError, search_window};
pub use obstacles::{build_obstacles, world_rect};
pub use path::{collapse_duplicates, path_length, simplify_path, validate_route};
pub use pins::{Pin, PinCache, PinId, PinKey};
pub use ports::{EdgeEnd, PortArbiter, PortAssignment, Side, Slot};
pub use sides::{anchor_point, primary_sides, stub_point};

/// Routes computed in one batch, tagged with the epoch they belong to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteBatch {
    pub epoch: RoutingEpoch,
    pub routes: Vec<RoutedEdge>,
}

impl RouteBatch {
    pub fn get(&self, edge_id: &str) -> Option<&RoutedEdge> {
        self.routes.iter().find(|route| route.edge_id == edge_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug)]
pub struct RouterManager {
    config: RouterConfig,
    context: Option<RouterContext>,
    rebuilds: usize,
}

impl RouterManager {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            context: None,
            rebuilds: 0,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// A new configuration means a new epoch; the current obstacles are kept.
    pub fn set_config(&mut self, config: RouterConfig) {
        if config == self.config {
            return;
        }
        self.config = config;
        let obstacles = self
            .context
            .take()
            .map(|ctx| ctx.obstacles().to_vec())
            .unwrap_or_default();
        self.rebuild(obstacles);
    }

    /// Brings the context in line with `obstacles`. Rebuilds (dropping every
    /// pin, port and cached route) only when the epoch key changes.
    pub fn sync(&mut self, obstacles: Vec<Obstacle>) -> RoutingEpoch {
        let epoch = RoutingEpoch::compute(&self.config, &ObstacleSignature::of(&obstacles));
        if let Some(ctx) = &self.context
            && ctx.epoch() == epoch
        {
            return epoch;
        }
        self.rebuild(obstacles)
    }

    fn rebuild(&mut self, obstacles: Vec<Obstacle>) -> RoutingEpoch {
        let ctx = self.build_context(obstacles);
        let epoch = ctx.epoch();
        self.context = Some(ctx);
        epoch
    }

    fn build_context(&mut self, obstacles: Vec<Obstacle>) -> RouterContext {
        let epoch = RoutingEpoch::compute(&self.config, &ObstacleSignature::of(&obstacles));
        let previous = self.context.as_ref().map(|ctx| ctx.epoch().0);
        let ctx = RouterContext::build(epoch, obstacles, &self.config);
        debug!(
            epoch = epoch.0,
            ?previous,
            obstacles = ctx.obstacles().len(),
            "routing epoch rebuilt"
        );
        self.rebuilds += 1;
        ctx
    }

    pub fn current_epoch(&self) -> Option<RoutingEpoch> {
        self.context.as_ref().map(RouterContext::epoch)
    }

    pub fn is_current(&self, epoch: RoutingEpoch) -> bool {
        self.current_epoch() == Some(epoch)
    }

    pub fn context(&self) -> Option<&RouterContext> {
        self.context.as_ref()
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    fn context_mut(&mut self) -> &mut RouterContext {
        let ctx = match self.context.take() {
            Some(ctx) => ctx,
            None => self.build_context(Vec::new()),
        };
        self.context.insert(ctx)
    }

    /// Starts collecting edges for one port-arbitration batch.
    pub fn begin_batch(&mut self) -> RouteBatchBuilder<'_> {
        RouteBatchBuilder {
            manager: self,
            requests: BTreeMap::new(),
        }
    }

    /// Routes exactly `requests`; edges known to the context but absent here
    /// are forgotten first, so their ports free up in the same batch.
    pub fn route_all(&mut self, requests: impl IntoIterator<Item = EdgeRequest>) -> RouteBatch {
        let requests: BTreeMap<String, EdgeRequest> = requests
            .into_iter()
            .map(|request| (request.edge_id.clone(), request))
            .collect();
        let ctx = self.context_mut();
        let gone: Vec<String> = ctx
            .known_edges()
            .filter(|id| !requests.contains_key(*id))
            .map(str::to_string)
            .collect();
        for id in gone {
            ctx.forget_edge(&id);
        }
        let mut batch = self.begin_batch();
        batch.requests = requests;
        batch.finish()
    }

    pub fn forget_edge(&mut self, edge_id: &str) {
        if let Some(ctx) = self.context.as_mut() {
            ctx.forget_edge(edge_id);
        }
    }

    /// Writes a batch into `view`. A batch from a superseded epoch is
    /// dropped and `false` returned.
    pub fn apply_routes(&self, batch: &RouteBatch, view: &mut ViewState) -> bool {
        if !self.is_current(batch.epoch) {
            debug!(
                batch_epoch = batch.epoch.0,
                current = ?self.current_epoch().map(|e| e.0),
                "discarding stale route batch"
            );
            return false;
        }
        for route in &batch.routes {
            view.edge.insert(
                route.edge_id.clone(),
                EdgeView {
                    waypoints: route.points.clone(),
                    routing_status: route.status,
                    message: route.message.clone(),
                },
            );
        }
        true
    }
}

impl Default for RouterManager {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

/// Collects edge requests; [`RouteBatchBuilder::finish`] is the batch
/// boundary at which port offsets are finalised and routes computed.
pub struct RouteBatchBuilder<'a> {
    manager: &'a mut RouterManager,
    requests: BTreeMap<String, EdgeRequest>,
}

impl RouteBatchBuilder<'_> {
    pub fn push(&mut self, request: EdgeRequest) -> &mut Self {
        self.requests.insert(request.edge_id.clone(), request);
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn finish(self) -> RouteBatch {
        let config = self.manager.config.clone();
        let ctx = self.manager.context_mut();
        let routes = ctx.route_batch(self.requests, &config);
        RouteBatch {
            epoch: ctx.epoch(),
            routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Geometry, Point, test_edge_collision};
    use crate::view_state::RoutingStatus;

    fn node(id: &str, x: f32, y: f32) -> Obstacle {
        Obstacle::node(id, Geometry::new(x, y, 96.0, 96.0))
    }

    fn assert_clear(route: &RoutedEdge, obstacles: &[Obstacle]) {
        let foreign: Vec<Obstacle> = obstacles
            .iter()
            .filter(|o| !o.ignored_by(&route.source, &route.target))
            .cloned()
            .collect();
        let n = route.points.len();
        let report = test_edge_collision(
            route.points[0],
            route.points[n - 1],
            &route.points[1..n - 1],
            &foreign,
        );
        assert!(!report.collides, "{:?} hits {:?}", route.points, report.details);
    }

    #[test]
    fn routes_around_the_node_in_between() {
        let obstacles = vec![
            node("n1", 100.0, 100.0),
            node("x", 200.0, 100.0),
            node("n2", 300.0, 100.0),
        ];
        let mut manager = RouterManager::default();
        manager.sync(obstacles.clone());
        let batch = manager.route_all([EdgeRequest::new("e1", "n1", "n2")]);
        let route = batch.get("e1").unwrap();
        assert_eq!(route.status, RoutingStatus::Ok, "{:?}", route.message);
        assert!(route.points.len() >= 3, "{:?}", route.points);
        assert_clear(route, &obstacles);
    }

    #[test]
    fn avoids_a_cluster_of_obstacles() {
        let obstacles = vec![
            node("a", 0.0, 200.0),
            node("b", 700.0, 200.0),
            node("m1", 200.0, 150.0),
            node("m2", 350.0, 250.0),
            node("m3", 500.0, 120.0),
        ];
        let mut manager = RouterManager::default();
        manager.sync(obstacles.clone());
        let batch = manager.route_all([EdgeRequest::new("e", "a", "b")]);
        let route = batch.get("e").unwrap();
        assert_eq!(route.status, RoutingStatus::Ok, "{:?}", route.message);
        assert_clear(route, &obstacles);
        for pair in route.points.windows(2) {
            assert!(pair[0].x == pair[1].x || pair[0].y == pair[1].y, "{:?}", route.points);
        }
    }

    #[test]
    fn epoch_changes_only_with_geometry_or_config() {
        let mut manager = RouterManager::default();
        let a = manager.sync(vec![node("a", 0.0, 0.0), node("b", 300.0, 0.0)]);
        let again = manager.sync(vec![node("b", 300.0, 0.0), node("a", 0.0, 0.0)]);
        assert_eq!(a, again);
        assert_eq!(manager.rebuild_count(), 1);

        manager.route_all([EdgeRequest::new("e", "a", "b")]);
        assert!(manager.context().unwrap().pins().len() > 2);

        let moved = manager.sync(vec![node("a", 0.0, 40.0), node("b", 300.0, 0.0)]);
        assert_ne!(a, moved);
        assert_eq!(manager.context().unwrap().pins().len(), 2);
        assert_eq!(manager.context().unwrap().route_count(), 0);

        manager.set_config(RouterConfig {
            port_spacing: 20.0,
            ..RouterConfig::default()
        });
        assert_ne!(manager.current_epoch(), Some(moved));
        assert_eq!(manager.rebuild_count(), 3);
    }

    #[test]
    fn stale_batches_are_not_applied() {
        let mut manager = RouterManager::default();
        manager.sync(vec![node("a", 0.0, 0.0), node("b", 300.0, 0.0)]);
        let stale = manager.route_all([EdgeRequest::new("e", "a", "b")]);
        manager.sync(vec![node("a", 0.0, 0.0), node("b", 300.0, 200.0)]);

        let mut view = ViewState::new();
        assert!(!manager.apply_routes(&stale, &mut view));
        assert!(view.edge.is_empty());

        let fresh = manager.route_all([EdgeRequest::new("e", "a", "b")]);
        assert!(manager.apply_routes(&fresh, &mut view));
        assert_eq!(view.edge["e"].waypoints, fresh.get("e").unwrap().points);
    }

    #[test]
    fn new_edge_on_a_shared_side_reroutes_its_neighbour() {
        let mut manager = RouterManager::default();
        manager.sync(vec![
            node("hub", 0.0, 0.0),
            node("p", 400.0, -100.0),
            node("q", 400.0, 100.0),
        ]);
        let first = manager.route_all([EdgeRequest::new("e1", "hub", "p")]);
        assert_eq!(first.len(), 1);

        let mut batch = manager.begin_batch();
        batch.push(EdgeRequest::new("e2", "hub", "q"));
        let second = batch.finish();
        let ids: Vec<&str> = second.routes.iter().map(|r| r.edge_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        let ctx = manager.context().unwrap();
        let fan = ctx.arbiter().fan_out("hub", Side::Right);
        let offsets: Vec<f32> = fan.iter().map(|(_, _, a)| a.offset).collect();
        assert_eq!(offsets, vec![-6.0, 6.0]);
        assert_eq!(second.get("e1").unwrap().points[0], Point::new(96.0, 42.0));
    }

    #[test]
    fn repeated_drags_reuse_pins_per_position() {
        let mut manager = RouterManager::default();
        for _ in 0..3 {
            for dx in [0.0, 50.0] {
                manager.sync(vec![node("a", dx, 0.0), node("b", 400.0, 0.0)]);
                manager.route_all([EdgeRequest::new("e", "a", "b")]);
                let pins = manager.context().unwrap().pins().len();
                assert_eq!(pins, 4, "pins leak across frames");
            }
        }
    }
}
