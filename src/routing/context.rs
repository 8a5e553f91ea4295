use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::geometry::{Geometry, Obstacle, Point};
use crate::view_state::RoutingStatus;

use super::epoch::RoutingEpoch;
use super::grid::{CostModel, EdgeOccupancy, RoutingGrid, SearchQuery, SolveError, search_window};
use super::path::{path_is_clear, route_cost, simple_candidates, simplify_path, validate_route};
use super::pins::{PinCache, PinId};
use super::ports::{EdgeEnd, PortArbiter, Side};
use super::sides::{anchor_point, blocks_route, choose_sides, stub_point};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRequest {
    pub edge_id: String,
    pub source: String,
    pub target: String,
}

impl EdgeRequest {
    pub fn new(edge_id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            edge_id: edge_id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedEdge {
    pub edge_id: String,
    pub source: String,
    pub target: String,
    pub points: Vec<Point>,
    pub status: RoutingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedRoute {
    source_pin: PinId,
    target_pin: PinId,
    route: RoutedEdge,
}

/// Anchor points and sides of one edge after port arbitration.
#[derive(Debug, Clone, Copy)]
struct Ports {
    start: Point,
    start_side: Side,
    end: Point,
    end_side: Side,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub routed: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Router state for one [`RoutingEpoch`]. Everything in here (pins, port
/// registry, cached routes) lives and dies with the epoch.
#[derive(Debug)]
pub struct RouterContext {
    epoch: RoutingEpoch,
    obstacles: Vec<Obstacle>,
    index: FxHashMap<String, usize>,
    /// Obstacle rects grown by the router padding, indexed like `obstacles`.
    padded: Vec<Geometry>,
    pins: PinCache,
    arbiter: PortArbiter,
    routes: BTreeMap<String, CachedRoute>,
    known: BTreeMap<String, EdgeRequest>,
    last_stats: BatchStats,
}

impl RouterContext {
    pub(crate) fn build(epoch: RoutingEpoch, obstacles: Vec<Obstacle>, config: &RouterConfig) -> Self {
        let pad = config.effective_padding();
        let padded = obstacles.iter().map(|o| o.rect.inflate(pad)).collect();

        let mut pins = PinCache::new();
        let mut index = FxHashMap::default();
        for (idx, obstacle) in obstacles.iter().enumerate() {
            pins.center_pin(&obstacle.id, &obstacle.rect);
            index.insert(obstacle.id.clone(), idx);
        }

        Self {
            epoch,
            obstacles,
            index,
            padded,
            pins,
            arbiter: PortArbiter::new(config.port_spacing),
            routes: BTreeMap::new(),
            known: BTreeMap::new(),
            last_stats: BatchStats::default(),
        }
    }

    pub fn epoch(&self) -> RoutingEpoch {
        self.epoch
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn obstacle(&self, id: &str) -> Option<&Obstacle> {
        self.index.get(id).map(|&idx| &self.obstacles[idx])
    }

    pub fn pins(&self) -> &PinCache {
        &self.pins
    }

    pub fn arbiter(&self) -> &PortArbiter {
        &self.arbiter
    }

    pub fn cached_route(&self, edge_id: &str) -> Option<&RoutedEdge> {
        self.routes.get(edge_id).map(|cached| &cached.route)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn last_stats(&self) -> BatchStats {
        self.last_stats
    }

    pub(crate) fn forget_edge(&mut self, edge_id: &str) {
        self.arbiter.forget_edge(edge_id);
        self.routes.remove(edge_id);
        self.known.remove(edge_id);
    }

    pub(crate) fn known_edges(&self) -> impl Iterator<Item = &str> {
        self.known.keys().map(String::as_str)
    }

    /// Registers every request, closes the port batch and routes whatever the
    /// batch touched: the requests themselves plus any known edge whose port
    /// offset moved.
    pub(crate) fn route_batch(
        &mut self,
        requests: BTreeMap<String, EdgeRequest>,
        config: &RouterConfig,
    ) -> Vec<RoutedEdge> {
        let stub = config.effective_stub_length();
        for request in requests.values() {
            if let Some(previous) = self.known.get(&request.edge_id)
                && previous != request
            {
                self.forget_edge(&request.edge_id);
            }
            self.known.insert(request.edge_id.clone(), request.clone());
            self.register_sides(request, stub);
        }

        let changed = self.arbiter.finalize();
        let targets: BTreeSet<String> = requests
            .keys()
            .cloned()
            .chain(changed.into_iter().filter(|id| self.known.contains_key(id)))
            .collect();

        let costs = CostModel::from_config(config);
        let mut occupancy = EdgeOccupancy::new(costs.cell);
        let mut stats = BatchStats::default();
        let mut out = Vec::with_capacity(targets.len());
        let known: Vec<EdgeRequest> = self.known.values().cloned().collect();
        for request in known {
            if !targets.contains(&request.edge_id) {
                if let Some(cached) = self.routes.get(&request.edge_id) {
                    occupancy.add_path(&cached.route.points);
                }
                continue;
            }
            let (route, cached) = self.route_edge(&request, &occupancy, &costs, config);
            if cached {
                stats.cached += 1;
            } else {
                stats.routed += 1;
            }
            if route.status == RoutingStatus::Error {
                stats.failed += 1;
            }
            occupancy.add_path(&route.points);
            out.push(route);
        }
        debug!(
            epoch = self.epoch.0,
            routed = stats.routed,
            cached = stats.cached,
            failed = stats.failed,
            pins = self.pins.len(),
            "route batch finished"
        );
        self.last_stats = stats;
        out
    }

    fn register_sides(&mut self, request: &EdgeRequest, stub: f32) {
        let (Some(from), Some(to)) = (self.obstacle(&request.source), self.obstacle(&request.target))
        else {
            return;
        };
        let (start_side, end_side) = choose_sides(
            &request.source,
            &request.target,
            &from.rect,
            &to.rect,
            &self.obstacles,
            stub,
        );
        self.arbiter
            .register(&request.edge_id, EdgeEnd::Source, &request.source, start_side);
        self.arbiter
            .register(&request.edge_id, EdgeEnd::Target, &request.target, end_side);
    }

    fn port(
        &mut self,
        request: &EdgeRequest,
        end: EdgeEnd,
        node_id: &str,
        rect: Geometry,
    ) -> (Side, Point, PinId) {
        let side = self.arbiter.side_of(&request.edge_id, end).unwrap_or(Side::Right);
        let assignment = self.arbiter.assignment(&request.edge_id, end);
        let offset = assignment.map_or(0.0, |a| a.offset);
        let slot = assignment.map(|a| a.slot).unwrap_or_default();
        let position = anchor_point(&rect, side, offset);
        let pin = self
            .pins
            .port_pin(node_id, &rect, side, position, slot, self.arbiter.spacing());
        (side, position, pin)
    }

    /// Returns the route and whether it came from the cache.
    fn route_edge(
        &mut self,
        request: &EdgeRequest,
        occupancy: &EdgeOccupancy,
        costs: &CostModel,
        config: &RouterConfig,
    ) -> (RoutedEdge, bool) {
        let (Some(from), Some(to)) = (
            self.obstacle(&request.source).map(|o| o.rect),
            self.obstacle(&request.target).map(|o| o.rect),
        ) else {
            return (
                RoutedEdge {
                    edge_id: request.edge_id.clone(),
                    source: request.source.clone(),
                    target: request.target.clone(),
                    points: Vec::new(),
                    status: RoutingStatus::Error,
                    message: Some("edge endpoint has no geometry".to_string()),
                },
                false,
            );
        };

        let (start_side, start, source_pin) =
            self.port(request, EdgeEnd::Source, &request.source, from);
        let (end_side, end, target_pin) =
            self.port(request, EdgeEnd::Target, &request.target, to);
        if let Some(cached) = self.routes.get(&request.edge_id)
            && cached.source_pin == source_pin
            && cached.target_pin == target_pin
        {
            return (cached.route.clone(), true);
        }

        let ports = Ports {
            start,
            start_side,
            end,
            end_side,
        };
        let solved = self.solve(request, &ports, occupancy, costs, config);
        let (points, status, message) = match solved {
            Ok(points) => validate_route(
                points,
                start,
                end,
                &self.obstacles,
                &request.source,
                &request.target,
            ),
            Err(err) => {
                warn!(edge = %request.edge_id, %err, "routing failed, drawing a straight line");
                (vec![start, end], RoutingStatus::Error, Some(err.to_string()))
            }
        };
        let route = RoutedEdge {
            edge_id: request.edge_id.clone(),
            source: request.source.clone(),
            target: request.target.clone(),
            points,
            status,
            message,
        };
        self.routes.insert(
            request.edge_id.clone(),
            CachedRoute {
                source_pin,
                target_pin,
                route: route.clone(),
            },
        );
        (route, false)
    }

    fn solve(
        &self,
        request: &EdgeRequest,
        ports: &Ports,
        occupancy: &EdgeOccupancy,
        costs: &CostModel,
        config: &RouterConfig,
    ) -> Result<Vec<Point>, SolveError> {
        let Ports {
            start,
            start_side,
            end,
            end_side,
        } = *ports;
        if !start.is_finite() || !end.is_finite() {
            return Err(SolveError::NonFinite);
        }
        let from = request.source.as_str();
        let to = request.target.as_str();
        let stub = config.effective_stub_length();
        let pad = config.effective_padding();

        let blockers: Vec<Geometry> = self
            .obstacles
            .iter()
            .filter(|o| blocks_route(o, from, to))
            .map(|o| {
                if o.id == from || o.id == to {
                    o.rect
                } else {
                    o.rect.inflate(pad - 1.0)
                }
            })
            .collect();
        let best_simple = simple_candidates(start, start_side, end, end_side, stub)
            .into_iter()
            .filter(|candidate| path_is_clear(candidate, &blockers))
            .map(|candidate| {
                let cost = route_cost(&candidate, occupancy, costs);
                (candidate, cost)
            })
            .min_by_key(|(_, cost)| *cost);
        if let Some((points, _)) = &best_simple
            && occupancy.score_path(points, costs) == 0
        {
            return Ok(points.clone());
        }

        let blocks = |idx: usize| blocks_route(&self.obstacles[idx], from, to);
        let query = SearchQuery {
            start: stub_point(start, start_side, stub),
            start_side,
            end: stub_point(end, end_side, stub),
            end_side,
            blocks: &blocks,
        };
        let margin = stub + pad + costs.cell * 4.0;
        let window = search_window(&self.padded, query.start, query.end, margin);
        let searched = match self.grid_search(&query, window, occupancy, costs, config) {
            Err(SolveError::NoPath) => {
                let wider = search_window(
                    &self.padded,
                    query.start,
                    query.end,
                    margin + window.w.max(window.h),
                );
                debug!(edge = %request.edge_id, "no path inside the search window, widening");
                self.grid_search(&query, wider, occupancy, costs, config)
            }
            other => other,
        }
        .map(|inner| {
            let mut points = vec![start];
            points.extend(inner);
            points.push(end);
            simplify_path(&points)
        });

        match (searched, best_simple) {
            (Ok(grid_points), Some((simple, simple_cost))) => {
                if route_cost(&grid_points, occupancy, costs) < simple_cost {
                    Ok(grid_points)
                } else {
                    Ok(simple)
                }
            }
            (Ok(grid_points), None) => Ok(grid_points),
            (Err(_), Some((simple, _))) => Ok(simple),
            (Err(err), None) => Err(err),
        }
    }

    fn grid_search(
        &self,
        query: &SearchQuery<'_>,
        window: Geometry,
        occupancy: &EdgeOccupancy,
        costs: &CostModel,
        config: &RouterConfig,
    ) -> Result<Vec<Point>, SolveError> {
        let grid = RoutingGrid::new(&self.padded, window, costs.cell, config.grid_cell_limit())?;
        grid.search(query, occupancy, costs, config.max_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::epoch::ObstacleSignature;

    fn node(id: &str, x: f32, y: f32) -> Obstacle {
        Obstacle::node(id, Geometry::new(x, y, 96.0, 96.0))
    }

    fn context(obstacles: Vec<Obstacle>, config: &RouterConfig) -> RouterContext {
        let epoch = RoutingEpoch::compute(config, &ObstacleSignature::of(&obstacles));
        RouterContext::build(epoch, obstacles, config)
    }

    fn batch(requests: &[EdgeRequest]) -> BTreeMap<String, EdgeRequest> {
        requests
            .iter()
            .map(|r| (r.edge_id.clone(), r.clone()))
            .collect()
    }

    #[test]
    fn every_obstacle_starts_with_a_center_pin() {
        let config = RouterConfig::default();
        let ctx = context(vec![node("a", 0.0, 0.0), node("b", 300.0, 0.0)], &config);
        assert_eq!(ctx.pins().len(), 2);
        assert_eq!(ctx.pins().pins_for("a").next().unwrap().side, None);
    }

    #[test]
    fn unchanged_requests_hit_the_route_cache() {
        let config = RouterConfig::default();
        let mut ctx = context(vec![node("a", 0.0, 0.0), node("b", 300.0, 0.0)], &config);
        let requests = [EdgeRequest::new("e1", "a", "b")];
        let first = ctx.route_batch(batch(&requests), &config);
        let pins_after_first = ctx.pins().len();
        let second = ctx.route_batch(batch(&requests), &config);
        assert_eq!(first, second);
        assert_eq!(ctx.last_stats().cached, 1);
        assert_eq!(ctx.pins().len(), pins_after_first);
    }

    #[test]
    fn solver_failure_is_isolated_to_its_edge() {
        let config = RouterConfig {
            max_steps: 1,
            ..RouterConfig::default()
        };
        // The wall is tall enough that no simple shape clears it, and one
        // search step is never enough.
        let mut ctx = context(
            vec![
                node("a", 0.0, 0.0),
                Obstacle::node("wall", Geometry::new(200.0, -400.0, 96.0, 1200.0)),
                node("b", 400.0, 0.0),
                node("c", -300.0, 900.0),
                node("d", 0.0, 900.0),
            ],
            &config,
        );
        let routes = ctx.route_batch(
            batch(&[EdgeRequest::new("blocked", "a", "b"), EdgeRequest::new("open", "c", "d")]),
            &config,
        );
        let blocked = routes.iter().find(|r| r.edge_id == "blocked").unwrap();
        assert_eq!(blocked.status, RoutingStatus::Error);
        assert!(blocked.message.is_some());
        assert_eq!(blocked.points.len(), 2);
        let open = routes.iter().find(|r| r.edge_id == "open").unwrap();
        assert_eq!(open.status, RoutingStatus::Ok);
    }

    #[test]
    fn distant_node_does_not_disable_the_search() {
        let config = RouterConfig::default();
        let wall = Obstacle::node("wall", Geometry::new(200.0, -300.0, 96.0, 700.0));
        let mut ctx = context(
            vec![node("a", 0.0, 0.0), wall.clone(), node("b", 400.0, 0.0), node("far", 6000.0, 6000.0)],
            &config,
        );
        let routes = ctx.route_batch(batch(&[EdgeRequest::new("e", "a", "b")]), &config);
        let route = &routes[0];
        assert_eq!(route.status, RoutingStatus::Ok, "{:?}", route.message);
        assert!(route.points.len() >= 3);
        let n = route.points.len();
        let report = crate::geometry::test_edge_collision(
            route.points[0],
            route.points[n - 1],
            &route.points[1..n - 1],
            &[wall],
        );
        assert!(!report.collides, "{:?}", route.points);
    }

    #[test]
    fn missing_endpoint_reports_error_without_points() {
        let config = RouterConfig::default();
        let mut ctx = context(vec![node("a", 0.0, 0.0)], &config);
        let routes = ctx.route_batch(batch(&[EdgeRequest::new("e", "a", "ghost")]), &config);
        assert_eq!(routes[0].status, RoutingStatus::Error);
        assert!(routes[0].points.is_empty());
    }
}
