use crate::geometry::{Geometry, Obstacle, Point, segment_crosses_interior, test_edge_collision};
use crate::view_state::RoutingStatus;

use super::grid::{CostModel, EdgeOccupancy};
use super::ports::Side;
use super::sides::stub_point;

const POINT_EPSILON: f32 = 1e-3;

/// Drops consecutive points that coincide.
pub fn collapse_duplicates(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().is_none_or(|last| !last.approx_eq(p, POINT_EPSILON)) {
            out.push(p);
        }
    }
    out
}

/// Collapses duplicates, then removes interior points that sit on a straight
/// run. Endpoints are always kept.
pub fn simplify_path(points: &[Point]) -> Vec<Point> {
    let deduped = collapse_duplicates(points);
    if deduped.len() <= 2 {
        return deduped;
    }
    let mut out: Vec<Point> = Vec::with_capacity(deduped.len());
    out.push(deduped[0]);
    for idx in 1..deduped.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = deduped[idx];
        let next = deduped[idx + 1];
        let vertical_run =
            (curr.x - prev.x).abs() <= POINT_EPSILON && (next.x - curr.x).abs() <= POINT_EPSILON;
        let horizontal_run =
            (curr.y - prev.y).abs() <= POINT_EPSILON && (next.y - curr.y).abs() <= POINT_EPSILON;
        if vertical_run || horizontal_run {
            continue;
        }
        out.push(curr);
    }
    out.push(deduped[deduped.len() - 1]);
    collapse_duplicates(&out)
}

pub fn path_length(points: &[Point]) -> f32 {
    points
        .windows(2)
        .map(|pair| (pair[1].x - pair[0].x).abs() + (pair[1].y - pair[0].y).abs())
        .sum()
}

pub fn path_bend_count(points: &[Point]) -> usize {
    points.len().saturating_sub(2)
}

/// Length, bends and occupancy of a finished polyline, on the same scale as
/// the grid search.
pub fn route_cost(points: &[Point], occupancy: &EdgeOccupancy, costs: &CostModel) -> u32 {
    costs
        .travel(path_length(points))
        .saturating_add((path_bend_count(points) as u32).saturating_mul(costs.bend))
        .saturating_add(occupancy.score_path(points, costs))
}

/// Two-, three- and four-bend shapes that leave `start` along `start_side`
/// and enter `end` against `end_side`. Shapes that would double back are
/// dropped.
pub fn simple_candidates(
    start: Point,
    start_side: Side,
    end: Point,
    end_side: Side,
    stub: f32,
) -> Vec<Vec<Point>> {
    let s1 = stub_point(start, start_side, stub);
    let e1 = stub_point(end, end_side, stub);
    let mut shapes: Vec<Vec<Point>> = vec![vec![start, end]];

    let mid_x = (s1.x + e1.x) / 2.0;
    let mid_y = (s1.y + e1.y) / 2.0;
    // L through either corner.
    shapes.push(vec![start, Point::new(end.x, start.y), end]);
    shapes.push(vec![start, Point::new(start.x, end.y), end]);
    // Z through the midline.
    shapes.push(vec![
        start,
        Point::new(mid_x, start.y),
        Point::new(mid_x, end.y),
        end,
    ]);
    shapes.push(vec![
        start,
        Point::new(start.x, mid_y),
        Point::new(end.x, mid_y),
        end,
    ]);
    // U beyond both stubs.
    let u_y = match (start_side, end_side) {
        (Side::Top, _) | (_, Side::Top) => s1.y.min(e1.y),
        _ => s1.y.max(e1.y),
    };
    let u_x = match (start_side, end_side) {
        (Side::Left, _) | (_, Side::Left) => s1.x.min(e1.x),
        _ => s1.x.max(e1.x),
    };
    shapes.push(vec![start, Point::new(start.x, u_y), Point::new(end.x, u_y), end]);
    shapes.push(vec![start, Point::new(u_x, start.y), Point::new(u_x, end.y), end]);
    // Stub-to-stub elbows.
    shapes.push(vec![start, s1, Point::new(s1.x, e1.y), e1, end]);
    shapes.push(vec![start, s1, Point::new(e1.x, s1.y), e1, end]);

    let mut out: Vec<Vec<Point>> = Vec::new();
    for shape in shapes {
        let shape = simplify_path(&shape);
        if respects_sides(&shape, start_side, end_side) && !out.contains(&shape) {
            out.push(shape);
        }
    }
    out
}

fn respects_sides(points: &[Point], start_side: Side, end_side: Side) -> bool {
    if points.len() < 2 {
        return false;
    }
    let orthogonal = points.windows(2).all(|pair| {
        (pair[0].x - pair[1].x).abs() <= POINT_EPSILON
            || (pair[0].y - pair[1].y).abs() <= POINT_EPSILON
    });
    if !orthogonal {
        return false;
    }
    let (sx, sy) = start_side.outward();
    let first = (points[1].x - points[0].x, points[1].y - points[0].y);
    let (ex, ey) = end_side.outward();
    let n = points.len();
    let last = (points[n - 2].x - points[n - 1].x, points[n - 2].y - points[n - 1].y);
    first.0 * sx + first.1 * sy > 0.0 && last.0 * ex + last.1 * ey > 0.0
}

/// Whether `points` keeps out of every blocking rectangle.
pub fn path_is_clear(points: &[Point], blockers: &[Geometry]) -> bool {
    points.windows(2).all(|pair| {
        blockers
            .iter()
            .all(|rect| !segment_crosses_interior(pair[0], pair[1], rect))
    })
}

/// Final check on a route. Fewer than two distinct points degrade to a
/// straight line; any segment entering a foreign obstacle is an error.
pub fn validate_route(
    points: Vec<Point>,
    start: Point,
    end: Point,
    obstacles: &[Obstacle],
    from: &str,
    to: &str,
) -> (Vec<Point>, RoutingStatus, Option<String>) {
    if points.iter().any(|p| !p.is_finite()) {
        return (
            vec![start, end],
            RoutingStatus::Error,
            Some("route has non-finite coordinates".to_string()),
        );
    }
    let points = collapse_duplicates(&points);
    if points.len() < 2 {
        return (
            vec![start, end],
            RoutingStatus::Degraded,
            Some("route collapsed to a single point".to_string()),
        );
    }
    let foreign: Vec<Obstacle> = obstacles
        .iter()
        .filter(|obstacle| !obstacle.ignored_by(from, to))
        .cloned()
        .collect();
    let bends = &points[1..points.len() - 1];
    let report = test_edge_collision(points[0], points[points.len() - 1], bends, &foreign);
    if report.collides {
        let mut hit: Vec<&str> = report
            .details
            .iter()
            .map(|detail| detail.obstacle_id.as_str())
            .collect();
        hit.dedup();
        return (
            points,
            RoutingStatus::Error,
            Some(format!("route crosses {}", hit.join(", "))),
        );
    }
    (points, RoutingStatus::Ok, None)
}
