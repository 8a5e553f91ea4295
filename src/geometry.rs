use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Slack applied to rectangle borders when testing for interior crossings, so a
/// route running exactly along an obstacle border does not count as a hit.
const EDGE_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn approx_eq(self, other: Point, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned box. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Geometry {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// `w, h > 0` and every component finite.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
            && self.w > 0.0
            && self.h > 0.0
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn with_origin(&self, origin: Point) -> Self {
        Self::new(origin.x, origin.y, self.w, self.h)
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    pub fn inflate(&self, pad: f32) -> Self {
        Self::new(self.x - pad, self.y - pad, self.w + pad * 2.0, self.h + pad * 2.0)
    }

    /// Inclusive containment.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// Smallest box holding both points. May have zero width or height.
    pub fn spanning(a: Point, b: Point) -> Self {
        let (x, y) = (a.x.min(b.x), a.y.min(b.y));
        Self::new(x, y, a.x.max(b.x) - x, a.y.max(b.y) - y)
    }

    pub fn union(&self, other: &Geometry) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    /// Touching edges count as overlap.
    pub fn overlaps(&self, other: &Geometry) -> bool {
        self.x <= other.right() && other.x <= self.right() && self.y <= other.bottom() && other.y <= self.bottom()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: String,
    pub rect: Geometry,
    /// Descendant node ids when the obstacle is a group. Edges attached to a
    /// member may pass through the group.
    pub members: Option<HashSet<String>>,
}

impl Obstacle {
    pub fn node(id: impl Into<String>, rect: Geometry) -> Self {
        Self {
            id: id.into(),
            rect,
            members: None,
        }
    }

    pub fn group(id: impl Into<String>, rect: Geometry, members: HashSet<String>) -> Self {
        Self {
            id: id.into(),
            rect,
            members: Some(members),
        }
    }

    /// Whether an edge between `from` and `to` is allowed to touch this obstacle.
    pub fn ignored_by(&self, from: &str, to: &str) -> bool {
        if self.id == from || self.id == to {
            return true;
        }
        self.members
            .as_ref()
            .is_some_and(|members| members.contains(from) || members.contains(to))
    }
}

/// True when the segment `a`-`b` enters the open interior of `rect`.
///
/// Liang-Barsky clip against the rectangle shrunk by [`EDGE_TOLERANCE`]; a
/// hit needs a clipped span of positive length, or a degenerate segment that
/// sits inside.
pub fn segment_crosses_interior(a: Point, b: Point, rect: &Geometry) -> bool {
    let min_x = rect.x + EDGE_TOLERANCE;
    let max_x = rect.right() - EDGE_TOLERANCE;
    let min_y = rect.y + EDGE_TOLERANCE;
    let max_y = rect.bottom() - EDGE_TOLERANCE;
    if min_x >= max_x || min_y >= max_y {
        return false;
    }
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    let clips = [
        (-dx, a.x - min_x),
        (dx, max_x - a.x),
        (-dy, a.y - min_y),
        (dy, max_y - a.y),
    ];
    for (p, q) in clips {
        if p.abs() <= f32::EPSILON {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }
    t1 > t0 || (dx.abs() <= f32::EPSILON && dy.abs() <= f32::EPSILON)
}

/// Inclusive variant: touching the border counts.
pub fn segment_intersects_rect(a: Point, b: Point, rect: &Geometry) -> bool {
    let min_x = a.x.min(b.x);
    let max_x = a.x.max(b.x);
    let min_y = a.y.min(b.y);
    let max_y = a.y.max(b.y);
    if max_x < rect.x || min_x > rect.right() || max_y < rect.y || min_y > rect.bottom() {
        return false;
    }
    if rect.contains(a) || rect.contains(b) {
        return true;
    }
    segment_crosses_interior(a, b, &rect.inflate(EDGE_TOLERANCE * 2.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionDetail {
    pub segment_index: usize,
    pub obstacle_id: String,
    pub from: Point,
    pub to: Point,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollisionReport {
    pub collides: bool,
    pub details: Vec<CollisionDetail>,
}

/// Walks `start -> bend_points... -> end` and reports every segment that
/// enters an obstacle interior. Callers filter out the edge's own endpoints.
pub fn test_edge_collision(
    start: Point,
    end: Point,
    bend_points: &[Point],
    obstacles: &[Obstacle],
) -> CollisionReport {
    let mut points = Vec::with_capacity(bend_points.len() + 2);
    points.push(start);
    points.extend_from_slice(bend_points);
    points.push(end);

    let mut details = Vec::new();
    for (segment_index, pair) in points.windows(2).enumerate() {
        let (from, to) = (pair[0], pair[1]);
        for obstacle in obstacles {
            if segment_crosses_interior(from, to, &obstacle.rect) {
                details.push(CollisionDetail {
                    segment_index,
                    obstacle_id: obstacle.id.clone(),
                    from,
                    to,
                });
            }
        }
    }
    CollisionReport {
        collides: !details.is_empty(),
        details,
    }
}
