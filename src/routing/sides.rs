use crate::geometry::{Geometry, Obstacle, Point, segment_crosses_interior};

use super::ports::Side;

// ── Edge side selection ──────────────────────────────────────────────
/// Aspect-ratio threshold for preferring horizontal vs vertical edge sides.
const DIRECTION_PREF_RATIO: f32 = 1.35;
/// Keeps anchors off the node corners.
const ANCHOR_CORNER_INSET: f32 = 1.0;

/// Whether `obstacle` blocks a route between `from` and `to`. The endpoint
/// nodes themselves do block (routes leave them outward), groups that
/// contain an endpoint do not.
pub(crate) fn blocks_route(obstacle: &Obstacle, from: &str, to: &str) -> bool {
    match &obstacle.members {
        Some(members) => !members.contains(from) && !members.contains(to),
        None => true,
    }
}

/// Preferred sides from the centre delta alone.
pub fn primary_sides(from: &Geometry, to: &Geometry) -> (Side, Side) {
    let from_c = from.center();
    let to_c = to.center();
    let dx = to_c.x - from_c.x;
    let dy = to_c.y - from_c.y;
    let x_overlap = from.x < to.right() && to.x < from.right();
    let y_overlap = from.y < to.bottom() && to.y < from.bottom();

    let ratio = dx.abs() / dy.abs().max(1e-3);
    let horiz_pref = ratio > DIRECTION_PREF_RATIO || (y_overlap && ratio > 0.9);
    let vert_pref = ratio < (1.0 / DIRECTION_PREF_RATIO) || (x_overlap && ratio < 1.1);
    let use_horizontal = if horiz_pref && !vert_pref {
        true
    } else if vert_pref && !horiz_pref {
        false
    } else {
        dx.abs() >= dy.abs()
    };

    if use_horizontal {
        if dx >= 0.0 {
            (Side::Right, Side::Left)
        } else {
            (Side::Left, Side::Right)
        }
    } else if dy >= 0.0 {
        (Side::Bottom, Side::Top)
    } else {
        (Side::Top, Side::Bottom)
    }
}

fn side_candidates(from: &Geometry, to: &Geometry, self_loop: bool) -> Vec<(Side, Side)> {
    if self_loop {
        return vec![
            (Side::Right, Side::Bottom),
            (Side::Top, Side::Right),
            (Side::Left, Side::Top),
            (Side::Bottom, Side::Left),
        ];
    }
    let primary = primary_sides(from, to);
    let dx = to.center().x - from.center().x;
    let dy = to.center().y - from.center().y;
    let horizontal = if dx >= 0.0 {
        (Side::Right, Side::Left)
    } else {
        (Side::Left, Side::Right)
    };
    let vertical = if dy >= 0.0 {
        (Side::Bottom, Side::Top)
    } else {
        (Side::Top, Side::Bottom)
    };
    let mut out = vec![primary];
    for option in [
        horizontal,
        vertical,
        (Side::Top, Side::Top),
        (Side::Bottom, Side::Bottom),
        (Side::Left, Side::Left),
        (Side::Right, Side::Right),
    ] {
        if !out.contains(&option) {
            out.push(option);
        }
    }
    out
}

/// Picks the side pair whose port stubs are clear of blocking obstacles,
/// favouring the primary pair and short stub-to-stub distance. Falls back to
/// the primary pair when every option is blocked.
pub(crate) fn choose_sides(
    from_id: &str,
    to_id: &str,
    from: &Geometry,
    to: &Geometry,
    obstacles: &[Obstacle],
    stub: f32,
) -> (Side, Side) {
    let candidates = side_candidates(from, to, from_id == to_id);
    let stub_blocked = |a: Point, b: Point| {
        obstacles
            .iter()
            .filter(|obstacle| blocks_route(obstacle, from_id, to_id))
            .any(|obstacle| segment_crosses_interior(a, b, &obstacle.rect))
    };
    let mut best: Option<((Side, Side), f32)> = None;
    for (idx, (start_side, end_side)) in candidates.iter().copied().enumerate() {
        let start = anchor_point(from, start_side, 0.0);
        let end = anchor_point(to, end_side, 0.0);
        let start_stub = stub_point(start, start_side, stub);
        let end_stub = stub_point(end, end_side, stub);
        if stub_blocked(start, start_stub) || stub_blocked(end, end_stub) {
            continue;
        }
        let manhattan = (end_stub.x - start_stub.x).abs() + (end_stub.y - start_stub.y).abs();
        let score = manhattan + if idx == 0 { 0.0 } else { stub };
        if best.is_none_or(|(_, best_score)| score < best_score) {
            best = Some(((start_side, end_side), score));
        }
    }
    best.map(|(sides, _)| sides).unwrap_or(candidates[0])
}

/// Boundary point on `side`, shifted along the side by `offset` and clamped
/// so it stays off the corners.
pub fn anchor_point(rect: &Geometry, side: Side, offset: f32) -> Point {
    let center = rect.center();
    let half = if side.is_vertical() { rect.h } else { rect.w } / 2.0 - ANCHOR_CORNER_INSET;
    let clamped = if half > 0.0 {
        offset.clamp(-half, half)
    } else {
        0.0
    };
    match side {
        Side::Left => Point::new(rect.x, center.y + clamped),
        Side::Right => Point::new(rect.right(), center.y + clamped),
        Side::Top => Point::new(center.x + clamped, rect.y),
        Side::Bottom => Point::new(center.x + clamped, rect.bottom()),
    }
}

pub fn stub_point(point: Point, side: Side, length: f32) -> Point {
    let (dx, dy) = side.outward();
    point.offset(dx * length, dy * length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(x: f32, y: f32) -> Geometry {
        Geometry::new(x, y, 96.0, 96.0)
    }

    #[test]
    fn primary_sides_follow_dominant_axis() {
        assert_eq!(primary_sides(&node(0.0, 0.0), &node(300.0, 20.0)), (Side::Right, Side::Left));
        assert_eq!(primary_sides(&node(300.0, 0.0), &node(0.0, 0.0)), (Side::Left, Side::Right));
        assert_eq!(primary_sides(&node(0.0, 0.0), &node(10.0, 300.0)), (Side::Bottom, Side::Top));
        assert_eq!(primary_sides(&node(0.0, 300.0), &node(0.0, 0.0)), (Side::Top, Side::Bottom));
    }

    #[test]
    fn anchor_offsets_are_clamped() {
        let rect = node(0.0, 0.0);
        assert_eq!(anchor_point(&rect, Side::Right, 10.0), Point::new(96.0, 58.0));
        assert_eq!(anchor_point(&rect, Side::Top, -500.0), Point::new(1.0, 0.0));
    }

    #[test]
    fn blocked_facing_sides_switch_to_a_clear_pair() {
        let from = node(100.0, 100.0);
        let to = node(300.0, 100.0);
        let obstacles = vec![
            Obstacle::node("n1", from),
            Obstacle::node("mid", node(200.0, 100.0)),
            Obstacle::node("n2", to),
        ];
        let sides = choose_sides("n1", "n2", &from, &to, &obstacles, 18.0);
        assert_eq!(sides, (Side::Top, Side::Top));

        let open = vec![Obstacle::node("n1", from), Obstacle::node("n2", to)];
        assert_eq!(
            choose_sides("n1", "n2", &from, &to, &open, 18.0),
            (Side::Right, Side::Left)
        );
    }
}
