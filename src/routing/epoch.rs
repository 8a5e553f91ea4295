use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::geometry::Obstacle;

/// Version key for cached router state. Two scenes with the same key can
/// share pins, port offsets and routes; a new key throws all of it away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingEpoch(pub u64);

impl RoutingEpoch {
    pub fn compute(config: &RouterConfig, signature: &ObstacleSignature) -> Self {
        let mut hasher = FxHasher::default();
        config.fingerprint(&mut hasher);
        signature.hash(&mut hasher);
        Self(hasher.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignatureEntry {
    id: String,
    x: i64,
    y: i64,
    w: i64,
    h: i64,
    /// Digest of the sorted member list for group obstacles, 0 otherwise.
    members: u64,
}

/// Sorted `(id, rounded x, y, w, h)` over every obstacle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObstacleSignature(Vec<SignatureEntry>);

impl ObstacleSignature {
    pub fn of(obstacles: &[Obstacle]) -> Self {
        let mut entries: Vec<SignatureEntry> = obstacles
            .iter()
            .map(|obstacle| SignatureEntry {
                id: obstacle.id.clone(),
                x: obstacle.rect.x.round() as i64,
                y: obstacle.rect.y.round() as i64,
                w: obstacle.rect.w.round() as i64,
                h: obstacle.rect.h.round() as i64,
                members: members_digest(obstacle),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn members_digest(obstacle: &Obstacle) -> u64 {
    let Some(members) = &obstacle.members else {
        return 0;
    };
    let mut sorted: Vec<&String> = members.iter().collect();
    sorted.sort();
    let mut hasher = FxHasher::default();
    sorted.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn obstacles(offset: f32) -> Vec<Obstacle> {
        vec![
            Obstacle::node("b", Geometry::new(300.0 + offset, 100.0, 96.0, 96.0)),
            Obstacle::node("a", Geometry::new(100.0, 100.0, 96.0, 96.0)),
        ]
    }

    #[test]
    fn order_and_subpixel_jitter_do_not_change_epoch() {
        let config = RouterConfig::default();
        let mut reversed = obstacles(0.0);
        reversed.reverse();
        let a = RoutingEpoch::compute(&config, &ObstacleSignature::of(&obstacles(0.0)));
        let b = RoutingEpoch::compute(&config, &ObstacleSignature::of(&reversed));
        let c = RoutingEpoch::compute(&config, &ObstacleSignature::of(&obstacles(0.2)));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn geometry_and_config_changes_do() {
        let config = RouterConfig::default();
        let base = RoutingEpoch::compute(&config, &ObstacleSignature::of(&obstacles(0.0)));
        let moved = RoutingEpoch::compute(&config, &ObstacleSignature::of(&obstacles(5.0)));
        assert_ne!(base, moved);

        let tuned = RouterConfig {
            bend_penalty: 9.0,
            ..RouterConfig::default()
        };
        let retuned = RoutingEpoch::compute(&tuned, &ObstacleSignature::of(&obstacles(0.0)));
        assert_ne!(base, retuned);
    }
}
