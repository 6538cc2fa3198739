//! Nearest-particle lookup backed by the rstar crate.
//!
//! Renderers use this for hit testing (which node is under the cursor when a
//! drag starts). It is rebuilt in bulk from a position snapshot rather than
//! updated incrementally, since every particle moves every tick.

use rstar::{AABB, PointDistance, RTree, RTreeObject};
use serde::Serialize;

use crate::geometry::Vector;
use crate::physics::NodeId;

/// A particle position stored in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ParticlePoint {
    id: NodeId,
    position: [f32; 2],
}

impl RTreeObject for ParticlePoint {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for ParticlePoint {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Result of a nearest-particle query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Nearest {
    pub id: NodeId,
    pub distance: f32,
}

/// R*-tree over particle positions.
pub struct SpatialIndex {
    tree: RTree<ParticlePoint>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Replace the contents with a fresh bulk-loaded tree.
    pub fn rebuild<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = (NodeId, Vector)>,
    {
        let points: Vec<_> = points
            .into_iter()
            .filter(|(_, p)| p.is_finite())
            .map(|(id, p)| ParticlePoint {
                id,
                position: p.into(),
            })
            .collect();
        self.tree = RTree::bulk_load(points);
    }

    /// The particle closest to `point`.
    pub fn nearest(&self, point: Vector) -> Option<Nearest> {
        let query: [f32; 2] = point.into();
        self.tree.nearest_neighbor(&query).map(|found| Nearest {
            id: found.id,
            distance: found.distance_2(&query).sqrt(),
        })
    }

    /// The closest particle, if it lies within `max_distance`.
    pub fn nearest_within(&self, point: Vector, max_distance: f32) -> Option<Nearest> {
        self.nearest(point)
            .filter(|found| found.distance <= max_distance)
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
