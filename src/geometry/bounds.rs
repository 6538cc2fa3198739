//! Axis-aligned bounding box over particle positions.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Vector;

/// Axis-aligned box, `top_left` holding the minimum corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub top_left: Vector,
    pub bottom_right: Vector,
}

impl Bounds {
    pub fn new(top_left: Vector, bottom_right: Vector) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    /// Smallest box enclosing every finite point, or `None` if there are none.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vector>,
    {
        let mut bounds: Option<Self> = None;
        for point in points.into_iter().filter(|p| p.is_finite()) {
            bounds = Some(match bounds {
                Some(b) => Self::new(b.top_left.min(point), b.bottom_right.max(point)),
                None => Self::new(point, point),
            });
        }
        bounds
    }

    /// Width and height as a vector.
    #[inline]
    pub fn size(&self) -> Vector {
        self.bottom_right - self.top_left
    }

    /// Midpoint of the box.
    #[inline]
    pub fn center(&self) -> Vector {
        (self.top_left + self.bottom_right) * 0.5
    }

    pub fn contains(&self, point: Vector) -> bool {
        point.x >= self.top_left.x
            && point.x <= self.bottom_right.x
            && point.y >= self.top_left.y
            && point.y <= self.bottom_right.y
    }

    /// A uniformly random point inside the box.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector {
        let size = self.size();
        Vector::new(
            self.top_left.x + size.x * rng.random::<f32>(),
            self.top_left.y + size.y * rng.random::<f32>(),
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(Vector::new(-1.0, -1.0), Vector::new(1.0, 1.0))
    }
}
