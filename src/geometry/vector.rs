//! 2D point/vector value type.

use std::f32::consts::TAU;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A point or direction in layout space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f32,
    pub y: f32,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// A unit vector pointing in a uniformly random direction.
    pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let angle = rng.random::<f32>() * TAU;
        Self::new(angle.cos(), angle.sin())
    }

    #[inline]
    pub fn magnitude(self) -> f32 {
        self.magnitude_sq().sqrt()
    }

    #[inline]
    pub fn magnitude_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Scale to unit length. The zero vector stays zero.
    #[inline]
    pub fn normalize(self) -> Self {
        let magnitude = self.magnitude();
        if magnitude > 0.0 {
            self / magnitude
        } else {
            Self::ZERO
        }
    }

    /// Unit direction of `self`, or a random unit vector when `self` has no length.
    pub fn direction_or_random<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        if self.magnitude_sq() > 0.0 {
            self.normalize()
        } else {
            Self::random_unit(rng)
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(f32, f32)> for Vector {
    #[inline]
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

impl From<Vector> for [f32; 2] {
    #[inline]
    fn from(v: Vector) -> Self {
        [v.x, v.y]
    }
}

impl Add for Vector {
    type Output = Vector;

    #[inline]
    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vector {
    #[inline]
    fn add_assign(&mut self, rhs: Vector) {
        *self = *self + rhs;
    }
}

impl Sub for Vector {
    type Output = Vector;

    #[inline]
    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vector {
    #[inline]
    fn sub_assign(&mut self, rhs: Vector) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vector {
    type Output = Vector;

    #[inline]
    fn mul(self, rhs: f32) -> Vector {
        Vector::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vector {
    type Output = Vector;

    #[inline]
    fn div(self, rhs: f32) -> Vector {
        Vector::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vector {
    type Output = Vector;

    #[inline]
    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_arithmetic() {
        let a = Vector::new(3.0, 4.0);
        let b = Vector::new(1.0, -2.0);

        assert_eq!(a + b, Vector::new(4.0, 2.0));
        assert_eq!(a - b, Vector::new(2.0, 6.0));
        assert_eq!(a * 2.0, Vector::new(6.0, 8.0));
        assert_eq!(a / 2.0, Vector::new(1.5, 2.0));
        assert_eq!(-a, Vector::new(-3.0, -4.0));
        assert_eq!(a.magnitude(), 5.0);
    }

    #[test]
    fn test_normalize_zero_stays_zero() {
        assert_eq!(Vector::ZERO.normalize(), Vector::ZERO);
        let unit = Vector::new(0.0, 10.0).normalize();
        assert_eq!(unit, Vector::new(0.0, 1.0));
    }

    #[test]
    fn test_random_unit_has_unit_length() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let v = Vector::random_unit(&mut rng);
            assert!((v.magnitude() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_direction_or_random_never_nan() {
        let mut rng = SmallRng::seed_from_u64(1);
        let dir = Vector::ZERO.direction_or_random(&mut rng);
        assert!(dir.is_finite());
        assert!((dir.magnitude() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_serializes_as_object() {
        let json = serde_json::to_string(&Vector::new(1.5, -2.0)).unwrap();
        assert_eq!(json, r#"{"x":1.5,"y":-2.0}"#);
    }
}
