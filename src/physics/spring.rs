//! Spring type and its identifier.
//!
//! Springs are the simulated edges. Each spring has:
//! - A stable identifier chosen by the caller
//! - A rest length and a stiffness
//!
//! Endpoints are not stored here: the engine keeps springs as edges of its
//! particle graph, so an endpoint is a non-owning handle resolved on demand.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable spring identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpringId(pub u32);

impl SpringId {
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SpringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spring({})", self.0)
    }
}

impl From<u32> for SpringId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<SpringId> for u32 {
    #[inline]
    fn from(id: SpringId) -> Self {
        id.0
    }
}

/// A simulated edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub id: SpringId,
    pub rest_length: f32,
    pub stiffness: f32,
}

impl Spring {
    pub fn new(id: SpringId, rest_length: f32, stiffness: f32) -> Self {
        Self {
            id,
            rest_length,
            stiffness,
        }
    }

    /// Signed force magnitude for a spring stretched to `length`.
    ///
    /// Positive when compressed (pushes apart), negative when stretched.
    #[inline]
    pub fn tension(&self, length: f32) -> f32 {
        self.stiffness * (self.rest_length - length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spring_id() {
        let id = SpringId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(format!("{}", id), "Spring(42)");
    }

    #[test]
    fn test_tension_sign() {
        let spring = Spring::new(SpringId(0), 10.0, 2.0);
        assert_eq!(spring.tension(10.0), 0.0);
        assert_eq!(spring.tension(5.0), 10.0);
        assert_eq!(spring.tension(15.0), -10.0);
    }
}
