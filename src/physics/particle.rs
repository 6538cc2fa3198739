//! Particle type and its identifier.
//!
//! A particle is the simulated body behind a graph node. Each particle has:
//! - A stable identifier chosen by the caller
//! - Position, velocity and an accumulated force (stored as acceleration)
//! - A true mass plus an optional temporary override (e.g. while dragged)
//! - A fixed flag that pins it in place
//! - A count of attached springs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Vector;

/// Per-tick decay rate of an override mass toward the true mass.
const OVERRIDE_DECAY: f32 = 0.02;

/// Stable node identifier.
///
/// Chosen by the caller in change records and echoed back in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u32 {
    #[inline]
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// A simulated node.
#[derive(Debug, Clone)]
pub struct Particle {
    pub id: NodeId,
    pub position: Vector,
    pub velocity: Vector,
    /// Accumulated force divided by effective mass.
    pub force: Vector,
    /// Snapshot of `force` at time t, used by the Verlet integrator.
    pub cached_force: Vector,
    pub mass: f32,
    pub override_mass: Option<f32>,
    pub fixed: bool,
    pub connections: u32,
}

impl Particle {
    pub fn new(id: NodeId, position: Vector, mass: f32) -> Self {
        Self {
            id,
            position,
            velocity: Vector::ZERO,
            force: Vector::ZERO,
            cached_force: Vector::ZERO,
            mass: sanitize_mass(mass),
            override_mass: None,
            fixed: false,
            connections: 0,
        }
    }

    /// Mass used when converting force into acceleration.
    #[inline]
    pub fn effective_mass(&self) -> f32 {
        self.override_mass.unwrap_or(self.mass)
    }

    #[inline]
    pub fn apply_force(&mut self, force: Vector) {
        self.force += force / self.effective_mass();
    }

    /// Pull a temporary mass override back toward the true mass, clearing it
    /// once the two are within one unit.
    pub fn decay_override(&mut self) {
        if let Some(current) = self.override_mass {
            if (current - self.mass).abs() < 1.0 {
                self.override_mass = None;
            } else {
                self.override_mass = Some(current + (self.mass - current) * OVERRIDE_DECAY);
            }
        }
    }

    /// Zero velocity and all force accumulators.
    pub fn settle(&mut self) {
        self.velocity = Vector::ZERO;
        self.force = Vector::ZERO;
        self.cached_force = Vector::ZERO;
    }
}

/// Masses must be positive and finite; anything else falls back to 1.
pub(crate) fn sanitize_mass(mass: f32) -> f32 {
    if mass.is_finite() && mass > 0.0 { mass } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(format!("{}", id), "Node(42)");

        let raw: u32 = NodeId::from(7).into();
        assert_eq!(raw, 7);
    }

    #[test]
    fn test_apply_force_divides_by_effective_mass() {
        let mut particle = Particle::new(NodeId(0), Vector::ZERO, 2.0);
        particle.apply_force(Vector::new(4.0, 0.0));
        assert_eq!(particle.force, Vector::new(2.0, 0.0));

        particle.override_mass = Some(8.0);
        particle.apply_force(Vector::new(0.0, 8.0));
        assert_eq!(particle.force, Vector::new(2.0, 1.0));
    }

    #[test]
    fn test_override_decays_then_clears() {
        let mut particle = Particle::new(NodeId(0), Vector::ZERO, 1.0);
        particle.override_mass = Some(50.0);

        particle.decay_override();
        let after_one = particle.override_mass.unwrap();
        assert!(after_one < 50.0 && after_one > 1.0);

        let mut ticks = 1;
        while particle.override_mass.is_some() {
            particle.decay_override();
            ticks += 1;
            assert!(ticks < 1000, "override never cleared");
        }
        assert_eq!(particle.effective_mass(), 1.0);
    }

    #[test]
    fn test_override_below_true_mass_rises() {
        let mut particle = Particle::new(NodeId(0), Vector::ZERO, 10.0);
        particle.override_mass = Some(2.0);
        particle.decay_override();
        assert!(particle.override_mass.unwrap() > 2.0);
    }

    #[test]
    fn test_invalid_mass_defaults() {
        assert_eq!(Particle::new(NodeId(0), Vector::ZERO, 0.0).mass, 1.0);
        assert_eq!(Particle::new(NodeId(0), Vector::ZERO, -3.0).mass, 1.0);
        assert_eq!(Particle::new(NodeId(0), Vector::ZERO, f32::NAN).mass, 1.0);
        assert_eq!(Particle::new(NodeId(0), Vector::ZERO, 2.5).mass, 2.5);
    }
}
