//! Particle system: bodies, springs, force passes and the integrator.

mod changes;
mod engine;
mod forces;
mod params;
mod particle;
mod spring;

pub use changes::{Change, NodeMods, NodeSpec, SpringSpec, parse_batch};
pub use engine::{Energy, Frame, FrameCallback, NodePosition, PhysicsEngine};
pub use params::{Integrator, PhysicsConfig, PhysicsParams};
pub use particle::{NodeId, Particle};
pub use spring::{Spring, SpringId};
