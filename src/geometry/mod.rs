//! Planar geometry shared by the simulation, the spatial indexes and the
//! frames handed to renderers.
//!
//! Both types are plain `Copy` values. Nothing in the crate mutates a vector
//! through a shared reference; particles are updated by assigning new values.

mod bounds;
mod vector;

pub use bounds::Bounds;
pub use vector::Vector;
