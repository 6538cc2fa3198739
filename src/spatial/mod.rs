//! Spatial structures over particle positions.
//!
//! - `barnes_hut`: arena quadtree rebuilt every tick to approximate repulsion
//!   in O(n log n)
//! - `rtree`: R*-tree for nearest-particle hit testing

mod barnes_hut;
mod rtree;

pub use barnes_hut::{BarnesHutTree, Body};
pub use rtree::{Nearest, SpatialIndex};
