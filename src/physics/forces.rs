//! Force passes run by the engine once or twice per tick.
//!
//! Each pass adds into `Particle::force` through `Particle::apply_force`, so
//! the accumulator ends up holding acceleration. Fixed particles accumulate
//! like any other; the integrator discards what they collected.

use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use rand::Rng;

use super::engine::ParticleGraph;
use super::params::PhysicsConfig;
use crate::geometry::{Bounds, Vector};
use crate::spatial::BarnesHutTree;

/// Smallest extent of the Barnes-Hut root on either axis.
const MIN_ROOT_EXTENT: f32 = 1.0;

/// Run every enabled force pass.
pub(crate) fn accumulate<R: Rng + ?Sized>(
    graph: &mut ParticleGraph,
    tree: &mut BarnesHutTree<NodeIndex>,
    config: &PhysicsConfig,
    rng: &mut R,
) {
    if config.repulsion > 0.0 {
        if config.theta > 0.0 {
            barnes_hut_repulsion(graph, tree, config.theta, config.repulsion, rng);
        } else {
            brute_force_repulsion(graph, config.repulsion, rng);
        }
    }
    if config.stiffness > 0.0 {
        springs(graph, rng);
    }
    center_drift(graph);
    if config.gravity {
        center_gravity(graph, config.repulsion);
    }
}

/// Approximate repulsion through a quadtree built over the current positions.
///
/// The root is the square enclosing every particle. Bodies the tree had to
/// jitter apart keep their new positions; fixed particles are never jittered.
pub(crate) fn barnes_hut_repulsion<R: Rng + ?Sized>(
    graph: &mut ParticleGraph,
    tree: &mut BarnesHutTree<NodeIndex>,
    theta: f32,
    repulsion: f32,
    rng: &mut R,
) {
    let Some(bounds) = Bounds::from_points(graph.node_weights().map(|p| p.position)) else {
        return;
    };
    let root = square_root(&bounds);
    tree.init(root.top_left, root.bottom_right, theta);

    let indices: Vec<NodeIndex> = graph.node_indices().collect();
    for &index in &indices {
        let particle = &graph[index];
        tree.insert(index, particle.position, particle.mass, particle.fixed, rng);
    }

    for body in tree.bodies().filter(|body| body.displaced) {
        graph[body.key].position = body.position;
    }

    for index in indices {
        let position = graph[index].position;
        let force = tree.repulsion_on(index, position, repulsion, rng);
        graph[index].apply_force(force);
    }
}

/// Square box around `bounds`, at least `MIN_ROOT_EXTENT` on a side.
fn square_root(bounds: &Bounds) -> Bounds {
    let size = bounds.size();
    let half = size.x.max(size.y).max(MIN_ROOT_EXTENT) * 0.5;
    let center = bounds.center();
    Bounds::new(
        center - Vector::new(half, half),
        center + Vector::new(half, half),
    )
}

/// Exact all-pairs repulsion, each unordered pair visited once.
pub(crate) fn brute_force_repulsion<R: Rng + ?Sized>(
    graph: &mut ParticleGraph,
    repulsion: f32,
    rng: &mut R,
) {
    let indices: Vec<NodeIndex> = graph.node_indices().collect();
    for (i, &a) in indices.iter().enumerate() {
        for &b in &indices[i + 1..] {
            let (pa, ma) = (graph[a].position, graph[a].mass);
            let (pb, mb) = (graph[b].position, graph[b].mass);

            let delta = pa - pb;
            let distance = delta.magnitude().max(1.0);
            let direction = delta.direction_or_random(rng);
            let scale = repulsion / (distance * distance);

            graph[a].apply_force(direction * (scale * mb));
            graph[b].apply_force(-direction * (scale * ma));
        }
    }
}

/// Hooke's law along every spring, split evenly between the endpoints.
pub(crate) fn springs<R: Rng + ?Sized>(graph: &mut ParticleGraph, rng: &mut R) {
    let edges: Vec<_> = graph
        .edge_references()
        .map(|edge| (edge.source(), edge.target(), *edge.weight()))
        .collect();

    for (a, b, spring) in edges {
        let delta = graph[b].position - graph[a].position;
        let direction = delta.direction_or_random(rng);
        let push = direction * (spring.tension(delta.magnitude()) * 0.5);

        graph[a].apply_force(-push);
        graph[b].apply_force(push);
    }
}

/// Shift the cloud so its centroid sits on the origin.
pub(crate) fn center_drift(graph: &mut ParticleGraph) {
    let count = graph.node_count();
    if count == 0 {
        return;
    }
    let centroid = graph
        .node_weights()
        .fold(Vector::ZERO, |sum, p| sum + p.position)
        / count as f32;

    for particle in graph.node_weights_mut() {
        particle.apply_force(-centroid);
    }
}

/// Pull every particle toward the origin, proportional to its distance.
pub(crate) fn center_gravity(graph: &mut ParticleGraph, repulsion: f32) {
    let strength = repulsion / 100.0;
    for particle in graph.node_weights_mut() {
        let pull = -particle.position * strength;
        particle.apply_force(pull);
    }
}
