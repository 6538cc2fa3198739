//! PhysicsEngine - the particle system itself.
//!
//! Particles are the nodes and springs the edges of a petgraph `StableGraph`,
//! so a spring's endpoints are graph handles resolved on demand and dropping a
//! particle can never leave a spring pointing at freed memory. Caller-chosen
//! ids map onto graph indices through two lookup tables.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

use super::changes::{Change, NodeMods, NodeSpec, SpringSpec};
use super::forces;
use super::params::{Integrator, PhysicsConfig, PhysicsParams};
use super::particle::{NodeId, Particle, sanitize_mass};
use super::spring::{Spring, SpringId};
use crate::geometry::{Bounds, Vector};
use crate::spatial::{BarnesHutTree, Nearest, SpatialIndex};

pub(crate) type ParticleGraph = StableGraph<Particle, Spring, Directed>;

/// Maximum particle speed per tick.
const SPEED_LIMIT: f32 = 1000.0;

const DEFAULT_SEED: u64 = 0x5EED_CAFE;

/// Aggregate of squared particle speeds over the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Energy {
    pub sum: f32,
    pub max: f32,
    pub mean: f32,
    pub n: u32,
}

impl Energy {
    fn from_speeds<I: IntoIterator<Item = f32>>(speeds_sq: I) -> Self {
        let mut energy = Self::default();
        for e in speeds_sq {
            energy.sum += e;
            energy.max = energy.max.max(e);
            energy.n += 1;
        }
        if energy.n > 0 {
            energy.mean = energy.sum / energy.n as f32;
        }
        energy
    }

    /// Convergence signal: the average of mean and max.
    pub fn level(&self) -> f32 {
        (self.mean + self.max) * 0.5
    }
}

/// A particle's position in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
}

/// Everything a renderer receives after a tick.
///
/// `geometry` serializes as a flat `[id, x, y, id, x, y, ...]` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    #[serde(serialize_with = "flat_triples")]
    pub geometry: Vec<NodePosition>,
    pub epoch: u64,
    pub energy: Energy,
    pub bounds: Bounds,
}

fn flat_triples<S: Serializer>(geometry: &[NodePosition], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(geometry.len() * 3))?;
    for node in geometry {
        seq.serialize_element(&node.id)?;
        seq.serialize_element(&node.x)?;
        seq.serialize_element(&node.y)?;
    }
    seq.end()
}

/// Callback invoked with every published frame.
pub type FrameCallback = Box<dyn FnMut(&Frame)>;

/// The particle system.
///
/// This struct manages:
/// - Particle and spring registries keyed by caller ids
/// - The set of free (unconnected) particles
/// - One integration step per `tick`
/// - Energy and bounds derived from the latest step
/// - A lazily rebuilt spatial index for hit testing
pub struct PhysicsEngine {
    /// Particles as nodes, springs as edges.
    graph: ParticleGraph,

    node_index: HashMap<NodeId, NodeIndex>,

    spring_index: HashMap<SpringId, EdgeIndex>,

    /// Particles that have never had a spring attached.
    free: HashSet<NodeId>,

    /// Reused across ticks for Barnes-Hut repulsion.
    tree: BarnesHutTree<NodeIndex>,

    rng: SmallRng,

    config: PhysicsConfig,

    epoch: u64,

    energy: Energy,

    bounds: Bounds,

    on_update: Option<FrameCallback>,

    /// Spatial index for hit testing
    spatial: SpatialIndex,

    /// Whether positions moved since the spatial index was built
    spatial_dirty: bool,
}

impl PhysicsEngine {
    /// Create an empty engine with a fixed default seed.
    pub fn new(config: PhysicsConfig) -> Self {
        Self::with_seed(config, DEFAULT_SEED)
    }

    /// Create an empty engine whose random choices derive from `seed`.
    pub fn with_seed(config: PhysicsConfig, seed: u64) -> Self {
        Self {
            graph: StableGraph::default(),
            node_index: HashMap::new(),
            spring_index: HashMap::new(),
            free: HashSet::new(),
            tree: BarnesHutTree::new(),
            rng: SmallRng::seed_from_u64(seed),
            config,
            epoch: 0,
            energy: Energy::default(),
            bounds: Bounds::default(),
            on_update: None,
            spatial: SpatialIndex::new(),
            spatial_dirty: false,
        }
    }

    // =========================================================================
    // Change Batches
    // =========================================================================

    /// Apply a batch of changes in order and return the new epoch.
    ///
    /// The epoch advances by exactly one per call, whatever the batch holds.
    pub fn apply_changes(&mut self, changes: &[Change]) -> u64 {
        self.epoch += 1;
        for change in changes {
            match change {
                Change::AddNode(spec) => self.add_node(spec),
                Change::DropNode { id } => {
                    self.drop_node(*id);
                }
                Change::ModifyNode { id, mods } => {
                    self.modify_node(*id, mods);
                }
                Change::AddSpring(spec) => {
                    self.add_spring(spec);
                }
                Change::DropSpring { id } => {
                    self.drop_spring(*id);
                }
                Change::Unknown => debug!("skipping change of unknown type"),
            }
        }
        debug!(
            "applied {} changes, epoch {}: {} nodes, {} springs",
            changes.len(),
            self.epoch,
            self.graph.node_count(),
            self.graph.edge_count()
        );
        self.epoch
    }

    /// Replace every parameter present in `params`.
    ///
    /// A stiffness change applies to all existing springs as well as new ones.
    pub fn modify_physics(&mut self, params: &PhysicsParams) {
        self.config = self.config.clone().with_params(params);
        if let Some(stiffness) = params.stiffness {
            for spring in self.graph.edge_weights_mut() {
                spring.stiffness = stiffness;
            }
        }
        debug!("physics parameters now {:?}", self.config);
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Add a particle, or reset an existing one with the same id in place.
    ///
    /// Missing coordinates are drawn uniformly from the current bounds.
    pub fn add_node(&mut self, spec: &NodeSpec) {
        let x = spec.x.filter(|x| x.is_finite());
        let y = spec.y.filter(|y| y.is_finite());
        let position = match (x, y) {
            (Some(x), Some(y)) => Vector::new(x, y),
            _ => {
                let random = self.bounds.random_point(&mut self.rng);
                Vector::new(x.unwrap_or(random.x), y.unwrap_or(random.y))
            }
        };

        if let Some(&index) = self.node_index.get(&spec.id) {
            let particle = &mut self.graph[index];
            particle.position = position;
            particle.mass = sanitize_mass(spec.mass);
            particle.override_mass = None;
            particle.fixed = spec.fixed;
            particle.settle();
        } else {
            let mut particle = Particle::new(spec.id, position, spec.mass);
            particle.fixed = spec.fixed;
            let index = self.graph.add_node(particle);
            self.node_index.insert(spec.id, index);
            self.free.insert(spec.id);
        }
        self.spatial_dirty = true;
    }

    /// Remove a particle and every spring attached to it.
    pub fn drop_node(&mut self, id: NodeId) -> bool {
        let Some(&index) = self.node_index.get(&id) else {
            return false;
        };

        let attached: Vec<SpringId> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .chain(self.graph.edges_directed(index, Direction::Incoming))
            .map(|edge| edge.weight().id)
            .collect();
        for spring in attached {
            self.drop_spring(spring);
        }

        self.node_index.remove(&id);
        self.free.remove(&id);
        self.graph.remove_node(index);
        self.spatial_dirty = true;
        true
    }

    /// Patch the fields present in `mods`. Unknown ids are ignored.
    pub fn modify_node(&mut self, id: NodeId, mods: &NodeMods) -> bool {
        let Some(&index) = self.node_index.get(&id) else {
            return false;
        };
        let particle = &mut self.graph[index];

        if let Some(x) = mods.x.filter(|x| x.is_finite()) {
            particle.position.x = x;
        }
        if let Some(y) = mods.y.filter(|y| y.is_finite()) {
            particle.position.y = y;
        }
        if let Some(mass) = mods.mass {
            particle.mass = sanitize_mass(mass);
        }
        if let Some(fixed) = mods.fixed {
            particle.fixed = fixed;
        }
        if let Some(mass) = mods.override_mass {
            particle.override_mass = Some(sanitize_mass(mass));
        }

        self.spatial_dirty = true;
        true
    }

    /// Get the number of particles.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Look up a particle by id.
    pub fn particle(&self, id: NodeId) -> Option<&Particle> {
        self.node_index.get(&id).map(|&index| &self.graph[index])
    }

    /// All particles, in no particular order.
    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.graph.node_weights()
    }

    /// Whether `id` is a particle no spring has been attached to yet.
    pub fn is_free(&self, id: NodeId) -> bool {
        self.free.contains(&id)
    }

    /// Get the number of free particles.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    // =========================================================================
    // Spring Operations
    // =========================================================================

    /// Connect two particles. Ignored unless both endpoints exist.
    ///
    /// An existing spring with the same id is replaced.
    pub fn add_spring(&mut self, spec: &SpringSpec) -> bool {
        let (Some(&from), Some(&to)) = (self.node_index.get(&spec.from), self.node_index.get(&spec.to))
        else {
            debug!("spring {} references a missing particle", spec.id);
            return false;
        };

        self.drop_spring(spec.id);

        let spring = Spring::new(spec.id, spec.length, self.config.stiffness);
        let edge = self.graph.add_edge(from, to, spring);
        self.spring_index.insert(spec.id, edge);

        self.graph[from].connections += 1;
        self.graph[to].connections += 1;
        self.free.remove(&spec.from);
        self.free.remove(&spec.to);
        true
    }

    /// Remove a spring. Returns false if no spring has that id.
    pub fn drop_spring(&mut self, id: SpringId) -> bool {
        let Some(edge) = self.spring_index.remove(&id) else {
            return false;
        };
        if let Some((from, to)) = self.graph.edge_endpoints(edge) {
            self.graph.remove_edge(edge);
            for index in [from, to] {
                let particle = &mut self.graph[index];
                particle.connections = particle.connections.saturating_sub(1);
            }
        }
        true
    }

    /// Get the number of springs.
    pub fn spring_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Look up a spring by id.
    pub fn spring(&self, id: SpringId) -> Option<&Spring> {
        self.spring_index
            .get(&id)
            .and_then(|&edge| self.graph.edge_weight(edge))
    }

    /// The `(from, to)` particle ids of a spring.
    pub fn spring_endpoints(&self, id: SpringId) -> Option<(NodeId, NodeId)> {
        let &edge = self.spring_index.get(&id)?;
        let (from, to) = self.graph.edge_endpoints(edge)?;
        Some((self.graph[from].id, self.graph[to].id))
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advance the simulation by one time step and publish the result.
    pub fn tick(&mut self) -> Energy {
        self.tend();
        match self.config.integrator {
            Integrator::Euler => self.step_euler(),
            Integrator::Verlet => self.step_verlet(),
        }
        self.publish();
        self.energy
    }

    /// Decay mass overrides and drop the previous step's velocity.
    fn tend(&mut self) {
        for particle in self.graph.node_weights_mut() {
            particle.decay_override();
            particle.velocity = Vector::ZERO;
        }
    }

    fn update_forces(&mut self) {
        forces::accumulate(&mut self.graph, &mut self.tree, &self.config, &mut self.rng);
    }

    fn step_euler(&mut self) {
        self.update_forces();

        let dt = self.config.dt;
        let damping = 1.0 - self.config.friction;
        for particle in self.graph.node_weights_mut() {
            if particle.fixed {
                particle.settle();
                continue;
            }
            particle.velocity = (particle.velocity + particle.force * dt) * damping;
            particle.force = Vector::ZERO;
            limit_speed(particle);
            particle.position += particle.velocity * dt;
        }
    }

    fn step_verlet(&mut self) {
        self.update_forces();

        let dt = self.config.dt;
        for particle in self.graph.node_weights_mut() {
            particle.cached_force = particle.force;
            particle.force = Vector::ZERO;
            if !particle.fixed {
                particle.position += particle.velocity * dt + particle.cached_force * (0.5 * dt * dt);
            }
        }

        self.update_forces();

        let damping = 1.0 - self.config.friction;
        for particle in self.graph.node_weights_mut() {
            if particle.fixed {
                particle.settle();
                continue;
            }
            let average = (particle.cached_force + particle.force) * 0.5;
            particle.velocity = (particle.velocity + average * dt) * damping;
            particle.force = Vector::ZERO;
            limit_speed(particle);
        }
    }

    fn publish(&mut self) {
        self.bounds = Bounds::from_points(self.graph.node_weights().map(|p| p.position))
            .unwrap_or_default();
        self.energy = Energy::from_speeds(
            self.graph
                .node_weights()
                .filter(|p| !p.fixed)
                .map(|p| p.velocity.magnitude_sq()),
        );
        self.spatial_dirty = true;
        trace!(
            "epoch {} energy sum={} max={} mean={} n={}",
            self.epoch, self.energy.sum, self.energy.max, self.energy.mean, self.energy.n
        );

        if self.on_update.is_some() {
            let frame = self.frame();
            if let Some(callback) = self.on_update.as_mut() {
                callback(&frame);
            }
        }
    }

    /// Register the callback that receives every published frame.
    pub fn set_on_update(&mut self, callback: Option<FrameCallback>) {
        self.on_update = callback;
    }

    /// The current state as a renderer sees it.
    pub fn frame(&self) -> Frame {
        Frame {
            geometry: self
                .graph
                .node_weights()
                .map(|p| NodePosition {
                    id: p.id,
                    x: p.position.x,
                    y: p.position.y,
                })
                .collect(),
            epoch: self.epoch,
            energy: self.energy,
            bounds: self.bounds,
        }
    }

    /// Number of change batches applied so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Energy measured by the latest tick.
    pub fn energy(&self) -> Energy {
        self.energy
    }

    /// Bounding box of the particles after the latest tick.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Get the current physics configuration.
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    // =========================================================================
    // Snapshots & Queries
    // =========================================================================

    /// A change batch that rebuilds the current registries on an empty engine.
    ///
    /// Nodes come first, then springs, each sorted by id.
    pub fn snapshot(&self) -> Vec<Change> {
        let mut nodes: Vec<&Particle> = self.graph.node_weights().collect();
        nodes.sort_by_key(|p| p.id);

        let mut springs: Vec<SpringSpec> = self
            .graph
            .edge_references()
            .map(|edge| {
                let spring = edge.weight();
                SpringSpec::new(
                    spring.id,
                    self.graph[edge.source()].id,
                    self.graph[edge.target()].id,
                    spring.rest_length,
                )
            })
            .collect();
        springs.sort_by_key(|s| s.id);

        nodes
            .into_iter()
            .map(|p| {
                Change::AddNode(
                    NodeSpec::new(p.id)
                        .at(p.position.x, p.position.y)
                        .with_mass(p.mass)
                        .fixed(p.fixed),
                )
            })
            .chain(springs.into_iter().map(Change::AddSpring))
            .collect()
    }

    /// The particle closest to `point`, rebuilding the index if needed.
    pub fn nearest(&mut self, point: Vector) -> Option<Nearest> {
        self.ensure_spatial_index();
        self.spatial.nearest(point)
    }

    /// The closest particle within `max_distance` of `point`.
    pub fn nearest_within(&mut self, point: Vector, max_distance: f32) -> Option<Nearest> {
        self.ensure_spatial_index();
        self.spatial.nearest_within(point, max_distance)
    }

    fn ensure_spatial_index(&mut self) {
        if self.spatial_dirty {
            self.spatial
                .rebuild(self.graph.node_weights().map(|p| (p.id, p.position)));
            self.spatial_dirty = false;
        }
    }

    /// Remove every particle and spring. The epoch keeps counting.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_index.clear();
        self.spring_index.clear();
        self.free.clear();
        self.energy = Energy::default();
        self.bounds = Bounds::default();
        self.spatial.clear();
        self.spatial_dirty = false;
        debug!("cleared particle system at epoch {}", self.epoch);
    }
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

fn limit_speed(particle: &mut Particle) {
    let speed = particle.velocity.magnitude();
    if speed > SPEED_LIMIT {
        particle.velocity = particle.velocity * (SPEED_LIMIT / speed);
    }
}
