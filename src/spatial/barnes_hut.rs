//! Barnes-Hut quadtree for approximate n-body repulsion.
//!
//! The tree is rebuilt from scratch every tick. Branches live in an arena that
//! survives between builds: `init` resets a bump counter and `new_branch`
//! recycles the slot at that index, so a steady-state simulation allocates
//! nothing per tick.
//!
//! Each branch stores the total mass of its descendants and the *unnormalized*
//! mass-weighted position sum; the center of mass is only divided out when a
//! query needs it.
//!
//! Quadrant layout (relative to the branch origin, y growing downward):
//!
//! ```text
//!  +----+----+
//!  | NW | NE |
//!  +----+----+
//!  | SW | SE |
//!  +----+----+
//! ```

use std::collections::VecDeque;

use rand::Rng;

use crate::geometry::Vector;

/// Smallest extent (per axis) the root is allowed to span.
const MIN_EXTENT: f32 = 1.0;

/// Bodies that still share a quadrant at this depth are chained in one slot.
const MAX_DEPTH: u32 = 48;

/// Coincident bodies are jostled by up to this fraction of the new branch extent.
const JITTER_FRACTION: f32 = 0.08;

const ROOT: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    /// Index into `bodies`; the head of a chain when bodies share a slot.
    Body(usize),
    /// Index into `branches`.
    Branch(usize),
}

#[derive(Debug, Clone)]
struct Branch {
    origin: Vector,
    size: Vector,
    mass: f32,
    weighted_position: Vector,
    quadrants: [Slot; 4],
    depth: u32,
}

impl Branch {
    fn empty() -> Self {
        Self {
            origin: Vector::ZERO,
            size: Vector::ZERO,
            mass: 0.0,
            weighted_position: Vector::ZERO,
            quadrants: [Slot::Empty; 4],
            depth: 0,
        }
    }

    /// Whether `point` lies inside this branch's extent.
    fn encloses(&self, point: Vector) -> bool {
        let far = self.origin + self.size;
        point.x >= self.origin.x && point.x <= far.x && point.y >= self.origin.y && point.y <= far.y
    }

    fn reset(&mut self, origin: Vector, size: Vector, depth: u32) {
        self.origin = origin;
        self.size = size;
        self.mass = 0.0;
        self.weighted_position = Vector::ZERO;
        self.quadrants = [Slot::Empty; 4];
        self.depth = depth;
    }
}

/// A body inserted into the tree.
#[derive(Debug, Clone)]
pub struct Body<K> {
    pub key: K,
    pub position: Vector,
    pub mass: f32,
    /// Pinned bodies are never jittered.
    pub pinned: bool,
    /// Set when the position was jittered apart from a coincident body.
    pub displaced: bool,
    next: Option<usize>,
}

/// Arena-backed Barnes-Hut quadtree keyed by `K`.
pub struct BarnesHutTree<K> {
    branches: Vec<Branch>,
    branch_count: usize,
    bodies: Vec<Body<K>>,
    theta: f32,
    path: Vec<usize>,
    queue: VecDeque<Slot>,
}

impl<K: Copy + PartialEq> BarnesHutTree<K> {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            branch_count: 0,
            bodies: Vec::new(),
            theta: 0.5,
            path: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Reset the arena and create a root spanning `top_left..bottom_right`.
    pub fn init(&mut self, top_left: Vector, bottom_right: Vector, theta: f32) {
        self.theta = theta;
        self.branch_count = 0;
        self.bodies.clear();

        let size = bottom_right - top_left;
        let pad = Vector::new(
            ((MIN_EXTENT - size.x) * 0.5).max(0.0),
            ((MIN_EXTENT - size.y) * 0.5).max(0.0),
        );
        let origin = top_left - pad;
        let size = size + pad * 2.0;
        self.new_branch(origin, size, 0);
    }

    /// Number of branches used by the current build.
    pub fn branch_count(&self) -> usize {
        self.branch_count
    }

    /// Bodies inserted since the last `init`, in insertion order.
    pub fn bodies(&self) -> impl Iterator<Item = &Body<K>> + '_ {
        self.bodies.iter()
    }

    /// Total mass held by the tree.
    pub fn total_mass(&self) -> f32 {
        if self.branch_count == 0 {
            return 0.0;
        }
        self.branches[ROOT].mass
    }

    /// Center of mass of everything in the tree.
    pub fn center_of_mass(&self) -> Option<Vector> {
        if self.branch_count == 0 || self.branches[ROOT].mass <= 0.0 {
            return None;
        }
        let root = &self.branches[ROOT];
        Some(root.weighted_position / root.mass)
    }

    /// Insert a body, splitting occupied quadrants until it has a slot of its own.
    ///
    /// When two bodies coincide one of them is jittered apart, never a pinned
    /// one. Two pinned bodies at the same point share a slot. Non-finite
    /// positions are ignored.
    pub fn insert<R: Rng + ?Sized>(
        &mut self,
        key: K,
        position: Vector,
        mass: f32,
        pinned: bool,
        rng: &mut R,
    ) {
        if self.branch_count == 0 || !position.is_finite() {
            return;
        }

        let body = self.bodies.len();
        self.bodies.push(Body {
            key,
            position,
            mass,
            pinned,
            displaced: false,
            next: None,
        });

        self.path.clear();
        let mut node = ROOT;
        loop {
            self.path.push(node);
            let quad = self.quadrant_of(node, self.bodies[body].position);

            match self.branches[node].quadrants[quad] {
                Slot::Empty => {
                    self.branches[node].quadrants[quad] = Slot::Body(body);
                    self.accumulate(node, body);
                    return;
                }
                Slot::Branch(child) => {
                    self.accumulate(node, body);
                    node = child;
                }
                Slot::Body(other) => {
                    self.accumulate(node, body);

                    let depth = self.branches[node].depth;
                    let coincident = self.bodies[other].position == self.bodies[body].position;
                    let both_pinned = self.bodies[other].pinned && self.bodies[body].pinned;
                    if depth >= MAX_DEPTH || (coincident && both_pinned) {
                        self.bodies[body].next = Some(other);
                        self.branches[node].quadrants[quad] = Slot::Body(body);
                        return;
                    }

                    let (origin, size) = self.quadrant_extent(node, quad);
                    let child = self.new_branch(origin, size, depth + 1);
                    self.branches[node].quadrants[quad] = Slot::Branch(child);

                    if coincident {
                        let movable = if self.bodies[other].pinned { body } else { other };
                        self.jitter(movable, origin, size, rng);
                    }

                    let other_quad = self.quadrant_of(child, self.bodies[other].position);
                    self.branches[child].quadrants[other_quad] = Slot::Body(other);
                    self.accumulate(child, other);
                    node = child;
                }
            }
        }
    }

    /// Approximate repulsion felt by the body `key` sitting at `position`.
    ///
    /// Walks the tree breadth-first. A branch is opened when its
    /// `size / distance` exceeds theta or when it encloses `position`;
    /// otherwise it acts as one body at its center of mass.
    /// The force law is `repulsion * mass / max(1, d)^2`, directed away from
    /// the source.
    pub fn repulsion_on<R: Rng + ?Sized>(
        &mut self,
        key: K,
        position: Vector,
        repulsion: f32,
        rng: &mut R,
    ) -> Vector {
        let mut force = Vector::ZERO;
        if self.branch_count == 0 {
            return force;
        }

        let mut queue = std::mem::take(&mut self.queue);
        queue.clear();
        queue.push_back(Slot::Branch(ROOT));

        while let Some(slot) = queue.pop_front() {
            match slot {
                Slot::Empty => {}
                Slot::Body(head) => {
                    let mut cursor = Some(head);
                    while let Some(index) = cursor {
                        let other = &self.bodies[index];
                        if other.key != key {
                            force += repel(position, other.position, other.mass, repulsion, rng);
                        }
                        cursor = other.next;
                    }
                }
                Slot::Branch(index) => {
                    let branch = &self.branches[index];
                    if branch.mass <= 0.0 {
                        continue;
                    }
                    let center = branch.weighted_position / branch.mass;
                    let distance = (position - center).magnitude();
                    let size = (branch.size.x * branch.size.y).sqrt();
                    if size / distance > self.theta || branch.encloses(position) {
                        queue.extend(branch.quadrants);
                    } else {
                        force += repel(position, center, branch.mass, repulsion, rng);
                    }
                }
            }
        }

        self.queue = queue;
        force
    }

    fn new_branch(&mut self, origin: Vector, size: Vector, depth: u32) -> usize {
        let index = self.branch_count;
        if index == self.branches.len() {
            self.branches.push(Branch::empty());
        }
        self.branches[index].reset(origin, size, depth);
        self.branch_count += 1;
        index
    }

    fn quadrant_of(&self, node: usize, position: Vector) -> usize {
        let branch = &self.branches[node];
        let relative = position - branch.origin;
        let half = branch.size * 0.5;
        let south = relative.y >= half.y;
        let east = relative.x >= half.x;
        (south as usize) * 2 + east as usize
    }

    fn quadrant_extent(&self, node: usize, quad: usize) -> (Vector, Vector) {
        let branch = &self.branches[node];
        let half = branch.size * 0.5;
        let mut origin = branch.origin;
        if quad & 1 == 1 {
            origin.x += half.x;
        }
        if quad & 2 == 2 {
            origin.y += half.y;
        }
        (origin, half)
    }

    fn accumulate(&mut self, node: usize, body: usize) {
        let Body { position, mass, .. } = self.bodies[body];
        let branch = &mut self.branches[node];
        branch.mass += mass;
        branch.weighted_position += position * mass;
    }

    /// Nudge `body` inside the branch extent and fix the aggregates it was
    /// already folded into along the current insertion path.
    ///
    /// `body` is either the one being inserted or the one it collided with;
    /// both have been folded into every branch on the path.
    fn jitter<R: Rng + ?Sized>(&mut self, body: usize, origin: Vector, size: Vector, rng: &mut R) {
        let spread = size * JITTER_FRACTION;
        let old = self.bodies[body].position;
        let far = origin + size;
        let new = Vector::new(
            (old.x - spread.x * 0.5 + rng.random::<f32>() * spread.x).clamp(origin.x, far.x),
            (old.y - spread.y * 0.5 + rng.random::<f32>() * spread.y).clamp(origin.y, far.y),
        );

        let mass = self.bodies[body].mass;
        let correction = (new - old) * mass;
        for &node in &self.path {
            self.branches[node].weighted_position += correction;
        }

        let moved = &mut self.bodies[body];
        moved.position = new;
        moved.displaced = true;
    }
}

impl<K: Copy + PartialEq> Default for BarnesHutTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn repel<R: Rng + ?Sized>(
    position: Vector,
    source: Vector,
    mass: f32,
    repulsion: f32,
    rng: &mut R,
) -> Vector {
    let delta = position - source;
    let distance = delta.magnitude().max(1.0);
    delta.direction_or_random(rng) * (repulsion * mass / (distance * distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn brute_force(bodies: &[(u32, Vector, f32)], key: u32, repulsion: f32) -> Vector {
        let mut rng = SmallRng::seed_from_u64(0);
        let position = bodies.iter().find(|b| b.0 == key).unwrap().1;
        bodies
            .iter()
            .filter(|b| b.0 != key)
            .fold(Vector::ZERO, |acc, &(_, p, m)| {
                acc + repel(position, p, m, repulsion, &mut rng)
            })
    }

    fn scattered(count: u32) -> Vec<(u32, Vector, f32)> {
        let mut rng = SmallRng::seed_from_u64(42);
        (0..count)
            .map(|i| {
                let p = Vector::new(
                    rng.random::<f32>() * 200.0 - 100.0,
                    rng.random::<f32>() * 120.0 - 60.0,
                );
                (i, p, 1.0 + (i % 3) as f32)
            })
            .collect()
    }

    fn build(bodies: &[(u32, Vector, f32)], theta: f32) -> BarnesHutTree<u32> {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut tree = BarnesHutTree::new();
        tree.init(Vector::new(-100.0, -60.0), Vector::new(100.0, 60.0), theta);
        for &(key, position, mass) in bodies {
            tree.insert(key, position, mass, false, &mut rng);
        }
        tree
    }

    #[test]
    fn test_aggregates_match_inputs() {
        let bodies = scattered(40);
        let tree = build(&bodies, 0.5);

        let total: f32 = bodies.iter().map(|b| b.2).sum();
        let weighted = bodies
            .iter()
            .fold(Vector::ZERO, |acc, &(_, p, m)| acc + p * m);
        let expected = weighted / total;
        let com = tree.center_of_mass().unwrap();

        assert!((tree.total_mass() - total).abs() < 1e-3);
        assert!((com - expected).magnitude() < 1e-3);
        assert_eq!(tree.bodies().count(), 40);
    }

    #[test]
    fn test_theta_zero_matches_brute_force() {
        let bodies = scattered(60);
        let mut tree = build(&bodies, 0.0);
        let mut rng = SmallRng::seed_from_u64(1);

        for &(key, position, _) in &bodies {
            let approx = tree.repulsion_on(key, position, 600.0, &mut rng);
            let exact = brute_force(&bodies, key, 600.0);
            let tolerance = 1e-3 * exact.magnitude().max(1.0);
            assert!(
                (approx - exact).magnitude() <= tolerance,
                "body {key}: {approx} vs {exact}"
            );
        }
    }

    #[test]
    fn test_approximation_stays_close() {
        let bodies = scattered(80);
        let mut tree = build(&bodies, 0.4);
        let mut rng = SmallRng::seed_from_u64(1);

        for &(key, position, _) in &bodies {
            let approx = tree.repulsion_on(key, position, 600.0, &mut rng);
            let exact = brute_force(&bodies, key, 600.0);
            // Total unsigned magnitude of the pairwise terms.
            let scale: f32 = bodies
                .iter()
                .filter(|b| b.0 != key)
                .map(|&(_, p, m)| {
                    let d = (position - p).magnitude().max(1.0);
                    600.0 * m / (d * d)
                })
                .sum();
            assert!((approx - exact).magnitude() <= 0.05 * scale, "body {key}");
        }
    }

    #[test]
    fn test_two_bodies_push_apart() {
        let bodies = vec![
            (0, Vector::new(-5.0, 0.0), 1.0),
            (1, Vector::new(5.0, 0.0), 1.0),
        ];
        let mut tree = build(&bodies, 0.4);
        let mut rng = SmallRng::seed_from_u64(1);

        let left = tree.repulsion_on(0, bodies[0].1, 600.0, &mut rng);
        let right = tree.repulsion_on(1, bodies[1].1, 600.0, &mut rng);

        assert!(left.x < 0.0);
        assert!(right.x > 0.0);
        assert!((left.x + 6.0).abs() < 1e-4);
        assert!((right.x - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_coincident_bodies_are_jittered() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut tree = BarnesHutTree::new();
        tree.init(Vector::new(-10.0, -10.0), Vector::new(10.0, 10.0), 0.5);
        tree.insert(0u32, Vector::new(3.0, 3.0), 1.0, false, &mut rng);
        tree.insert(1u32, Vector::new(3.0, 3.0), 1.0, false, &mut rng);

        let bodies: Vec<_> = tree.bodies().collect();
        assert!(bodies[0].displaced);
        assert!(!bodies[1].displaced);
        assert_ne!(bodies[0].position, bodies[1].position);

        let expected = (bodies[0].position + bodies[1].position) / 2.0;
        let com = tree.center_of_mass().unwrap();
        assert!((com - expected).magnitude() < 1e-4);
        assert!((tree.total_mass() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_pinned_body_is_never_jittered() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut tree = BarnesHutTree::new();
        tree.init(Vector::new(-10.0, -10.0), Vector::new(10.0, 10.0), 0.5);
        tree.insert(0u32, Vector::new(3.0, 3.0), 1.0, true, &mut rng);
        tree.insert(1u32, Vector::new(3.0, 3.0), 1.0, false, &mut rng);

        let bodies: Vec<_> = tree.bodies().collect();
        assert!(!bodies[0].displaced);
        assert_eq!(bodies[0].position, Vector::new(3.0, 3.0));
        assert!(bodies[1].displaced);
        assert_ne!(bodies[1].position, Vector::new(3.0, 3.0));

        let expected = (bodies[0].position + bodies[1].position) / 2.0;
        let com = tree.center_of_mass().unwrap();
        assert!((com - expected).magnitude() < 1e-4);
    }

    #[test]
    fn test_coincident_pinned_bodies_share_a_slot() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut tree = BarnesHutTree::new();
        tree.init(Vector::new(-10.0, -10.0), Vector::new(10.0, 10.0), 0.5);
        tree.insert(0u32, Vector::new(3.0, 3.0), 1.0, true, &mut rng);
        tree.insert(1u32, Vector::new(3.0, 3.0), 1.0, true, &mut rng);

        assert!(tree.bodies().all(|body| !body.displaced));
        assert_eq!(tree.branch_count(), 1);
        assert!((tree.total_mass() - 2.0).abs() < 1e-6);

        // both at distance 0, clamped to 1
        let force = tree.repulsion_on(0, Vector::new(3.0, 3.0), 600.0, &mut rng);
        assert!((force.magnitude() - 600.0).abs() < 1e-2);
    }

    #[test]
    fn test_thin_root_excludes_own_mass() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut tree = BarnesHutTree::new();
        tree.init(Vector::new(-50.0, -0.5), Vector::new(50.0, 0.5), 0.4);
        tree.insert(0u32, Vector::new(-50.0, 0.0), 1.0, false, &mut rng);
        tree.insert(1u32, Vector::new(50.0, 0.0), 1.0, false, &mut rng);

        let left = tree.repulsion_on(0, Vector::new(-50.0, 0.0), 600.0, &mut rng);
        let right = tree.repulsion_on(1, Vector::new(50.0, 0.0), 600.0, &mut rng);

        assert!((left - Vector::new(-0.06, 0.0)).magnitude() < 1e-5, "{left}");
        assert!((right - Vector::new(0.06, 0.0)).magnitude() < 1e-5, "{right}");
    }

    #[test]
    fn test_degenerate_root_terminates() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut tree = BarnesHutTree::new();
        let point = Vector::new(2.0, 2.0);
        tree.init(point, point, 0.5);
        for key in 0..10u32 {
            tree.insert(key, point, 1.0, false, &mut rng);
        }

        assert_eq!(tree.bodies().count(), 10);
        assert!((tree.total_mass() - 10.0).abs() < 1e-4);
        let force = tree.repulsion_on(0, point, 100.0, &mut rng);
        assert!(force.is_finite());
    }

    #[test]
    fn test_init_recycles_branches() {
        let bodies = scattered(30);
        let mut tree = build(&bodies, 0.5);
        let first = tree.branch_count();
        let allocated = tree.branches.len();

        let mut rng = SmallRng::seed_from_u64(9);
        tree.init(Vector::new(-100.0, -60.0), Vector::new(100.0, 60.0), 0.5);
        assert_eq!(tree.branch_count(), 1);
        assert_eq!(tree.total_mass(), 0.0);

        for &(key, position, mass) in &bodies {
            tree.insert(key, position, mass, false, &mut rng);
        }
        assert_eq!(tree.branch_count(), first);
        assert_eq!(tree.branches.len(), allocated);
    }

    #[test]
    fn test_non_finite_positions_ignored() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut tree = BarnesHutTree::new();
        tree.init(Vector::new(-1.0, -1.0), Vector::new(1.0, 1.0), 0.5);
        tree.insert(0u32, Vector::new(f32::NAN, 0.0), 1.0, false, &mut rng);

        assert_eq!(tree.bodies().count(), 0);
        assert_eq!(tree.center_of_mass(), None);
    }
}
