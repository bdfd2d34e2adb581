//! Arena-based octree over caller-owned points.
//!
//! Nodes live in a flat arena addressed by [`NodeId`] and are recycled
//! through a free pool: `reset()` nulls every cross-reference
//! (parent/children/point list) before a slot can be reissued, so no run
//! leaks structure into the next. Points are referenced by index only;
//! positions stay with the caller and are passed into the operations that
//! need them.
//!
//! Internal nodes keep the full set of point indices at/under them. That
//! costs O(n · depth) memory but makes the matcher's multiscale draw
//! (random leaf → random ancestor) a constant-time slice lookup.

use crate::config::SplitPolicy;
use crate::core::{Bounds, Point3D};

/// Index of a node in the octree arena.
pub type NodeId = usize;

/// Depth cap; far beyond any split a sane cloud produces, but bounds the
/// descent when near-coincident points meet a tiny cell-size limit.
const MAX_DEPTH: u16 = 64;

#[derive(Clone, Debug, Default)]
struct OctreeNode {
    bounds: Bounds,
    divider: Point3D,
    parent: Option<NodeId>,
    children: Option<[NodeId; 8]>,
    points: Vec<u32>,
    depth: u16,
}

impl OctreeNode {
    fn clear(&mut self) {
        self.bounds = Bounds::empty();
        self.divider = Point3D::ZERO;
        self.parent = None;
        self.children = None;
        self.points.clear();
        self.depth = 0;
    }
}

/// Octant index from three independent sign comparisons against the
/// divider; ties resolve to the "≥" branch. Bit 0 = x, bit 1 = y,
/// bit 2 = z, matching [`Bounds::octant`].
#[inline]
fn octant_index(divider: Point3D, p: Point3D) -> usize {
    (p.x >= divider.x) as usize
        | (((p.y >= divider.y) as usize) << 1)
        | (((p.z >= divider.z) as usize) << 2)
}

/// Multiscale spatial index.
///
/// # Usage
///
/// ```rust
/// use rupa_detect::config::SplitPolicy;
/// use rupa_detect::core::{Bounds, Point3D};
/// use rupa_detect::octree::Octree;
///
/// let cloud = vec![
///     Point3D::new(0.1, 0.1, 0.1),
///     Point3D::new(0.9, 0.9, 0.9),
/// ];
/// let mut octree = Octree::new(SplitPolicy::EqualCount { max_points: 8 });
/// octree.initialize(Bounds::from_points(&cloud));
/// for (i, &p) in cloud.iter().enumerate() {
///     let leaf = octree.add_point(&cloud, i as u32).unwrap();
///     assert!(octree.bounds_of(leaf).contains(p));
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    policy: SplitPolicy,
}

impl Octree {
    /// Create an empty octree with the given split policy.
    pub fn new(policy: SplitPolicy) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            policy,
        }
    }

    /// Reset and set the root bounding volume for a new run.
    pub fn initialize(&mut self, bounds: Bounds) {
        self.reset();
        let root = self.alloc(bounds, None, 0);
        self.root = Some(root);
    }

    /// Recycle every node back into the pool.
    ///
    /// All parent/children references and point lists are nulled before a
    /// slot is reissued; allocated capacity is retained.
    pub fn reset(&mut self) {
        self.free.clear();
        for (id, node) in self.nodes.iter_mut().enumerate() {
            node.clear();
            self.free.push(id);
        }
        self.root = None;
    }

    /// Root node, if initialized.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of arena slots ever allocated (pool capacity).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Bounding box of a node.
    #[inline]
    pub fn bounds_of(&self, node: NodeId) -> Bounds {
        self.nodes[node].bounds
    }

    /// Parent of a node (`None` at the root and after a reset).
    #[inline]
    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    /// Children of a node (`None` for leaves and after a reset).
    #[inline]
    pub fn children_of(&self, node: NodeId) -> Option<&[NodeId; 8]> {
        self.nodes[node].children.as_ref()
    }

    /// Point indices held at/under a node.
    #[inline]
    pub fn points_of(&self, node: NodeId) -> &[u32] {
        &self.nodes[node].points
    }

    /// Whether the node is a leaf.
    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node].children.is_none()
    }

    /// Insert a point reference; returns the leaf that now holds it.
    ///
    /// Returns `None` when `initialize` has not been called. The point's
    /// position is read from `cloud[index]`; the octree stores only the
    /// index.
    pub fn add_point(&mut self, cloud: &[Point3D], index: u32) -> Option<NodeId> {
        let mut current = self.root?;
        let p = cloud[index as usize];

        // Descend, recording the point at every level.
        loop {
            self.nodes[current].points.push(index);
            match self.nodes[current].children {
                Some(children) => {
                    current = children[octant_index(self.nodes[current].divider, p)];
                }
                None => break,
            }
        }

        // Split the leaf as long as the policy demands and a split can
        // still make progress.
        while self.should_split(cloud, current) {
            let Some(children) = self.split(cloud, current) else {
                break;
            };
            current = children[octant_index(self.nodes[current].divider, p)];
        }

        Some(current)
    }

    /// All leaves currently holding at least one point.
    pub fn leaf_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.nodes[id].children {
                Some(children) => stack.extend(children),
                None => {
                    if !self.nodes[id].points.is_empty() {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// Collect the node and all its ancestors up to the root into `out`.
    ///
    /// `out` is cleared first; element 0 is `node` itself, the last is
    /// the root.
    pub fn ancestor_chain(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.clear();
        let mut current = Some(node);
        while let Some(id) = current {
            out.push(id);
            current = self.nodes[id].parent;
        }
    }

    fn alloc(&mut self, bounds: Bounds, parent: Option<NodeId>, depth: u16) -> NodeId {
        let divider = bounds.center();
        match self.free.pop() {
            Some(id) => {
                let node = &mut self.nodes[id];
                node.bounds = bounds;
                node.divider = divider;
                node.parent = parent;
                node.children = None;
                node.points.clear();
                node.depth = depth;
                id
            }
            None => {
                self.nodes.push(OctreeNode {
                    bounds,
                    divider,
                    parent,
                    children: None,
                    points: Vec::new(),
                    depth,
                });
                self.nodes.len() - 1
            }
        }
    }

    fn should_split(&self, cloud: &[Point3D], leaf: NodeId) -> bool {
        let node = &self.nodes[leaf];
        if node.depth >= MAX_DEPTH {
            return false;
        }
        let wants_split = match self.policy {
            SplitPolicy::EqualCount { max_points } => node.points.len() > max_points,
            SplitPolicy::CellSize { max_extent } => {
                !node.points.is_empty() && node.bounds.max_extent() > max_extent
            }
        };
        wants_split && self.split_can_progress(cloud, leaf)
    }

    /// Repeated splitting cannot separate bit-identical points; a split
    /// that would move every point into one coincident pile is refused so
    /// the node stays a leaf instead of recursing forever.
    fn split_can_progress(&self, cloud: &[Point3D], leaf: NodeId) -> bool {
        let points = &self.nodes[leaf].points;
        match self.policy {
            // Cell-size splits progress by shrinking the cell, so a lone
            // (or coincident) pile still subdivides down to the target
            // extent; the depth cap bounds that descent.
            SplitPolicy::CellSize { .. } => true,
            SplitPolicy::EqualCount { .. } => {
                let first = cloud[points[0] as usize];
                points.iter().any(|&i| cloud[i as usize] != first)
            }
        }
    }

    /// Split a leaf into 8 octant children and redistribute its points.
    /// Returns the children, or `None` when the split is refused.
    fn split(&mut self, cloud: &[Point3D], leaf: NodeId) -> Option<[NodeId; 8]> {
        if !self.split_can_progress(cloud, leaf) {
            return None;
        }

        let bounds = self.nodes[leaf].bounds;
        let divider = self.nodes[leaf].divider;
        let depth = self.nodes[leaf].depth + 1;

        let mut children = [0 as NodeId; 8];
        for (octant, child) in children.iter_mut().enumerate() {
            *child = self.alloc(bounds.octant(octant), Some(leaf), depth);
        }

        // The parent keeps its at/under point set; children get theirs.
        let indices = self.nodes[leaf].points.clone();
        for index in indices {
            let child = children[octant_index(divider, cloud[index as usize])];
            self.nodes[child].points.push(index);
        }

        self.nodes[leaf].children = Some(children);
        Some(children)
    }
}
