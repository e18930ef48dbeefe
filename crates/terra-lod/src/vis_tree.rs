//! Sparse LOD/visibility quadtree over the terrain map.
//!
//! Nodes live in a fixed array and reference each other and the
//! [`GeomPool`] by index. Every frame [`VisTree::traverse`] walks the tree
//! from the root, splitting leaves whose screen-space error is too large and
//! merging subtrees that are fine enough, and gathers the accepted nodes into
//! a draw list. Accepted leaves without geometry get a [`GeomGenJob`] queued;
//! the frame driver fulfils a bounded number of those per frame and hands the
//! results back through [`VisTree::apply_geoms`].
//!
//! Level 0 is the finest level. The root sits at `num_levels` and covers the
//! whole map, whose side is `chunk_size << num_levels` voxels.

use glam::Vec2;
use terra_config::LodConfig;

use crate::bounds::{BoundsRect, NodeAddress};
use crate::error::LodError;
use crate::geom_pool::{GeomPool, SlotIndex};
use crate::job::{ApplyOutcome, GeomGenJob};
use crate::metric::ScreenErrorMetric;
use crate::node::{GeomRef, LodNode, NUM_CHILDREN, NUM_GEOMS, NodeFlags, NodeIndex};

/// Static parameters of a [`VisTree`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeSettings {
    /// Level of the root node.
    pub num_levels: u8,
    /// Side of a level-0 chunk in voxels. Must be a power of two.
    pub chunk_size: u32,
    /// Capacity of the node array.
    pub max_nodes: usize,
    pub metric: ScreenErrorMetric,
}

impl TreeSettings {
    #[must_use]
    pub fn from_config(config: &LodConfig) -> Self {
        Self {
            num_levels: config.num_levels,
            chunk_size: config.chunk_size,
            max_nodes: config.max_nodes,
            metric: ScreenErrorMetric::from_config(config),
        }
    }

    /// Side length of the whole map in voxels.
    #[must_use]
    pub fn map_dim(&self) -> i32 {
        (self.chunk_size as i32) << self.num_levels
    }
}

/// Result of an external view-volume test for a node's bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cull {
    /// Entirely visible; descendants skip further tests.
    Inside,
    /// Entirely invisible; the node is left untouched this frame.
    Outside,
    /// Partially visible.
    Intersect,
}

/// Counters collected during one traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub visited: usize,
    pub gathered: usize,
    pub splits: usize,
    pub merges: usize,
    pub jobs_queued: usize,
    /// Leaves that needed refinement but could not get four free nodes.
    pub deferred_splits: usize,
    pub culled: usize,
    /// Queued jobs discarded because their node changed since queueing.
    pub stale_jobs_dropped: usize,
}

/// LOD quadtree with its node array, draw list and job queue.
pub struct VisTree {
    settings: TreeSettings,
    nodes: Vec<LodNode>,
    free_nodes: Vec<NodeIndex>,
    root: NodeIndex,
    drawables: Vec<NodeIndex>,
    /// Pending jobs, consumed from the back.
    jobs: Vec<GeomGenJob>,
}

impl VisTree {
    /// Create a tree whose root is a single leaf covering the whole map.
    ///
    /// # Panics
    ///
    /// Panics if `max_nodes` is zero or exceeds `u16::MAX`, if the chunk
    /// size is not a power of two, or if the map side `chunk_size << num_levels`
    /// does not fit in an `i32`.
    pub fn new(settings: TreeSettings) -> Self {
        let max_nodes = settings.max_nodes;
        assert!(max_nodes > 0, "node array needs at least the root");
        assert!(
            max_nodes <= usize::from(u16::MAX),
            "node capacity {max_nodes} exceeds {}",
            u16::MAX
        );
        assert!(
            settings.chunk_size.is_power_of_two(),
            "chunk size {} is not a power of two",
            settings.chunk_size
        );
        let fits = settings.num_levels < 31
            && (u64::from(settings.chunk_size) << settings.num_levels) <= i32::MAX as u64;
        assert!(
            fits,
            "map side {} << {} does not fit in i32",
            settings.chunk_size, settings.num_levels
        );

        let mut nodes = vec![LodNode::default(); max_nodes];
        nodes[0].reset();
        tracing::debug!(
            max_nodes,
            num_levels = settings.num_levels,
            map_dim = settings.map_dim(),
            "created vis tree"
        );
        Self {
            settings,
            nodes,
            // Node 0 is the root; the rest are handed out lowest index first.
            free_nodes: (1..max_nodes).rev().map(|i| NodeIndex(i as u16)).collect(),
            root: NodeIndex(0),
            drawables: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn from_config(config: &LodConfig) -> Self {
        Self::new(TreeSettings::from_config(config))
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Bounds of the root node.
    pub fn map_bounds(&self) -> BoundsRect {
        BoundsRect::square(self.settings.map_dim())
    }

    pub fn node(&self, index: NodeIndex) -> &LodNode {
        &self.nodes[index.get()]
    }

    pub fn free_node_count(&self) -> usize {
        self.free_nodes.len()
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Whether `index` is currently on the free-node list.
    pub fn is_node_free(&self, index: NodeIndex) -> bool {
        self.free_nodes.contains(&index)
    }

    // --- Node allocation ---

    /// Pop a node from the free list and reset it to an empty leaf.
    pub fn alloc_node(&mut self) -> Result<NodeIndex, LodError> {
        let index = self.free_nodes.pop().ok_or(LodError::NodeExhausted)?;
        self.nodes[index.get()].reset();
        Ok(index)
    }

    /// Turn a leaf into an inner node with four fresh leaf children.
    ///
    /// The leaf's own geometry is left in place; the traversal releases it.
    /// Any job outstanding for the node becomes stale.
    pub fn split(&mut self, index: NodeIndex) -> Result<(), LodError> {
        let node = &self.nodes[index.get()];
        debug_assert!(node.is_leaf(), "split of inner node {index}");
        if !node.is_leaf() {
            return Err(LodError::NotALeaf(index));
        }
        if self.free_nodes.len() < NUM_CHILDREN {
            return Err(LodError::NodeExhausted);
        }

        let mut children = [NodeIndex(0); NUM_CHILDREN];
        for child in &mut children {
            *child = self.alloc_node()?;
        }

        let node = &mut self.nodes[index.get()];
        node.children = Some(children);
        node.flags.remove(NodeFlags::GEN_IN_FLIGHT);
        node.generation = node.generation.wrapping_add(1);
        tracing::trace!(%index, ?children, "split node");
        Ok(())
    }

    /// Collapse the subtree under `index` back into an empty leaf.
    ///
    /// Every descendant's geometry goes back to the pool and every descendant
    /// node back to the free list. No-op on a leaf. Returns the number of
    /// nodes freed.
    pub fn merge<M>(&mut self, pool: &mut GeomPool<M>, index: NodeIndex) -> usize {
        let Some(children) = self.nodes[index.get()].children.take() else {
            return 0;
        };

        let mut freed = 0;
        for child in children {
            freed += self.free_subtree(pool, child);
        }

        self.release_geoms(pool, index);
        let node = &mut self.nodes[index.get()];
        node.flags.remove(NodeFlags::GEN_IN_FLIGHT);
        node.generation = node.generation.wrapping_add(1);
        tracing::trace!(%index, freed, "merged node");
        freed
    }

    fn free_subtree<M>(&mut self, pool: &mut GeomPool<M>, index: NodeIndex) -> usize {
        let mut freed = 1;
        if let Some(children) = self.nodes[index.get()].children.take() {
            for child in children {
                freed += self.free_subtree(pool, child);
            }
        }
        self.release_geoms(pool, index);
        self.nodes[index.get()].reset();
        self.free_nodes.push(index);
        freed
    }

    /// Return a node's geometry slots to the pool, leaving it without geometry.
    pub fn release_geoms<M>(&mut self, pool: &mut GeomPool<M>, index: NodeIndex) {
        let node = &mut self.nodes[index.get()];
        for geom in &mut node.geoms {
            if let GeomRef::Slot(slot) = *geom {
                pool.release(slot);
            }
            *geom = GeomRef::Pending;
        }
    }

    // --- Traversal ---

    /// Update the tree for a viewer at `viewer` (map voxel coordinates).
    pub fn traverse<M>(&mut self, pool: &mut GeomPool<M>, viewer: Vec2) -> TraversalStats {
        self.run_traversal(pool, viewer, None::<fn(&BoundsRect, u8) -> Cull>)
    }

    /// Like [`traverse`](Self::traverse), skipping nodes `cull` reports as outside the view.
    ///
    /// Culled nodes are neither drawn, refined nor merged; their state is kept
    /// for when they come back into view.
    pub fn traverse_culled<M, C>(
        &mut self,
        pool: &mut GeomPool<M>,
        viewer: Vec2,
        cull: C,
    ) -> TraversalStats
    where
        C: FnMut(&BoundsRect, u8) -> Cull,
    {
        self.run_traversal(pool, viewer, Some(cull))
    }

    fn run_traversal<M, C>(
        &mut self,
        pool: &mut GeomPool<M>,
        viewer: Vec2,
        mut cull: Option<C>,
    ) -> TraversalStats
    where
        C: FnMut(&BoundsRect, u8) -> Cull,
    {
        self.drawables.clear();
        let mut stats = TraversalStats::default();
        let root = self.root;
        let bounds = self.map_bounds();
        let level = self.settings.num_levels;
        let culling = cull.is_some();
        let mut visit = Visit {
            pool,
            viewer,
            cull: cull.as_mut(),
            stats: &mut stats,
        };
        self.visit(&mut visit, root, bounds, level, !culling);
        stats.stale_jobs_dropped = self.purge_stale_jobs();

        if stats.deferred_splits > 0 {
            tracing::warn!(
                deferred = stats.deferred_splits,
                free_nodes = self.free_nodes.len(),
                "node array exhausted, refinement deferred"
            );
        }
        tracing::debug!(
            visited = stats.visited,
            drawn = stats.gathered,
            splits = stats.splits,
            merges = stats.merges,
            jobs = stats.jobs_queued,
            dropped = stats.stale_jobs_dropped,
            pending = self.jobs.len(),
            "traversal done"
        );
        stats
    }

    fn visit<M, C>(
        &mut self,
        ctx: &mut Visit<'_, M, C>,
        index: NodeIndex,
        bounds: BoundsRect,
        level: u8,
        mut inside: bool,
    ) where
        C: FnMut(&BoundsRect, u8) -> Cull,
    {
        ctx.stats.visited += 1;

        let flags = &mut self.nodes[index.get()].flags;
        flags.remove(NodeFlags::CULL_MASK);
        if let Some(cull) = ctx.cull.as_deref_mut() {
            if !inside {
                match cull(&bounds, level) {
                    Cull::Outside => {
                        flags.insert(NodeFlags::CULL_OUTSIDE);
                        ctx.stats.culled += 1;
                        return;
                    }
                    Cull::Inside => inside = true,
                    Cull::Intersect => {}
                }
            }
            if inside {
                flags.insert(NodeFlags::CULL_INSIDE);
            }
        }

        let distance = bounds.distance_to(ctx.viewer);
        if self.settings.metric.accepts(level, distance) {
            if !self.nodes[index.get()].is_leaf() {
                self.merge(ctx.pool, index);
                ctx.stats.merges += 1;
            }
            self.gather(ctx.stats, index, bounds, level);
            return;
        }

        if self.nodes[index.get()].is_leaf() {
            match self.split(index) {
                Ok(()) => {
                    self.release_geoms(ctx.pool, index);
                    ctx.stats.splits += 1;
                }
                Err(_) => {
                    ctx.stats.deferred_splits += 1;
                    self.gather(ctx.stats, index, bounds, level);
                    return;
                }
            }
        }

        let Some(children) = self.nodes[index.get()].children else {
            return;
        };
        for (child, child_bounds) in children.into_iter().zip(bounds.quadrants()) {
            self.visit(ctx, child, child_bounds, level - 1, inside);
        }
    }

    /// Append a node to the draw list and queue generation if it has no geometry yet.
    fn gather(
        &mut self,
        stats: &mut TraversalStats,
        index: NodeIndex,
        bounds: BoundsRect,
        level: u8,
    ) {
        self.drawables.push(index);
        stats.gathered += 1;

        let node = &mut self.nodes[index.get()];
        if node.needs_geometry() && !node.is_generating() {
            node.flags.insert(NodeFlags::GEN_IN_FLIGHT);
            self.jobs.push(GeomGenJob {
                node: index,
                generation: node.generation,
                level,
                bounds,
                scale: bounds.scale(self.settings.chunk_size),
                translate: bounds.translation(),
            });
            stats.jobs_queued += 1;
        }
    }

    /// Nodes accepted by the last traversal, in traversal order.
    pub fn drawables(&self) -> &[NodeIndex] {
        &self.drawables
    }

    /// Every pool slot to draw this frame, in draw-list order.
    pub fn drawable_slots(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.drawables
            .iter()
            .flat_map(move |&index| self.nodes[index.get()].slots())
    }

    // --- Job queue ---

    /// Jobs waiting to be processed; the last one is popped first.
    pub fn pending_jobs(&self) -> &[GeomGenJob] {
        &self.jobs
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Take the most recently queued job.
    pub fn pop_job(&mut self) -> Option<GeomGenJob> {
        self.jobs.pop()
    }

    /// Whether `job` still targets the same incarnation of its node and is awaited.
    pub fn is_job_live(&self, job: &GeomGenJob) -> bool {
        job_is_live(&self.nodes, job)
    }

    /// Drop queued jobs whose node was split, merged, cancelled or recycled.
    ///
    /// At most one live job exists per node, so afterwards the queue is
    /// bounded by the node capacity.
    fn purge_stale_jobs(&mut self) -> usize {
        let before = self.jobs.len();
        let nodes = &self.nodes;
        self.jobs.retain(|job| job_is_live(nodes, job));
        before - self.jobs.len()
    }

    /// Give up on a live job; the next traversal queues the node again.
    pub fn cancel_job(&mut self, job: &GeomGenJob) -> bool {
        if !self.is_job_live(job) {
            return false;
        }
        self.nodes[job.node.get()]
            .flags
            .remove(NodeFlags::GEN_IN_FLIGHT);
        true
    }

    /// Install the result of `job` into its node.
    ///
    /// Up to [`NUM_GEOMS`] slots are installed and the remaining entries marked
    /// [`GeomRef::Empty`]; an empty `slots` confirms the node as empty. If the
    /// job went stale the slots are returned to the pool instead.
    pub fn apply_geoms<M>(
        &mut self,
        pool: &mut GeomPool<M>,
        job: &GeomGenJob,
        slots: &[SlotIndex],
    ) -> Result<ApplyOutcome, LodError> {
        if !self.is_job_live(job) {
            for &slot in slots {
                pool.release(slot);
            }
            tracing::trace!(node = %job.node, slots = slots.len(), "stale job completion reclaimed");
            return Ok(ApplyOutcome::Stale);
        }

        let node = &mut self.nodes[job.node.get()];
        let all_pending = node.geoms.iter().all(|g| *g == GeomRef::Pending);
        debug_assert!(all_pending, "node {} already holds geometry", job.node);
        if !all_pending {
            for &slot in slots {
                pool.release(slot);
            }
            node.flags.remove(NodeFlags::GEN_IN_FLIGHT);
            return Err(LodError::GeomsAlreadyPresent(job.node));
        }

        let (install, extra) = slots.split_at(slots.len().min(NUM_GEOMS));
        for (i, geom) in node.geoms.iter_mut().enumerate() {
            *geom = install.get(i).map_or(GeomRef::Empty, |&slot| GeomRef::Slot(slot));
        }
        node.flags.remove(NodeFlags::GEN_IN_FLIGHT);

        if !extra.is_empty() {
            tracing::warn!(
                node = %job.node,
                dropped = extra.len(),
                "more geometry than a node can hold"
            );
            for &slot in extra {
                pool.release(slot);
            }
        }
        Ok(ApplyOutcome::Installed)
    }

    // --- Queries ---

    /// Smallest existing node covering `address`, with its own address.
    ///
    /// Returns `None` if the address lies outside the map.
    pub fn find(&self, address: NodeAddress) -> Option<(NodeIndex, NodeAddress)> {
        let num_levels = self.settings.num_levels;
        if address.level > num_levels {
            return None;
        }
        let span = 1u32 << (num_levels - address.level);
        if address.x >= span || address.y >= span {
            return None;
        }

        let mut index = self.root;
        let mut level = num_levels;
        while level > address.level {
            let Some(children) = self.nodes[index.get()].children else {
                break;
            };
            let shift = level - 1 - address.level;
            let child_addr = NodeAddress::new(level - 1, address.x >> shift, address.y >> shift);
            index = children[child_addr.quadrant_in_parent()];
            level -= 1;
        }
        let shift = level - address.level;
        Some((
            index,
            NodeAddress::new(level, address.x >> shift, address.y >> shift),
        ))
    }
}

fn job_is_live(nodes: &[LodNode], job: &GeomGenJob) -> bool {
    nodes.get(job.node.get()).is_some_and(|node| {
        node.generation == job.generation && node.is_generating() && node.is_leaf()
    })
}

struct Visit<'a, M, C> {
    pool: &'a mut GeomPool<M>,
    viewer: Vec2,
    cull: Option<&'a mut C>,
    stats: &'a mut TraversalStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_nodes: usize) -> TreeSettings {
        TreeSettings {
            num_levels: 3,
            chunk_size: 8,
            max_nodes,
            metric: ScreenErrorMetric::with_constant(100.0, 10.0),
        }
    }

    fn pool(capacity: usize) -> GeomPool<()> {
        GeomPool::new(capacity, |_| ())
    }

    #[test]
    fn test_new_tree_is_single_leaf() {
        let tree = VisTree::new(settings(16));
        assert_eq!(tree.live_node_count(), 1);
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.map_bounds(), BoundsRect::square(64));
    }

    #[test]
    fn test_alloc_node_exhaustion() {
        let mut tree = VisTree::new(settings(3));
        tree.alloc_node().unwrap();
        tree.alloc_node().unwrap();
        assert_eq!(tree.alloc_node(), Err(LodError::NodeExhausted));
    }

    #[test]
    fn test_split_installs_four_leaves() {
        let mut tree = VisTree::new(settings(16));
        let root = tree.root();
        tree.split(root).unwrap();
        let children = *tree.node(root).children().unwrap();
        for child in children {
            assert!(tree.node(child).is_leaf());
            assert!(tree.node(child).needs_geometry());
        }
        assert_eq!(tree.live_node_count(), 5);
    }

    #[test]
    fn test_split_needs_four_free_nodes() {
        let mut tree = VisTree::new(settings(4));
        assert_eq!(tree.split(tree.root()), Err(LodError::NodeExhausted));
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.free_node_count(), 3);
    }

    #[test]
    fn test_merge_on_leaf_is_noop() {
        let mut tree = VisTree::new(settings(16));
        let mut pool = pool(4);
        assert_eq!(tree.merge(&mut pool, tree.root()), 0);
        assert_eq!(tree.live_node_count(), 1);
    }

    #[test]
    fn test_merge_frees_nested_subtree() {
        let mut tree = VisTree::new(settings(32));
        let mut pool = pool(8);
        let root = tree.root();
        tree.split(root).unwrap();
        let first = tree.node(root).children().unwrap()[0];
        tree.split(first).unwrap();
        assert_eq!(tree.live_node_count(), 9);

        let freed = tree.merge(&mut pool, root);
        assert_eq!(freed, 8);
        assert_eq!(tree.live_node_count(), 1);
        assert!(tree.node(root).is_leaf());
    }

    #[test]
    fn test_find_descends_to_existing_node() {
        let mut tree = VisTree::new(settings(16));
        let root = tree.root();
        tree.split(root).unwrap();
        let children = *tree.node(root).children().unwrap();

        // (5, 1) at level 0 lies in the right-hand upper quadrant of the root.
        let (found, addr) = tree.find(NodeAddress::new(0, 5, 1)).unwrap();
        assert_eq!(found, children[1]);
        assert_eq!(addr, NodeAddress::new(2, 1, 0));
        assert!(tree.find(NodeAddress::new(0, 8, 0)).is_none());
    }

    #[test]
    #[should_panic(expected = "does not fit in i32")]
    fn test_new_rejects_too_many_levels() {
        VisTree::new(TreeSettings {
            num_levels: 31,
            chunk_size: 1,
            ..settings(16)
        });
    }

    #[test]
    #[should_panic(expected = "does not fit in i32")]
    fn test_new_rejects_oversized_map() {
        VisTree::new(TreeSettings {
            num_levels: 15,
            chunk_size: 1 << 17,
            ..settings(16)
        });
    }

    #[test]
    fn test_new_accepts_largest_map() {
        let tree = VisTree::new(TreeSettings {
            num_levels: 15,
            chunk_size: 1 << 15,
            ..settings(16)
        });
        assert_eq!(tree.settings().map_dim(), 1 << 30);
    }

    #[test]
    fn test_traversal_purges_jobs_of_merged_nodes() {
        let mut tree = VisTree::new(settings(32));
        let mut pool = pool(8);
        let near = Vec2::ZERO;
        tree.traverse(&mut pool, near);
        let queued = tree.job_count();
        assert!(queued > 1);

        // Far away the whole tree collapses to the root, orphaning the leaf jobs.
        let stats = tree.traverse(&mut pool, Vec2::splat(1.0e6));
        assert_eq!(tree.live_node_count(), 1);
        assert!(stats.stale_jobs_dropped > 0);
        assert!(tree.job_count() <= tree.live_node_count());
        while let Some(job) = tree.pop_job() {
            assert!(tree.is_job_live(&job));
        }
    }
}
