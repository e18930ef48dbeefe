//! Geometry generation jobs queued by traversal and fulfilled by the frame driver.

use glam::Vec3;

use crate::bounds::BoundsRect;
use crate::node::NodeIndex;

/// Outstanding request to generate and mesh the volume under one leaf.
///
/// Owned by whoever dequeued it until the result is handed back through
/// [`VisTree::apply_geoms`](crate::VisTree::apply_geoms).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeomGenJob {
    pub node: NodeIndex,
    /// Node generation at queue time; a mismatch means the job is stale.
    pub generation: u32,
    pub level: u8,
    pub bounds: BoundsRect,
    pub scale: Vec3,
    pub translate: Vec3,
}

/// What [`VisTree::apply_geoms`](crate::VisTree::apply_geoms) did with a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Slots were installed into the node.
    Installed,
    /// The node was split, merged or recycled since the job was queued;
    /// the slots went back to the pool.
    Stale,
}
