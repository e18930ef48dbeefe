//! Error types for the LOD quadtree and geometry pool.

use crate::geom_pool::SlotIndex;
use crate::node::NodeIndex;

/// Errors reported by [`GeomPool`](crate::GeomPool) and [`VisTree`](crate::VisTree).
///
/// Exhaustion is recoverable: the affected job or split is retried by the next
/// traversal. The remaining variants are logic errors upstream; debug builds
/// assert on them, release builds leave state untouched and report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LodError {
    /// No free geometry slot left in the pool.
    #[error("geometry pool exhausted")]
    PoolExhausted,

    /// Not enough free nodes to split a leaf.
    #[error("node pool exhausted")]
    NodeExhausted,

    /// The slot was already in the free list.
    #[error("double free of geometry slot {0}")]
    DoubleFree(SlotIndex),

    /// The slot index is beyond the pool's capacity.
    #[error("geometry slot {0} out of range")]
    SlotOutOfRange(SlotIndex),

    /// The slot is currently free and its contents are invalid.
    #[error("geometry slot {0} is not allocated")]
    SlotNotLive(SlotIndex),

    /// Geometry was applied to a node that already holds geometry.
    #[error("node {0} already holds geometry")]
    GeomsAlreadyPresent(NodeIndex),

    /// The operation requires a leaf node.
    #[error("node {0} is not a leaf")]
    NotALeaf(NodeIndex),
}
