//! Level-of-detail streaming core: the visibility quadtree, the fixed-capacity
//! geometry pool it drives, and the per-frame job driver connecting both to
//! the external voxel generator and mesher.

mod bounds;
mod driver;
mod error;
mod geom_pool;
mod job;
mod metric;
mod node;
mod vis_tree;

pub use bounds::{BoundsRect, NodeAddress};
pub use driver::{FrameDriver, FrameReport, GeomBaker, GeomMesher, MeshChunk, VoxelGenerator};
pub use error::LodError;
pub use geom_pool::{GeomParams, GeomPool, GeomSlot, SlotIndex};
pub use job::{ApplyOutcome, GeomGenJob};
pub use metric::ScreenErrorMetric;
pub use node::{GeomRef, LodNode, NUM_CHILDREN, NUM_GEOMS, NodeFlags, NodeIndex};
pub use vis_tree::{Cull, TraversalStats, TreeSettings, VisTree};
