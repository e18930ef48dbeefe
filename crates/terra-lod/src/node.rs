//! Quadtree node record stored in the [`VisTree`](crate::VisTree) node array.

use std::fmt;

use crate::geom_pool::SlotIndex;

/// Maximum number of geometry slots a leaf can reference.
pub const NUM_GEOMS: usize = 3;

/// Children per inner node.
pub const NUM_CHILDREN: usize = 4;

/// Index of a node in the [`VisTree`](crate::VisTree) node array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub u16);

impl NodeIndex {
    #[must_use]
    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Geometry reference held by a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GeomRef {
    /// Not generated yet.
    #[default]
    Pending,
    /// Generated and confirmed empty; never needs regeneration.
    Empty,
    /// Mesh stored in a pool slot.
    Slot(SlotIndex),
}

impl GeomRef {
    #[must_use]
    pub fn slot(self) -> Option<SlotIndex> {
        match self {
            GeomRef::Slot(slot) => Some(slot),
            _ => None,
        }
    }
}

/// Node state bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NodeFlags(u16);

impl NodeFlags {
    pub const NONE: Self = Self(0);
    /// A generation job for this node is queued or being processed.
    pub const GEN_IN_FLIGHT: Self = Self(1 << 0);
    /// Fully inside the view volume as of the last culled traversal.
    pub const CULL_INSIDE: Self = Self(1 << 1);
    /// Fully outside the view volume as of the last culled traversal.
    pub const CULL_OUTSIDE: Self = Self(1 << 2);

    pub const CULL_MASK: Self = Self(Self::CULL_INSIDE.0 | Self::CULL_OUTSIDE.0);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }
}

/// One quadtree node.
///
/// A node is a leaf iff it has no children; the four children are always
/// installed and cleared together. Leaves reference up to [`NUM_GEOMS`] mesh
/// slots; once a leaf's geometry arrives every entry is either a slot or
/// [`GeomRef::Empty`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LodNode {
    pub(crate) flags: NodeFlags,
    pub(crate) geoms: [GeomRef; NUM_GEOMS],
    pub(crate) children: Option<[NodeIndex; NUM_CHILDREN]>,
    /// Bumped on every allocate/split/merge; jobs carry it to detect staleness.
    pub(crate) generation: u32,
}

impl Default for LodNode {
    fn default() -> Self {
        Self {
            flags: NodeFlags::NONE,
            geoms: [GeomRef::Pending; NUM_GEOMS],
            children: None,
            generation: 0,
        }
    }
}

impl LodNode {
    /// Clear flags, geometry and children, and bump the generation.
    pub(crate) fn reset(&mut self) {
        self.flags = NodeFlags::NONE;
        self.geoms = [GeomRef::Pending; NUM_GEOMS];
        self.children = None;
        self.generation = self.generation.wrapping_add(1);
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[must_use]
    pub fn children(&self) -> Option<&[NodeIndex; NUM_CHILDREN]> {
        self.children.as_ref()
    }

    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[must_use]
    pub fn geoms(&self) -> &[GeomRef; NUM_GEOMS] {
        &self.geoms
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Geometry has not been generated yet.
    #[must_use]
    pub fn needs_geometry(&self) -> bool {
        self.geoms[0] == GeomRef::Pending
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.flags.contains(NodeFlags::GEN_IN_FLIGHT)
    }

    /// Generated, and every entry turned out empty.
    #[must_use]
    pub fn is_confirmed_empty(&self) -> bool {
        self.geoms.iter().all(|g| *g == GeomRef::Empty)
    }

    /// Pool slots currently referenced by this node.
    pub fn slots(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.geoms.iter().filter_map(|g| g.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_state_and_bumps_generation() {
        let mut node = LodNode {
            flags: NodeFlags::GEN_IN_FLIGHT,
            geoms: [GeomRef::Slot(SlotIndex(3)), GeomRef::Empty, GeomRef::Empty],
            children: Some([NodeIndex(1), NodeIndex(2), NodeIndex(3), NodeIndex(4)]),
            generation: 7,
        };
        node.reset();
        assert!(node.is_leaf());
        assert!(node.needs_geometry());
        assert!(!node.is_generating());
        assert_eq!(node.generation(), 8);
    }

    #[test]
    fn test_flags_insert_remove() {
        let mut flags = NodeFlags::NONE;
        flags.insert(NodeFlags::GEN_IN_FLIGHT);
        flags.insert(NodeFlags::CULL_INSIDE);
        assert!(flags.contains(NodeFlags::GEN_IN_FLIGHT));
        flags.remove(NodeFlags::CULL_MASK);
        assert!(!flags.contains(NodeFlags::CULL_INSIDE));
        assert_eq!(flags, NodeFlags::GEN_IN_FLIGHT);
    }

    #[test]
    fn test_slots_skip_sentinels() {
        let node = LodNode {
            geoms: [GeomRef::Slot(SlotIndex(5)), GeomRef::Slot(SlotIndex(9)), GeomRef::Empty],
            ..Default::default()
        };
        let slots: Vec<_> = node.slots().collect();
        assert_eq!(slots, vec![SlotIndex(5), SlotIndex(9)]);
        assert!(!node.is_confirmed_empty());
    }
}
