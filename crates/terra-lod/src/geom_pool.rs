//! Fixed-capacity pool of render-ready mesh slots.
//!
//! Every slot is created once at startup and recycled through a LIFO free
//! list, so meshing never allocates render resources mid-frame. Callers only
//! hold [`SlotIndex`] values; an index stops being meaningful the moment it is
//! freed and until it is handed out again by [`GeomPool::allocate`].

use std::fmt;

use glam::Vec3;

use crate::error::LodError;

/// Index of a slot in a [`GeomPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub u16);

impl SlotIndex {
    #[must_use]
    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-slot transform parameters, laid out for direct uniform upload.
///
/// Each vector is padded to 16 bytes; the `w` component is unused.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GeomParams {
    /// Scale from mesher-local units to world units.
    pub scale: [f32; 4],
    /// World translation of the chunk origin.
    pub translate: [f32; 4],
    /// Offset applied to texture coordinates.
    pub tex_translate: [f32; 4],
}

impl GeomParams {
    #[must_use]
    pub fn new(scale: Vec3, translate: Vec3, tex_translate: Vec3) -> Self {
        Self {
            scale: scale.extend(0.0).to_array(),
            translate: translate.extend(0.0).to_array(),
            tex_translate: tex_translate.extend(0.0).to_array(),
        }
    }

    #[must_use]
    pub fn scale(&self) -> Vec3 {
        Vec3::from_slice(&self.scale[..3])
    }

    #[must_use]
    pub fn translate(&self) -> Vec3 {
        Vec3::from_slice(&self.translate[..3])
    }
}

/// One pool entry: the opaque render handle plus what the mesher baked into it.
#[derive(Debug)]
pub struct GeomSlot<M> {
    /// Render resource owned by the slot for its whole lifetime.
    pub mesh: M,
    /// Number of quads currently stored in `mesh`.
    pub num_quads: u32,
    /// Transform parameters computed by the mesher.
    pub params: GeomParams,
}

/// Fixed-capacity mesh pool with a free-list allocator.
///
/// Invariant: every index in `0..capacity` is either in `free` or marked in
/// `live`, never both.
pub struct GeomPool<M> {
    slots: Vec<GeomSlot<M>>,
    /// Free slot indices, popped from the back.
    free: Vec<SlotIndex>,
    /// Per-slot liveness, for O(1) double-free detection.
    live: Vec<bool>,
}

impl<M> GeomPool<M> {
    /// Create a pool of `capacity` slots, building each render handle with `make_mesh`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a [`SlotIndex`].
    pub fn new(capacity: usize, mut make_mesh: impl FnMut(SlotIndex) -> M) -> Self {
        assert!(capacity > 0, "geometry pool needs at least one slot");
        assert!(
            capacity <= usize::from(u16::MAX),
            "geometry pool capacity {capacity} exceeds {}",
            u16::MAX
        );
        let slots = (0..capacity)
            .map(|i| GeomSlot {
                mesh: make_mesh(SlotIndex(i as u16)),
                num_quads: 0,
                params: GeomParams::default(),
            })
            .collect();
        let mut pool = Self {
            slots,
            free: Vec::with_capacity(capacity),
            live: vec![false; capacity],
        };
        pool.free_all();
        tracing::debug!(capacity, "created geometry pool");
        pool
    }

    /// Take a free slot. Its previous contents are stale and must be overwritten.
    pub fn allocate(&mut self) -> Result<SlotIndex, LodError> {
        let index = self.free.pop().ok_or(LodError::PoolExhausted)?;
        self.live[index.get()] = true;
        Ok(index)
    }

    /// Return a slot to the free list.
    pub fn free(&mut self, index: SlotIndex) -> Result<(), LodError> {
        debug_assert!(index.get() < self.live.len(), "free of out-of-range slot {index}");
        let Some(live) = self.live.get_mut(index.get()) else {
            return Err(LodError::SlotOutOfRange(index));
        };
        debug_assert!(*live, "double free of slot {index}");
        if !*live {
            tracing::warn!(%index, "double free of geometry slot ignored");
            return Err(LodError::DoubleFree(index));
        }
        *live = false;
        self.free.push(index);
        Ok(())
    }

    /// Return a slot to the free list, logging a warning if the index is bad.
    pub fn release(&mut self, index: SlotIndex) {
        if let Err(err) = self.free(index) {
            tracing::warn!(%index, %err, "failed to release geometry slot");
        }
    }

    /// Put every slot back into the free list, invalidating all outstanding indices.
    pub fn free_all(&mut self) {
        self.free.clear();
        // Reverse so that slot 0 is handed out first.
        self.free.extend((0..self.slots.len()).rev().map(|i| SlotIndex(i as u16)));
        self.live.fill(false);
    }

    /// Borrow a live slot, or `None` if the index is out of range or free.
    pub fn get(&self, index: SlotIndex) -> Option<&GeomSlot<M>> {
        if self.is_live(index) {
            self.slots.get(index.get())
        } else {
            None
        }
    }

    /// Mutably borrow a live slot, or `None` if the index is out of range or free.
    pub fn get_mut(&mut self, index: SlotIndex) -> Option<&mut GeomSlot<M>> {
        if self.is_live(index) {
            self.slots.get_mut(index.get())
        } else {
            None
        }
    }

    /// Checked access to a live slot.
    pub fn at(&self, index: SlotIndex) -> Result<&GeomSlot<M>, LodError> {
        self.check(index)?;
        Ok(&self.slots[index.get()])
    }

    /// Checked mutable access to a live slot.
    pub fn at_mut(&mut self, index: SlotIndex) -> Result<&mut GeomSlot<M>, LodError> {
        self.check(index)?;
        Ok(&mut self.slots[index.get()])
    }

    fn check(&self, index: SlotIndex) -> Result<(), LodError> {
        match self.live.get(index.get()) {
            None => Err(LodError::SlotOutOfRange(index)),
            Some(false) => Err(LodError::SlotNotLive(index)),
            Some(true) => Ok(()),
        }
    }

    pub fn is_live(&self, index: SlotIndex) -> bool {
        self.live.get(index.get()).copied().unwrap_or(false)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Indices of all allocated slots, in index order.
    pub fn live_slots(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter(|&(_, &live)| live)
            .map(|(i, _)| SlotIndex(i as u16))
    }
}
