//! 2D integer bounds of quadtree nodes and address-to-bounds conversion.

use glam::{Vec2, Vec3};

/// Axis-aligned integer rectangle, half-open: `x0 <= x < x1`, `y0 <= y < y1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundsRect {
    /// Minimum X (inclusive).
    pub x0: i32,
    /// Maximum X (exclusive).
    pub x1: i32,
    /// Minimum Y (inclusive).
    pub y0: i32,
    /// Maximum Y (exclusive).
    pub y1: i32,
}

impl BoundsRect {
    /// Create a rectangle. Degenerate rectangles are a logic error.
    #[must_use]
    pub fn new(x0: i32, x1: i32, y0: i32, y1: i32) -> Self {
        debug_assert!(x1 > x0 && y1 > y0, "empty bounds ({x0}..{x1}, {y0}..{y1})");
        Self { x0, x1, y0, y1 }
    }

    /// Square rectangle with its minimum corner at the origin.
    #[must_use]
    pub fn square(side: i32) -> Self {
        Self::new(0, side, 0, side)
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    /// Whether the integer point lies inside (half-open).
    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Nearest Euclidean distance from `p` to the rectangle, 0 if inside.
    ///
    /// The rectangle is treated as the closed region `[x0, x1] x [y0, y1]` so a
    /// viewer standing exactly on the far edge is at distance 0.
    #[must_use]
    pub fn distance_to(&self, p: Vec2) -> f32 {
        let dx = (self.x0 as f32 - p.x).max(p.x - self.x1 as f32).max(0.0);
        let dy = (self.y0 as f32 - p.y).max(p.y - self.y1 as f32).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }

    /// One of the four quadrants produced by exact bisection.
    ///
    /// Bit 0 of `index` selects the right half in X, bit 1 the lower half in Y.
    #[must_use]
    pub fn quadrant(&self, index: usize) -> Self {
        debug_assert!(index < 4, "quadrant index {index} out of range");
        debug_assert!(
            self.width() % 2 == 0 && self.height() % 2 == 0,
            "bisection of {self:?} is lossy"
        );
        let half_x = self.width() / 2;
        let half_y = self.height() / 2;
        let x0 = self.x0 + (index & 1) as i32 * half_x;
        let y0 = self.y0 + ((index >> 1) & 1) as i32 * half_y;
        Self::new(x0, x0 + half_x, y0, y0 + half_y)
    }

    /// All four quadrants in child order.
    #[must_use]
    pub fn quadrants(&self) -> [Self; 4] {
        [0, 1, 2, 3].map(|i| self.quadrant(i))
    }

    /// World translation of the rectangle's origin.
    #[must_use]
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.x0 as f32, self.y0 as f32, 0.0)
    }

    /// Scale from a level-0 chunk to this rectangle.
    #[must_use]
    pub fn scale(&self, chunk_size: u32) -> Vec3 {
        let s = chunk_size as f32;
        Vec3::new(self.width() as f32 / s, self.height() as f32 / s, 1.0)
    }
}

/// Position of a node in the tree: a level plus chunk coordinates at that level.
///
/// At level `L` the map is covered by `2^(num_levels - L)` nodes per axis, so
/// `x` and `y` range over `0..2^(num_levels - L)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub level: u8,
    pub x: u32,
    pub y: u32,
}

impl NodeAddress {
    #[must_use]
    pub fn new(level: u8, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// Address of the node at `level` covering the voxel position `(vx, vy)`.
    #[must_use]
    pub fn containing(level: u8, vx: i32, vy: i32, chunk_size: u32) -> Self {
        let dim = (chunk_size as i64) << level;
        Self {
            level,
            x: (i64::from(vx.max(0)) / dim) as u32,
            y: (i64::from(vy.max(0)) / dim) as u32,
        }
    }

    /// Bounds in voxels of the addressed node.
    #[must_use]
    pub fn bounds(&self, num_levels: u8, chunk_size: u32) -> BoundsRect {
        debug_assert!(self.level <= num_levels, "level {} above root", self.level);
        let dim = (chunk_size as i32) << self.level;
        let x0 = self.x as i32 * dim;
        let y0 = self.y as i32 * dim;
        BoundsRect::new(x0, x0 + dim, y0, y0 + dim)
    }

    /// Index of the child quadrant of the level-above node that contains this one.
    #[must_use]
    pub fn quadrant_in_parent(&self) -> usize {
        ((self.x & 1) | ((self.y & 1) << 1)) as usize
    }

    /// Address of the enclosing node one level up.
    #[must_use]
    pub fn parent(&self) -> Self {
        Self::new(self.level + 1, self.x >> 1, self.y >> 1)
    }
}
