//! Column mesher: one top quad per land column plus walls where a neighbour is lower.

use terra_lod::{GeomGenJob, GeomMesher, GeomParams, MeshChunk};

use crate::heightmap::ColumnVolume;

/// Vertex written to the staging buffer, four per quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    /// Position in mesher-local units: cells along x and y, voxels along z.
    pub position: [f32; 3],
    /// Face direction: 0 up, then -x, +x, -y, +y.
    pub normal: u32,
}

const VERTICES_PER_QUAD: usize = 4;
/// Most quads a single column can emit.
const MAX_QUADS_PER_COLUMN: usize = 5;

/// Neighbour offsets with their face normal.
const WALLS: [(isize, isize, u32); 4] = [(-1, 0, 1), (1, 0, 2), (0, -1, 3), (0, 1, 4)];

/// Streams the quads of a [`ColumnVolume`] in chunks of bounded size.
pub struct ColumnMesher {
    max_quads: usize,
    volume: ColumnVolume,
    params: GeomParams,
    /// Next column to emit.
    cursor: usize,
    staging: Vec<QuadVertex>,
}

impl ColumnMesher {
    /// # Panics
    ///
    /// Panics if a chunk could not hold the output of a single column.
    pub fn new(max_quads: usize) -> Self {
        assert!(
            max_quads >= MAX_QUADS_PER_COLUMN,
            "chunk of {max_quads} quads cannot hold one column"
        );
        Self {
            max_quads,
            volume: ColumnVolume::default(),
            params: GeomParams::default(),
            cursor: 0,
            staging: Vec::with_capacity(max_quads * VERTICES_PER_QUAD),
        }
    }

    fn column_count(&self) -> usize {
        self.volume.side() * self.volume.side()
    }

    fn emit_column(&mut self, i: isize, j: isize) {
        let h = self.volume.height(i, j);
        if h <= 0 {
            return;
        }
        let (x, y, top) = (i as f32, j as f32, h as f32);
        self.push_quad(
            [[x, y, top], [x + 1.0, y, top], [x + 1.0, y + 1.0, top], [x, y + 1.0, top]],
            0,
        );

        for (dx, dy, normal) in WALLS {
            let neighbour = self.volume.height(i + dx, j + dy).max(0);
            if neighbour >= h {
                continue;
            }
            let bottom = neighbour as f32;
            // Edge shared with the neighbour, as two corners in the xy plane.
            let (a, b) = match (dx, dy) {
                (-1, _) => ([x, y + 1.0], [x, y]),
                (1, _) => ([x + 1.0, y], [x + 1.0, y + 1.0]),
                (_, -1) => ([x, y], [x + 1.0, y]),
                _ => ([x + 1.0, y + 1.0], [x, y + 1.0]),
            };
            self.push_quad(
                [
                    [a[0], a[1], bottom],
                    [b[0], b[1], bottom],
                    [b[0], b[1], top],
                    [a[0], a[1], top],
                ],
                normal,
            );
        }
    }

    fn push_quad(&mut self, corners: [[f32; 3]; 4], normal: u32) {
        self.staging.extend(
            corners
                .into_iter()
                .map(|position| QuadVertex { position, normal }),
        );
    }
}

impl GeomMesher<ColumnVolume> for ColumnMesher {
    fn start_volume(&mut self, volume: &ColumnVolume, job: &GeomGenJob) {
        self.volume.clone_from(volume);
        // Texture coordinates follow world position.
        self.params = GeomParams::new(job.scale, job.translate, job.translate);
        self.cursor = 0;
    }

    fn meshify(&mut self) -> MeshChunk<'_> {
        self.staging.clear();
        let side = self.volume.side();
        let total = self.column_count();
        let limit = (self.max_quads - MAX_QUADS_PER_COLUMN) * VERTICES_PER_QUAD;

        while self.cursor < total && self.staging.len() <= limit {
            let (i, j) = (self.cursor % side, self.cursor / side);
            self.emit_column(i as isize, j as isize);
            self.cursor += 1;
        }

        MeshChunk {
            vertices: bytemuck::cast_slice(&self.staging),
            num_quads: (self.staging.len() / VERTICES_PER_QUAD) as u32,
            params: self.params,
            volume_done: self.cursor >= total,
        }
    }
}
