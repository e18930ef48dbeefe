//! Heightfield voxel generator backed by multi-octave simplex noise.

use noise::{NoiseFn, Simplex};
use terra_lod::{BoundsRect, VoxelGenerator};

/// Parameters of the fBm height function.
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u32,
    pub octaves: u32,
    /// Frequency of the broadest octave, in cycles per voxel.
    pub base_frequency: f64,
    /// Amplitude of the broadest octave, in voxels.
    pub amplitude: f64,
    /// Added to every sample; columns at or below zero are water and not meshed.
    pub base_height: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 7,
            octaves: 5,
            base_frequency: 1.0 / 2048.0,
            amplitude: 96.0,
            base_height: 24.0,
        }
    }
}

/// Column heights for one node, sampled on a `side x side` grid with a
/// one-sample border on every edge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnVolume {
    side: usize,
    /// Voxels per sample along each axis.
    step: i32,
    heights: Vec<i32>,
}

impl ColumnVolume {
    pub fn side(&self) -> usize {
        self.side
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Height of the column at `(i, j)`; `-1` and `side` address the border.
    pub fn height(&self, i: isize, j: isize) -> i32 {
        let stride = self.side + 2;
        let (x, y) = ((i + 1) as usize, (j + 1) as usize);
        self.heights[y * stride + x]
    }

    /// Whether every column lies at or below the water line.
    pub fn is_empty(&self) -> bool {
        self.heights.iter().all(|&h| h <= 0)
    }
}

/// Samples a [`ColumnVolume`] at the resolution matching a node's level.
pub struct HeightmapGenerator {
    noise: Simplex,
    params: TerrainParams,
    chunk_size: u32,
    volumes: usize,
}

impl HeightmapGenerator {
    pub fn new(params: TerrainParams, chunk_size: u32) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
            chunk_size,
            volumes: 0,
        }
    }

    /// Terrain height in voxels at world position `(x, y)`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = self.params.base_height;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, y * frequency]) * amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        total
    }

    /// Number of volumes generated so far.
    pub fn volumes(&self) -> usize {
        self.volumes
    }
}

impl VoxelGenerator for HeightmapGenerator {
    type Volume = ColumnVolume;

    fn generate(&mut self, bounds: &BoundsRect, level: u8) -> ColumnVolume {
        let side = self.chunk_size as usize;
        let step = 1i32 << level;
        let stride = side + 2;

        let mut heights = Vec::with_capacity(stride * stride);
        for j in -1..=side as i32 {
            for i in -1..=side as i32 {
                // Sample at the centre of each coarse cell.
                let x = f64::from(bounds.x0 + i * step) + f64::from(step) * 0.5;
                let y = f64::from(bounds.y0 + j * step) + f64::from(step) * 0.5;
                heights.push(self.sample(x, y).round() as i32);
            }
        }
        self.volumes += 1;

        ColumnVolume {
            side,
            step,
            heights,
        }
    }
}
