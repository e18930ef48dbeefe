//! Headless terrain streaming demo.
//!
//! Flies a viewer around a noise-generated heightfield and lets the LOD
//! quadtree refine, merge and stream geometry into a fixed mesh pool.
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p terra-demo -- --frames 600 --tolerance 4` for a finer map.

mod heightmap;
mod mesher;
mod view;

use std::process::ExitCode;

use clap::Parser;
use glam::Vec2;
use terra_config::{CliArgs, Config};
use terra_lod::{FrameDriver, FrameReport, GeomBaker, GeomPool, GeomSlot, MeshChunk, VisTree};
use tracing::{info, warn};

use crate::heightmap::{HeightmapGenerator, TerrainParams};
use crate::mesher::ColumnMesher;
use crate::view::{Orbit, ViewWedge};

/// Display aspect ratio assumed for the horizontal view wedge.
const ASPECT: f32 = 16.0 / 9.0;
/// Frames allowed after the flight for the queue to drain.
const SETTLE_FRAMES: u32 = 10_000;

/// Stand-in for a GPU upload: copies staged vertices into the slot's buffer.
#[derive(Default)]
struct CpuBaker {
    bytes: u64,
}

impl GeomBaker<Vec<u8>> for CpuBaker {
    fn bake(&mut self, slot: &mut GeomSlot<Vec<u8>>, chunk: &MeshChunk<'_>) {
        slot.mesh.clear();
        slot.mesh.extend_from_slice(chunk.vertices);
        self.bytes += chunk.vertices.len() as u64;
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let Some(config_dir) = args.config.clone().or_else(terra_config::default_config_dir) else {
        eprintln!("Failed to resolve config directory, pass --config");
        return ExitCode::FAILURE;
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let log_dir = config_dir.join("logs");
    terra_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    run(&config, args.frames);
    ExitCode::SUCCESS
}

fn run(config: &Config, frames: u32) {
    let lod = &config.lod;
    let mut tree = VisTree::from_config(lod);
    let mut pool = GeomPool::new(config.pool.geom_slots, |_| Vec::new());
    let mut driver = FrameDriver::from_config(
        &config.streaming,
        HeightmapGenerator::new(TerrainParams::default(), lod.chunk_size),
        ColumnMesher::new((lod.chunk_size as usize).pow(2) * 2),
        CpuBaker::default(),
    );

    let map_dim = tree.settings().map_dim() as f32;
    let orbit = Orbit {
        center: Vec2::splat(map_dim * 0.5),
        radius: map_dim / 3.0,
        period: frames.max(1),
    };
    let fov = lod.fov_y_degrees.to_radians();
    info!(
        map_dim,
        levels = lod.num_levels,
        geom_slots = pool.capacity(),
        max_nodes = lod.max_nodes,
        frames,
        "Starting terrain flight"
    );

    let mut totals = FrameReport::default();
    for frame in 0..frames {
        let viewer = orbit.position(frame);
        let wedge = ViewWedge::new(viewer, orbit.heading(frame), fov, ASPECT);
        let stats =
            tree.traverse_culled(&mut pool, viewer, |bounds, _level| wedge.classify(bounds));
        let report = driver.process_jobs(&mut tree, &mut pool);
        totals += report;

        if frame % 30 == 0 {
            info!(
                frame,
                viewer = ?viewer,
                drawn = stats.gathered,
                culled = stats.culled,
                splits = stats.splits,
                merges = stats.merges,
                queued = tree.job_count(),
                installed = report.installed,
                slots_free = pool.free_count(),
                "Frame"
            );
        }
    }

    // Hold the last position without culling until every job is served.
    let viewer = orbit.position(frames);
    let mut settle = 0;
    loop {
        tree.traverse(&mut pool, viewer);
        if tree.job_count() == 0 || settle == SETTLE_FRAMES {
            break;
        }
        let report = driver.process_jobs(&mut tree, &mut pool);
        totals += report;
        settle += 1;
    }
    if tree.job_count() > 0 {
        warn!(
            pending = tree.job_count(),
            "Queue did not drain, pool or node array too small"
        );
    }

    let quads: u64 = tree
        .drawable_slots()
        .filter_map(|slot| pool.get(slot))
        .map(|geom| u64::from(geom.num_quads))
        .sum();
    info!(
        settle_frames = settle,
        drawables = tree.drawables().len(),
        live_nodes = tree.live_node_count(),
        slots_in_use = pool.in_use_count(),
        quads_drawn = quads,
        volumes = driver.generator().volumes(),
        baked_bytes = driver.baker().bytes,
        "Converged"
    );
    info!(
        processed = totals.processed,
        installed = totals.installed,
        skipped_stale = totals.skipped_stale,
        stale_completions = totals.stale_completions,
        pool_exhausted = totals.pool_exhausted,
        pieces_dropped = totals.pieces_dropped,
        "Streaming totals"
    );
}
