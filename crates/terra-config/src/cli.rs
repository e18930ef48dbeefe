//! Command-line argument parsing for the terra streamer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Terra command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "terra", about = "Voxel terrain LOD streamer")]
pub struct CliArgs {
    /// Number of quadtree levels above the finest one.
    #[arg(long)]
    pub levels: Option<u8>,

    /// Screen-space error tolerance in pixels.
    #[arg(long)]
    pub tolerance: Option<f32>,

    /// Number of geometry pool slots.
    #[arg(long)]
    pub geom_slots: Option<usize>,

    /// Generation jobs processed per frame.
    #[arg(long)]
    pub jobs_per_frame: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 240)]
    pub frames: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(levels) = args.levels {
            self.lod.num_levels = levels;
        }
        if let Some(tolerance) = args.tolerance {
            self.lod.pixel_tolerance = tolerance;
        }
        if let Some(slots) = args.geom_slots {
            self.pool.geom_slots = slots;
        }
        if let Some(jobs) = args.jobs_per_frame {
            self.streaming.jobs_per_frame = jobs;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overrides() -> CliArgs {
        CliArgs {
            levels: None,
            tolerance: None,
            geom_slots: None,
            jobs_per_frame: None,
            log_level: None,
            config: None,
            frames: 240,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            tolerance: Some(2.5),
            jobs_per_frame: Some(4),
            ..no_overrides()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.lod.pixel_tolerance, 2.5);
        assert_eq!(config.streaming.jobs_per_frame, 4);
        // Non-overridden fields retain defaults
        assert_eq!(config.lod.num_levels, 5);
        assert_eq!(config.pool.geom_slots, 256);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&no_overrides());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::try_parse_from(["terra", "--levels", "4", "--frames", "10"]).unwrap();
        assert_eq!(args.levels, Some(4));
        assert_eq!(args.frames, 10);
        assert!(args.config.is_none());
    }
}
