//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level streamer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// LOD quadtree settings.
    pub lod: LodConfig,
    /// Geometry pool settings.
    pub pool: PoolConfig,
    /// Per-frame generation budget.
    pub streaming: StreamingConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// LOD quadtree configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Number of levels above the finest one. The root lives at this level.
    pub num_levels: u8,
    /// Side length of a level-0 chunk in voxels. Must be a power of two.
    pub chunk_size: u32,
    /// Largest screen-space error in pixels a node may have and still be drawn.
    pub pixel_tolerance: f32,
    /// Width of the display in pixels, used for the projection constant.
    pub display_width: u32,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Capacity of the node array.
    pub max_nodes: usize,
}

/// Geometry pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of mesh slots allocated at startup.
    pub geom_slots: usize,
}

/// Streaming budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Maximum number of generation jobs processed per frame.
    pub jobs_per_frame: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to the log directory in debug builds.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            num_levels: 5,
            chunk_size: 64,
            pixel_tolerance: 10.0,
            display_width: 1280,
            fov_y_degrees: 45.0,
            max_nodes: 2048,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { geom_slots: 256 }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { jobs_per_frame: 2 }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

/// Platform config directory for terra (`<config_dir>/terra`), if the OS exposes one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("terra"))
}

impl LodConfig {
    /// Side length of the whole map in voxels.
    pub fn map_dim(&self) -> u64 {
        u64::from(self.chunk_size) << self.num_levels
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Check that every value is usable by the quadtree and the pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lod = &self.lod;
        if lod.num_levels > 15 {
            return Err(invalid("lod.num_levels", format!("{} exceeds 15", lod.num_levels)));
        }
        if !lod.chunk_size.is_power_of_two() {
            return Err(invalid(
                "lod.chunk_size",
                format!("{} is not a power of two", lod.chunk_size),
            ));
        }
        if lod.map_dim() > i32::MAX as u64 {
            return Err(invalid(
                "lod.chunk_size",
                format!("map side {} does not fit in i32", lod.map_dim()),
            ));
        }
        if lod.max_nodes == 0 || lod.max_nodes > usize::from(u16::MAX) {
            return Err(invalid("lod.max_nodes", format!("{} not in 1..=65535", lod.max_nodes)));
        }
        if lod.pixel_tolerance.is_nan() || lod.pixel_tolerance <= 0.0 {
            return Err(invalid("lod.pixel_tolerance", "must be positive".to_string()));
        }
        if lod.fov_y_degrees.is_nan() || lod.fov_y_degrees <= 0.0 || lod.fov_y_degrees >= 180.0 {
            return Err(invalid("lod.fov_y_degrees", "must be in (0, 180)".to_string()));
        }
        if lod.display_width == 0 {
            return Err(invalid("lod.display_width", "must be positive".to_string()));
        }
        let slots = self.pool.geom_slots;
        if slots == 0 || slots > usize::from(u16::MAX) {
            return Err(invalid("pool.geom_slots", format!("{slots} not in 1..=65535")));
        }
        if self.streaming.jobs_per_frame == 0 {
            return Err(invalid("streaming.jobs_per_frame", "must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
