//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Breakage budgets, throttles, and visual tuning.
    pub breakage: BreakageConfig,
    /// Replication and world quantization settings.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Breakage budgets, throttles, and visual tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakageConfig {
    /// Broken-mesh memory ceiling in kilobytes. 0 disables eviction.
    pub mem_limit_kb: u32,
    /// Seconds spawned debris stays solid before fading (multiplayer only).
    pub fade_delay_s: f32,
    /// Seconds the fade ramp takes once started.
    pub fade_time_s: f32,
    /// Maximum cut-parameter distance for reusing a recorded tree break.
    /// 0 disables reuse entirely.
    pub tree_cut_reuse_dist: f32,
    /// Broken-tree throttle: deny deform breaks while the counter exceeds this.
    pub tree_counter_max: u32,
    /// Added to the tree counter per deform break.
    pub tree_counter_inc: u32,
    /// Subtracted from the tree counter per frame.
    pub tree_counter_dec: u32,
    /// Added to the per-frame glass counter per pane break.
    pub glass_counter_inc: u32,
    /// Panes allowed to break per frame before auto-shatter is forced.
    pub max_panes_per_frame: u32,
    /// When > 0, overrides material pane timeouts with this base value.
    pub force_timeout_s: f32,
    /// Uniform random spread added on top of `force_timeout_s`.
    pub force_timeout_spread_s: f32,
}

/// Replication and world quantization settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// World extent in meters; bounds quantized positions on the wire.
    pub max_world_size_m: f32,
    /// World-space X offset subtracted before quantization.
    pub world_offset_x: f32,
    /// World-space Y offset subtracted before quantization.
    pub world_offset_y: f32,
    /// Grace period a promoted host waits before opening its listener.
    /// 0 promotes immediately.
    pub host_migration_server_delay_s: f32,
    /// Upper bound on streams buffered while waiting for playback.
    pub max_pending_streams: usize,
    /// Streams played back per frame at most.
    pub max_playbacks_per_frame: u32,
    /// Frames a recording stream stays open after its last event.
    pub recording_frames: u32,
    /// Frames a played-back stream lingers before closing.
    pub playback_frames: u32,
    /// Frames to retry entity resolution before dropping a stream.
    pub max_frames_to_find_entity: u32,
    /// Frames to wait on an out-of-order predecessor before forcing playback.
    pub max_frames_to_wait_dependency: u32,
    /// Seconds after level load before failed lookups count against streams.
    pub level_settle_time_s: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Draw broken-mesh budget overlay.
    pub draw_broken_meshes: bool,
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for BreakageConfig {
    fn default() -> Self {
        Self {
            mem_limit_kb: 0,
            fade_delay_s: 5.5,
            fade_time_s: 1.5,
            tree_cut_reuse_dist: 0.4,
            tree_counter_max: 0,
            tree_counter_inc: 0,
            tree_counter_dec: 0,
            glass_counter_inc: 1,
            max_panes_per_frame: 40,
            force_timeout_s: 0.0,
            force_timeout_spread_s: 10.0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_world_size_m: 4096.0,
            world_offset_x: 0.0,
            world_offset_y: 0.0,
            host_migration_server_delay_s: 0.0,
            max_pending_streams: 256,
            max_playbacks_per_frame: 10,
            recording_frames: 2,
            playback_frames: 5,
            max_frames_to_find_entity: 200,
            max_frames_to_wait_dependency: 200,
            level_settle_time_s: 15.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            draw_broken_meshes: false,
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::Unreadable)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::Malformed)?;
            tracing::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            tracing::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::Unwritable)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Unrepresentable)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::Unwritable)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::Unreadable)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::Malformed)?;

        if &new_config != self {
            tracing::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
