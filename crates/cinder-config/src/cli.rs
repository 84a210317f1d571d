//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Destruction runtime command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "cinder", about = "Procedural destruction runtime")]
pub struct CliArgs {
    /// Broken-mesh memory ceiling in KB (0 disables eviction).
    #[arg(long)]
    pub mem_limit_kb: Option<u32>,

    /// Tree-break reuse distance in meters (0 disables reuse).
    #[arg(long)]
    pub tree_cut_reuse_dist: Option<f32>,

    /// World extent in meters for wire quantization.
    #[arg(long)]
    pub max_world_size: Option<f32>,

    /// Host-migration promote delay in seconds.
    #[arg(long)]
    pub host_migration_delay: Option<f32>,

    /// Draw the broken-mesh budget overlay.
    #[arg(long)]
    pub draw_broken_meshes: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(kb) = args.mem_limit_kb {
            self.breakage.mem_limit_kb = kb;
        }
        if let Some(dist) = args.tree_cut_reuse_dist {
            self.breakage.tree_cut_reuse_dist = dist;
        }
        if let Some(size) = args.max_world_size {
            self.network.max_world_size_m = size;
        }
        if let Some(delay) = args.host_migration_delay {
            self.network.host_migration_server_delay_s = delay;
        }
        if let Some(draw) = args.draw_broken_meshes {
            self.debug.draw_broken_meshes = draw;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            mem_limit_kb: Some(1500),
            tree_cut_reuse_dist: None,
            max_world_size: Some(2048.0),
            host_migration_delay: None,
            draw_broken_meshes: None,
            log_level: None,
            config: None,
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.breakage.mem_limit_kb, 1500);
        assert_eq!(config.network.max_world_size_m, 2048.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.breakage.tree_cut_reuse_dist, 0.4);
        assert_eq!(config.network.max_playbacks_per_frame, 10);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        let args = CliArgs {
            mem_limit_kb: None,
            tree_cut_reuse_dist: None,
            max_world_size: None,
            host_migration_delay: None,
            draw_broken_meshes: None,
            log_level: None,
            config: None,
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config, original);
    }
}
