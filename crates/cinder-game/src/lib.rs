//! Game-side wiring of the destruction core.
//!
//! Everything engine-facing funnels through [`ActionGameFacade`]: physics
//! events in, replicated break streams and save payloads out.

use std::path::{Path, PathBuf};

use cinder_config::{CliArgs, Config, ConfigError};

pub mod connect;
pub mod facade;
pub mod fade;
pub mod throttle;

pub use connect::{
    ConnectOutcome, ConnectPhase, ConnectProbe, ConnectState, HostMigrationListener,
    ListenerStatus, STALE_CHANNEL_S,
};
pub use facade::{ActionGameFacade, MaterialFxProbe, material_fx_suppressed};
pub use fade::FadeEntityList;
pub use throttle::BreakageThrottling;

/// Load configuration, apply CLI overrides, and bring up logging.
pub fn bootstrap(args: &CliArgs, log_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let config_dir = args.config.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load_or_create(&config_dir)?;
    config.apply_cli_overrides(args);
    cinder_log::init_logging(log_dir, cfg!(debug_assertions), Some(&config));
    Ok(config)
}
