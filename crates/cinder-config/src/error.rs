//! Failure modes of the `config.ron` pipeline.

/// Errors raised while loading or persisting the destruction config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `config.ron` exists but could not be read.
    #[error("unable to read config.ron: {0}")]
    Unreadable(#[source] std::io::Error),

    /// The config directory or `config.ron` could not be written.
    #[error("unable to write config.ron: {0}")]
    Unwritable(#[source] std::io::Error),

    /// The file is not valid RON for the breakage/network/debug sections.
    #[error("malformed config.ron: {0}")]
    Malformed(#[source] ron::error::SpannedError),

    /// The in-memory config could not be rendered back to RON.
    #[error("config not representable as RON: {0}")]
    Unrepresentable(#[source] ron::Error),
}
