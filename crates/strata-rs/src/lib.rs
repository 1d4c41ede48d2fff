//! Public SDK surface for Strata.
//!
//! This crate re-exports the resolution engine and provides a small
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use strata_rs_config as config;
pub use strata_rs_config::{
    ConfigError, ConfigLoader, ConfigTree, LoadError, LoadPolicy, ResolvedConfig, Source, load,
};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
