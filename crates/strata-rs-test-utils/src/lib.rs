//! Test helpers shared across Strata crates.

pub mod fixtures;
pub mod validator;

pub use fixtures::{env_snapshot, write_fixture};
pub use validator::RecordingValidator;
