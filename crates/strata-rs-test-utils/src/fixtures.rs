use std::fs;
use std::path::{Path, PathBuf};
use strata_rs_config::EnvSnapshot;

/// Write `contents` to `dir/name`, creating parent directories.
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("fixture dir");
    }
    fs::write(&path, contents).expect("fixture write");
    path
}

/// Hermetic environment built from literal pairs.
pub fn env_snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
    EnvSnapshot::from_pairs(pairs.iter().copied())
}
