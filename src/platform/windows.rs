use std::path::{Path, PathBuf};

use super::{Platform, resolve_data_dir};

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn restrict_dir_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }

    fn restrict_file_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }

    fn file_identity(_meta: &std::fs::Metadata) -> (u64, u64) {
        // Stable std has no volume serial / file index accessor yet, so rotation
        // on Windows is detected through the size and mtime rules only.
        (0, 0)
    }

    fn data_dir() -> PathBuf {
        resolve_data_dir(
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("errsight"),
        )
    }
}
