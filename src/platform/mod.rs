use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// `(device, inode)` pair identifying the file behind `meta`.
    /// Two paths with the same pair are the same file; a rotated log gets a new pair.
    fn file_identity(meta: &std::fs::Metadata) -> (u64, u64);

    /// Root data directory for errsight.
    /// Unix: `~/.errsight`, Windows: `%APPDATA%\errsight`.
    fn data_dir() -> PathBuf;
}

/// `ERRSIGHT_DATA_DIR` wins over the platform default so tests and
/// side-by-side installs can point at their own state.
pub(crate) fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var_os("ERRSIGHT_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
