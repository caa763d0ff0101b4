use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize `tracing` to stderr. Respects `RUST_LOG`; falls back to
/// `default_level`.
pub fn init(default_level: &str) {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", default_level);
    }
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}

/// Initialize `tracing` into an append-mode log file instead of stderr.
///
/// Rotation is left to the process supervisor; the file handle lives for
/// the life of the process and is flushed on every event.
pub fn init_to_file(default_level: &str, path: &Path) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", default_level);
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::sync::Arc::new(file))
        .try_init();
    Ok(())
}
