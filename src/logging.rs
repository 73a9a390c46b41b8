//! Tracing subscriber setup.
//!
//! The engine itself only emits `tracing` events (and routes user-facing
//! deprecations through [`crate::report::Reporter`]); embedding tools call
//! one of these helpers once at startup.

use std::fs::OpenOptions;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a stderr subscriber at the given maximum level.
pub fn init(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Install a file-backed subscriber (append mode, no ANSI colors).
pub fn init_to_file(level: Level, path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Best-effort init for tests; repeated calls are ignored.
pub fn init_for_tests() {
    let _ = init(Level::DEBUG);
}
