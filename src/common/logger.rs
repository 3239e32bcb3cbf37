use std::path::Path;

use tracing::level_filters::LevelFilter as Level;
use tracing_subscriber::filter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

use super::error::{Context, StoreResult};

/// Initialize the logger.
/// Logs go to `log_path` when given, otherwise to stderr.
#[allow(clippy::let_underscore_must_use)]
#[inline]
pub fn init_logger(level: Level, log_path: Option<&Path>) -> StoreResult<()> {
    let filter = filter::Targets::new()
        .with_target("tiered_store::block::lock_manager", Level::WARN)
        .with_target("", level);

    let writer = match log_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter);

    let subscriber = tracing_subscriber::Registry::default().with(layer);

    if cfg!(test) {
        let _: Result<(), tracing::subscriber::SetGlobalDefaultError> =
            tracing::subscriber::set_global_default(subscriber);
    } else {
        tracing::subscriber::set_global_default(subscriber)
            .unwrap_or_else(|error| panic!("Could not set logger ,err {error}"));
    }
    Ok(())
}
