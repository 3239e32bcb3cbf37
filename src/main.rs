//! The tiered store worker.
//!
//! Parses the tier layout from the command line, lays out every storage
//! directory and reports the capacity of each tier.

use clap::Parser;
use tiered_store::common::logger::init_logger;
use tiered_store::config::{Config, InnerConfig};
use tiered_store::tiered::TierHierarchy;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = InnerConfig::try_from(Config::parse())?;

    init_logger(config.log_level, config.log_path.as_deref())?;

    let hierarchy = TierHierarchy::new(&config.store)?;
    hierarchy.initialize()?;

    for tier in hierarchy.tiers() {
        info!(
            "Tier {} ({}): {} dirs, {} of {} bytes used",
            tier.level(),
            tier.alias(),
            tier.storage_dirs().len(),
            tier.used_bytes(),
            tier.capacity_bytes()
        );
    }
    info!(
        "Tiered store ready, {} bytes in total",
        hierarchy.total_capacity_bytes()
    );
    Ok(())
}
