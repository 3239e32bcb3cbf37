use clap::Parser;

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
/// A config
pub struct Config {
    #[clap(long = "tiered-store-levels", value_name = "VALUE", default_value = "1")]
    /// The number of storage tiers
    pub levels: usize,
    #[clap(long = "level-alias", value_name = "VALUE")]
    /// Storage medium of each tier, fastest first: MEM, SSD, HDD
    pub level_alias: Vec<String>,
    #[clap(long = "level-dirs-path", value_name = "VALUE")]
    /// Comma separated directory paths of each tier
    pub level_dirs_path: Vec<String>,
    #[clap(long = "level-dirs-quota", value_name = "VALUE")]
    /// Comma separated directory capacities of each tier, e.g. `512MB,1GB`.
    /// The last one repeats for remaining paths
    pub level_dirs_quota: Vec<String>,
    #[clap(long = "evict-strategy", value_name = "VALUE", default_value = "lru")]
    /// Evict strategy: lru, largest
    pub evict_strategy: String,
    #[clap(flatten)]
    /// Log related config
    pub log: LogConfig,
}

#[derive(Debug, Parser)]
/// Log config
pub struct LogConfig {
    #[clap(long = "log-level", value_name = "VALUE", default_value = "info")]
    /// Log level: off, error, warn, info, debug, trace
    pub log_level: String,
    #[clap(long = "log-path", value_name = "VALUE")]
    /// Log file path, logs go to stderr if not set
    pub log_path: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::path::PathBuf;

    use tracing::level_filters::LevelFilter;

    use super::*;
    use crate::config::inner::InnerConfig;
    use crate::tiered::{EvictStrategy, StorageLevelAlias};

    #[test]
    fn test_default_config() {
        let args = vec![
            "tiered-store",
            "--level-alias",
            "MEM",
            "--level-dirs-path",
            "/mnt/ramdisk",
            "--level-dirs-quota",
            "1000",
        ];
        let config = Config::parse_from(args);
        assert_eq!(config.levels, 1);
        assert_eq!(config.evict_strategy, "lru");
        assert_eq!(config.log.log_level, "info");
        assert!(config.log.log_path.is_none());

        let inner_config: InnerConfig = config.try_into().unwrap();
        assert_eq!(inner_config.log_level, LevelFilter::INFO);
        let store = inner_config.store;
        assert_eq!(store.evict_strategy, EvictStrategy::Lru);
        assert_eq!(store.tiers.len(), 1);
        assert_eq!(store.tiers[0].alias, StorageLevelAlias::MEM);
        assert_eq!(store.tiers[0].dirs[0].path, PathBuf::from("/mnt/ramdisk"));
        assert_eq!(store.tiers[0].dirs[0].capacity_bytes, 1000);
    }

    #[test]
    fn test_two_level_config() {
        let args = vec![
            "tiered-store",
            "--tiered-store-levels",
            "2",
            "--level-alias",
            "MEM",
            "--level-alias",
            "HDD",
            "--level-dirs-path",
            "/mnt/ramdisk",
            "--level-dirs-path",
            "/disk1,/disk2,/disk3",
            "--level-dirs-quota",
            "1GB",
            "--level-dirs-quota",
            "4000,2KB",
            "--evict-strategy",
            "largest",
            "--log-level",
            "debug",
            "--log-path",
            "/tmp/tiered_store.log",
        ];
        let config: InnerConfig = Config::parse_from(args).try_into().unwrap();
        assert_eq!(config.log_level, LevelFilter::DEBUG);
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/tiered_store.log")));
        let store = config.store;
        assert_eq!(store.evict_strategy, EvictStrategy::LargestFirst);
        assert_eq!(store.tiers[0].dirs[0].capacity_bytes, 1024 * 1024 * 1024);
        let hdd = &store.tiers[1];
        assert_eq!(hdd.alias, StorageLevelAlias::HDD);
        let quotas: Vec<u64> = hdd.dirs.iter().map(|d| d.capacity_bytes).collect();
        // The last quota repeats.
        assert_eq!(quotas, vec![4000, 2048, 2048]);
        assert_eq!(hdd.dirs[2].path, PathBuf::from("/disk3"));
    }

    #[test]
    fn test_invalid_config() {
        let missing_level = vec![
            "tiered-store",
            "--tiered-store-levels",
            "2",
            "--level-alias",
            "MEM",
            "--level-dirs-path",
            "/mnt/ramdisk",
            "--level-dirs-quota",
            "1000",
        ];
        assert!(InnerConfig::try_from(Config::parse_from(missing_level)).is_err());

        let too_many_quotas = vec![
            "tiered-store",
            "--level-alias",
            "MEM",
            "--level-dirs-path",
            "/mnt/ramdisk",
            "--level-dirs-quota",
            "1000,2000",
        ];
        assert!(InnerConfig::try_from(Config::parse_from(too_many_quotas)).is_err());

        let bad_alias = vec![
            "tiered-store",
            "--level-alias",
            "TAPE",
            "--level-dirs-path",
            "/mnt/tape",
            "--level-dirs-quota",
            "1000",
        ];
        assert!(InnerConfig::try_from(Config::parse_from(bad_alias)).is_err());
    }
}
