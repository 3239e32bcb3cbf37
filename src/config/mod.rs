/// Configuration module. This module is used to parse configuration from command line arguments
mod config;
/// Inner configuration module. This module is used to store the parsed configuration
/// and will be used to initialize the worker
mod inner;

pub use config::{Config, LogConfig};
pub use inner::{
    parse_space_size, InnerConfig, StorageDirConfig, StorageTierConfig, TieredStoreConfig,
};
