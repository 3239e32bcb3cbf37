use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::common::error::{StoreError, StoreResult};
use crate::config::config::Config as SuperConfig;
use crate::tiered::{EvictStrategy, StorageLevelAlias};

/// Inner config struct
/// This struct is used to store the parsed config
/// and will be used to initialize the worker
#[derive(Clone, Debug)]
pub struct InnerConfig {
    /// Tiered store config
    pub store: TieredStoreConfig,
    /// Log level
    pub log_level: LevelFilter,
    /// Log file path
    pub log_path: Option<PathBuf>,
}

impl TryFrom<SuperConfig> for InnerConfig {
    type Error = StoreError;

    #[inline]
    fn try_from(value: SuperConfig) -> Result<Self, Self::Error> {
        let log_level = LevelFilter::from_str(value.log.log_level.as_str()).map_err(|e| {
            StoreError::argument_invalid(format!(
                "log level {} is invalid: {e}",
                value.log.log_level
            ))
        })?;
        let log_path = value.log.log_path.clone().map(PathBuf::from);
        let store = TieredStoreConfig::try_from(value)?;
        Ok(InnerConfig {
            store,
            log_level,
            log_path,
        })
    }
}

/// Tiered store config, immutable once the worker starts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredStoreConfig {
    /// Tiers, fastest first
    pub tiers: Vec<StorageTierConfig>,
    /// Evict strategy shared by all tiers
    pub evict_strategy: EvictStrategy,
}

/// Config of one tier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTierConfig {
    /// Storage medium
    pub alias: StorageLevelAlias,
    /// Directories in index order
    pub dirs: Vec<StorageDirConfig>,
}

/// Config of one directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDirConfig {
    /// Root folder
    pub path: PathBuf,
    /// Capacity in bytes
    pub capacity_bytes: u64,
}

impl TryFrom<SuperConfig> for TieredStoreConfig {
    type Error = StoreError;

    #[inline]
    fn try_from(value: SuperConfig) -> Result<Self, Self::Error> {
        let levels = value.levels;
        if levels == 0 {
            return Err(StoreError::argument_invalid(
                "tiered store needs at least one level",
            ));
        }
        for (name, len) in [
            ("level-alias", value.level_alias.len()),
            ("level-dirs-path", value.level_dirs_path.len()),
            ("level-dirs-quota", value.level_dirs_quota.len()),
        ] {
            if len != levels {
                return Err(StoreError::argument_invalid(format!(
                    "{name} is given {len} times for {levels} levels"
                )));
            }
        }

        let tiers = value
            .level_alias
            .iter()
            .zip(value.level_dirs_path.iter())
            .zip(value.level_dirs_quota.iter())
            .enumerate()
            .map(|(level, ((alias, paths), quotas))| {
                parse_tier(alias, paths, quotas)
                    .map_err(|e| e.add_context(format!("failed to parse level {level}")))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(TieredStoreConfig {
            tiers,
            evict_strategy: EvictStrategy::from_str(value.evict_strategy.as_str())?,
        })
    }
}

/// Parse one tier from its alias, comma separated paths and quotas.
fn parse_tier(alias: &str, paths: &str, quotas: &str) -> StoreResult<StorageTierConfig> {
    let alias = StorageLevelAlias::from_str(alias)?;
    let paths: Vec<&str> = split_list(paths);
    let quotas = split_list(quotas)
        .into_iter()
        .map(parse_space_size)
        .collect::<StoreResult<Vec<_>>>()?;
    if paths.is_empty() {
        return Err(StoreError::argument_invalid("no directory path is given"));
    }
    let Some(&last_quota) = quotas.last() else {
        return Err(StoreError::argument_invalid("no directory quota is given"));
    };
    if quotas.len() > paths.len() {
        return Err(StoreError::argument_invalid(format!(
            "{} quotas are given for {} paths",
            quotas.len(),
            paths.len()
        )));
    }
    let dirs = paths
        .iter()
        .enumerate()
        .map(|(i, path)| StorageDirConfig {
            path: PathBuf::from(path),
            capacity_bytes: quotas.get(i).copied().unwrap_or(last_quota),
        })
        .collect();
    Ok(StorageTierConfig { alias, dirs })
}

/// Split a comma separated list, dropping empty items.
fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a space size like `1000`, `4KB` or `0.5GB` into bytes.
/// Units are powers of 1024 and case insensitive.
#[inline]
pub fn parse_space_size(size: &str) -> StoreResult<u64> {
    let size = size.trim();
    let split = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let (number, unit) = size.split_at(split);
    let invalid = || StoreError::argument_invalid(format!("space size {size} is invalid"));

    let multiplier: u64 = match unit.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        "P" | "PB" => 1 << 50,
        _ => return Err(invalid()),
    };

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    let int_value = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<u64>().map_err(|_| invalid())?
    };
    let mut bytes = int_value.checked_mul(multiplier).ok_or_else(invalid)?;
    if !frac_part.is_empty() {
        let frac_value = frac_part.parse::<u64>().map_err(|_| invalid())?;
        let scale = u32::try_from(frac_part.len())
            .ok()
            .and_then(|len| 10_u64.checked_pow(len))
            .ok_or_else(invalid)?;
        let frac_bytes = frac_value
            .checked_mul(multiplier)
            .ok_or_else(invalid)?
            .checked_div(scale)
            .ok_or_else(invalid)?;
        bytes = bytes.checked_add(frac_bytes).ok_or_else(invalid)?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::parse_space_size;

    #[test]
    fn test_parse_space_size() {
        assert_eq!(parse_space_size("1000").ok(), Some(1000));
        assert_eq!(parse_space_size("4kb").ok(), Some(4096));
        assert_eq!(parse_space_size(" 2 MB ").ok(), Some(2 * 1024 * 1024));
        assert_eq!(parse_space_size("0.5GB").ok(), Some(512 * 1024 * 1024));
        assert_eq!(parse_space_size("1.25K").ok(), Some(1280));
        assert_eq!(parse_space_size("3B").ok(), Some(3));
        assert!(parse_space_size("").is_err());
        assert!(parse_space_size("GB").is_err());
        assert!(parse_space_size("12XB").is_err());
        assert!(parse_space_size("1.2.3GB").is_err());
        assert!(parse_space_size("99999999PB").is_err());
    }
}
