use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::StoreError;

/// The storage medium class of a tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)] // Same spelling as the configuration values
pub enum StorageLevelAlias {
    /// Memory, usually a ramdisk
    MEM,
    /// Solid state disk
    SSD,
    /// Hard disk
    HDD,
}

impl StorageLevelAlias {
    /// Returns the string representation of the alias.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::MEM => "MEM",
            Self::SSD => "SSD",
            Self::HDD => "HDD",
        }
    }
}

impl FromStr for StorageLevelAlias {
    type Err = StoreError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MEM" => Ok(Self::MEM),
            "SSD" => Ok(Self::SSD),
            "HDD" => Ok(Self::HDD),
            _ => Err(StoreError::argument_invalid(format!(
                "storage level alias {s} is not supported"
            ))),
        }
    }
}

impl fmt::Display for StorageLevelAlias {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
