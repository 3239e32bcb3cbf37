//! Common library

pub mod error;

/// Log related module
pub mod logger;
