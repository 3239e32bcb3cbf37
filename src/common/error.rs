//! Tiered store error code

use std::path::PathBuf;

use thiserror::Error;

/// Tiered store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Tiered store error code
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error caused by std::io::Error
    #[error("IoErr, the error is {:?}, context is {:#?}", .source, .context)]
    IoErr {
        /// Error source
        source: std::io::Error,
        /// Context of the error
        context: Vec<String>,
    },

    /// Argument is invalid
    #[error("Argument is invalid, context is {:#?}", .context)]
    ArgumentInvalid {
        /// Context of the error
        context: Vec<String>,
    },

    /// The temp file of a block is missing when committing it
    #[error(
        "Temp file {:?} of block ID={} not found, context is {:#?}",
        .path, .block_id, .context
    )]
    TempFileNotFound {
        /// Block ID
        block_id: u64,
        /// Expected temp file path
        path: PathBuf,
        /// Context of the error
        context: Vec<String>,
    },

    /// The written size of a block is larger than the space allocated to it
    #[error(
        "Block ID={} has {} bytes written but only {} bytes allocated, context is {:#?}",
        .block_id, .actual, .allocated, .context
    )]
    BlockSizeExceeded {
        /// Block ID
        block_id: u64,
        /// Bytes allocated to the temp block
        allocated: u64,
        /// Bytes found in the temp file
        actual: u64,
        /// Context of the error
        context: Vec<String>,
    },

    /// Internal error
    #[error("Internal error, the error is {:?}, context is {:#?}", .source, .context)]
    Internal {
        /// Error source
        source: anyhow::Error,
        /// Context of the error
        context: Vec<String>,
    },
}

/// Add context to `StoreResult`
pub trait Context<T, E> {
    /// Add context to `StoreResult`
    fn add_context<C>(self, ctx: C) -> StoreResult<T>
    where
        C: Into<String>;

    /// Add context to `StoreResult` lazily
    fn with_context<C, F>(self, f: F) -> StoreResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> Context<T, E> for Result<T, E>
where
    E: Into<StoreError>,
{
    #[inline]
    fn add_context<C>(self, ctx: C) -> StoreResult<T>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().add_context(ctx))
    }

    #[inline]
    fn with_context<C, F>(self, f: F) -> StoreResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().add_context(f()))
    }
}

impl StoreError {
    /// Add context for `StoreError`
    #[must_use]
    #[inline]
    pub fn add_context<C>(mut self, ctx: C) -> Self
    where
        C: Into<String>,
    {
        macro_rules! append_context {
            ($context: ident, [$($target:ident),*]) => {
                match self {
                    $(Self::$target { ref mut context, ..} => {
                        context.push($context.into());
                    },)*
                }
            }
        }
        append_context!(
            ctx,
            [
                IoErr,
                ArgumentInvalid,
                TempFileNotFound,
                BlockSizeExceeded,
                Internal
            ]
        );
        self
    }

    /// Add context for `StoreError` lazily
    #[must_use]
    #[inline]
    pub fn with_context<C, F>(self, f: F) -> Self
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.add_context(f())
    }

    /// Build an `ArgumentInvalid` error from a single message
    #[must_use]
    #[inline]
    pub fn argument_invalid<C>(ctx: C) -> Self
    where
        C: Into<String>,
    {
        Self::ArgumentInvalid {
            context: vec![ctx.into()],
        }
    }
}

macro_rules! implement_from {
    ($source: path, $target: ident) => {
        impl From<$source> for StoreError {
            #[inline]
            fn from(error: $source) -> Self {
                Self::$target {
                    source: error,
                    context: vec![],
                }
            }
        }
    };
}
implement_from!(std::io::Error, IoErr);
implement_from!(anyhow::Error, Internal);
