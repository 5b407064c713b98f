//! Error type for pixel storage operations.
//!
//! Every fallible operation in this crate returns [`ImageError`]. Operations
//! validate their arguments before touching pixel memory, so an `Err` always
//! means the image content is unchanged.

use thiserror::Error;

use crate::format::PixelFormat;

/// Errors from image and pixel buffer operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImageError {
    /// Bad dimensions, level index, region, or format/kind combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No per-texel conversion routine exists between the two formats.
    #[error("no conversion from {from:?} to {to:?}")]
    UnsupportedConversion {
        /// Format the pixels are currently in.
        from: PixelFormat,
        /// Requested target format.
        to: PixelFormat,
    },

    /// The operation is not defined for the current format.
    ///
    /// Block-compressed formats only support whole-level operations; anything
    /// requiring sub-block addressing lands here.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A decoder reported malformed or unreadable input, or the underlying
    /// I/O failed while loading.
    #[error("load failed: {0}")]
    Load(#[source] Box<dyn core::error::Error + Send + Sync>),

    /// A pixel allocation was refused by the allocator.
    #[error("allocation of {bytes} bytes failed")]
    OutOfMemory {
        /// Requested allocation size.
        bytes: usize,
    },
}

impl ImageError {
    /// Wrap a decoder or I/O failure as a [`Load`](ImageError::Load) error.
    pub fn load(source: impl Into<Box<dyn core::error::Error + Send + Sync>>) -> Self {
        ImageError::Load(source.into())
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::Load(Box::new(err))
    }
}
