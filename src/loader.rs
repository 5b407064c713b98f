//! Pluggable image decoders and the registry that dispatches them.
//!
//! Decoders are keyed two ways: by file extension and by content signature
//! (magic bytes). [`LoaderRegistry`] is explicit and explicitly initialized —
//! construct one at startup and [`register`](LoaderRegistry::register) the
//! decoders the application needs; there is no global decoder table.
//!
//! File loads consult the extension first and fall back to the signature
//! probe; memory and stream loads probe signatures only. On-disk formats are
//! entirely decoder business — this crate persists nothing itself.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::error::ImageError;
use crate::format::PixelFormat;

/// Options applied to a load operation.
///
/// # Example
///
/// ```
/// use pixcow::{LoadOptions, PixelFormat};
///
/// let options = LoadOptions::new()
///     .with_format(PixelFormat::Rgba8)
///     .with_level_count(4);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct LoadOptions {
    /// Target pixel format override. `None` keeps the decoder's native
    /// format.
    pub format: Option<PixelFormat>,
    /// Mip chain length to establish after decoding. `None` keeps whatever
    /// the decoder produced.
    pub level_count: Option<u8>,
}

impl LoadOptions {
    /// Defaults: keep the native format and decoded level count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert the decoded pixels into `format`.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Grow or shrink the decoded mip chain to `count` levels.
    pub fn with_level_count(mut self, count: u8) -> Self {
        self.level_count = Some(count);
        self
    }
}

/// A pluggable decoder for one encoded image format.
///
/// Implementations are registered with a [`LoaderRegistry`] and consulted by
/// the [`Image`](crate::Image) load operations. This trait is object-safe.
pub trait ImageDecoder: Send + Sync {
    /// Lowercase file extensions (without the dot) this decoder claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether `bytes` begin with this decoder's content signature.
    ///
    /// Must be cheap — a prefix check, not a parse.
    fn sniff(&self, bytes: &[u8]) -> bool;

    /// Decode the encoded bytes into a pixel buffer.
    ///
    /// Decoders may honor [`LoadOptions`] natively (e.g. decoding straight
    /// into the requested format); the registry applies any remaining
    /// overrides afterwards, so honoring them is an optimization, not an
    /// obligation.
    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<PixelBuffer, ImageError>;
}

/// An explicit set of decoders, consulted in registration order.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    decoders: Vec<Arc<dyn ImageDecoder>>,
}

impl LoaderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoder. Earlier registrations win when several match.
    pub fn register<D: ImageDecoder + 'static>(&mut self, decoder: D) {
        self.decoders.push(Arc::new(decoder));
    }

    /// Number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no decoder has been registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Find a decoder claiming `extension` (case-insensitive, no dot).
    pub fn decoder_for_extension(&self, extension: &str) -> Option<&dyn ImageDecoder> {
        let extension = extension.to_ascii_lowercase();
        self.decoders
            .iter()
            .find(|d| d.extensions().contains(&extension.as_str()))
            .map(|d| &**d)
    }

    /// Find the first decoder whose signature probe accepts `bytes`.
    pub fn decoder_for_content(&self, bytes: &[u8]) -> Option<&dyn ImageDecoder> {
        self.decoders.iter().find(|d| d.sniff(bytes)).map(|d| &**d)
    }

    /// Decode a file: extension lookup first, signature probe as fallback.
    pub fn load_from_file(
        &self,
        path: &Path,
        options: &LoadOptions,
    ) -> Result<PixelBuffer, ImageError> {
        let bytes = fs::read(path)?;
        let mut last_err = None;

        let by_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.decoder_for_extension(e));
        if let Some(decoder) = by_extension {
            match decoder.decode(&bytes, options) {
                Ok(buffer) => return self.finish(buffer, options),
                Err(err) => last_err = Some(err),
            }
        }
        if let Some(decoder) = self.decoder_for_content(&bytes) {
            match decoder.decode(&bytes, options) {
                Ok(buffer) => return self.finish(buffer, options),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| ImageError::load("no registered decoder recognizes the input")))
    }

    /// Decode in-memory encoded bytes via the signature probe.
    pub fn load_from_memory(
        &self,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<PixelBuffer, ImageError> {
        let decoder = self.decoder_for_content(bytes).ok_or_else(|| {
            ImageError::load("no registered decoder recognizes the content signature")
        })?;
        self.finish(decoder.decode(bytes, options)?, options)
    }

    /// Read a stream to its end and decode via the signature probe.
    pub fn load_from_stream(
        &self,
        reader: &mut dyn Read,
        options: &LoadOptions,
    ) -> Result<PixelBuffer, ImageError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.load_from_memory(&bytes, options)
    }

    /// Apply option overrides the decoder did not already honor.
    fn finish(
        &self,
        mut buffer: PixelBuffer,
        options: &LoadOptions,
    ) -> Result<PixelBuffer, ImageError> {
        if let Some(format) = options.format {
            buffer.convert(format)?;
        }
        if let Some(count) = options.level_count {
            buffer.set_level_count(count)?;
        }
        debug!(
            format = %buffer.format(),
            width = buffer.width(),
            height = buffer.height(),
            levels = buffer.level_count(),
            "decoded image"
        );
        Ok(buffer)
    }
}

impl core::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "LoaderRegistry({} decoders)", self.decoders.len())
    }
}
