//! The copy-on-write image handle.
//!
//! [`Image`] is a thin value referencing exactly one shared pixel store —
//! never null, falling back to the process-wide empty store. Cloning a handle
//! shares the store; every mutating operation detaches into private storage
//! first when the store is shared, so a write through one handle is never
//! observable through another.
//!
//! Mutating operations return `Result` and validate their arguments before
//! touching pixel memory: on error the visible content is unchanged.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use imgref::{ImgRef, ImgVec};
use rgb::{ComponentBytes, FromSlice, Rgba};
use tracing::trace;

use crate::buffer::{ImageKind, PixelBuffer};
use crate::error::ImageError;
use crate::format::PixelFormat;
use crate::loader::{LoadOptions, LoaderRegistry};
use crate::region::{Cuboid, Rect};
use crate::store::{empty_store, SharedPixelStore};

/// A shared, copy-on-write handle to multi-level pixel storage.
///
/// Cloning is cheap — clones reference the same store until one of them
/// mutates. [`ref_count`](Image::ref_count) exposes the current sharing
/// degree.
#[derive(Clone)]
pub struct Image {
    store: Arc<SharedPixelStore>,
}

impl Default for Image {
    /// An invalid image referencing the shared empty store.
    fn default() -> Self {
        Self {
            store: empty_store(),
        }
    }
}

impl Image {
    /// Alias for [`Image::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, privately owned image.
    ///
    /// `depth` is the logical depth: 1 for [`Flat`](ImageKind::Flat) and
    /// [`Cubemap`](ImageKind::Cubemap) images, the slice count for
    /// [`Volume`](ImageKind::Volume) images. Fails without allocating when
    /// dimensions, kind, or `level_count` are inconsistent — in particular
    /// when `level_count` exceeds
    /// [`PixelBuffer::max_level_count`] of the dimensions.
    pub fn create(
        kind: ImageKind,
        format: PixelFormat,
        width: u32,
        height: u32,
        depth: u32,
        level_count: u8,
    ) -> Result<Self, ImageError> {
        let buffer = PixelBuffer::new(kind, format, width, height, depth, level_count)?;
        Ok(Self::from(buffer))
    }

    /// Wrap a 2D RGBA8 pixel buffer from typed interchange data.
    pub fn from_rgba8(pixels: ImgVec<Rgba<u8>>) -> Result<Self, ImageError> {
        let (width, height) = (pixels.width() as u32, pixels.height() as u32);
        let mut buffer =
            PixelBuffer::new(ImageKind::Flat, PixelFormat::Rgba8, width, height, 1, 1)?;
        let (contiguous, _, _) = pixels.as_ref().to_contiguous_buf();
        buffer.update_level(contiguous.as_bytes(), 0)?;
        Ok(Self::from(buffer))
    }

    /// Borrow the base level as typed RGBA8 interchange data.
    ///
    /// `None` unless this is a valid flat RGBA8 image.
    pub fn base_level_rgba8(&self) -> Option<ImgRef<'_, Rgba<u8>>> {
        let buffer = self.store.buffer.as_ref()?;
        if buffer.kind() != ImageKind::Flat || buffer.format() != PixelFormat::Rgba8 {
            return None;
        }
        let bytes = buffer.level_bytes(0).ok()?;
        Some(imgref::Img::new(
            bytes.as_rgba(),
            buffer.width() as usize,
            buffer.height() as usize,
        ))
    }

    // --- Sharing ---

    /// Number of handles currently sharing this image's store.
    ///
    /// Invalid handles share the process-wide empty store (which the process
    /// itself keeps one reference to), so their count is at least 2.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.store)
    }

    /// Release the current store and return to the invalid default state.
    ///
    /// The pixel storage is destroyed once the last sharing handle lets go;
    /// the empty store itself is never destroyed.
    pub fn destroy(&mut self) {
        self.store = empty_store();
    }

    // --- Queries ---

    /// Whether this handle points at allocated pixel storage.
    pub fn is_valid(&self) -> bool {
        self.store.buffer.is_some()
    }

    pub fn kind(&self) -> Option<ImageKind> {
        self.store.buffer.as_ref().map(|b| b.kind())
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.store.buffer.as_ref().map(|b| b.format())
    }

    /// Base-level width, or 0 for an invalid image.
    pub fn width(&self) -> u32 {
        self.store.buffer.as_ref().map_or(0, |b| b.width())
    }

    /// Base-level height, or 0 for an invalid image.
    pub fn height(&self) -> u32 {
        self.store.buffer.as_ref().map_or(0, |b| b.height())
    }

    /// Base-level slice count (6 for cubemaps), or 0 for an invalid image.
    pub fn depth(&self) -> u32 {
        self.store.buffer.as_ref().map_or(0, |b| b.depth())
    }

    /// Number of allocated mip levels, or 0 for an invalid image.
    pub fn level_count(&self) -> u8 {
        self.store.buffer.as_ref().map_or(0, |b| b.level_count())
    }

    /// Longest mip chain this image's dimensions support.
    pub fn max_level(&self) -> u8 {
        self.store.buffer.as_ref().map_or(0, |b| b.max_level())
    }

    /// Total byte size across all levels.
    pub fn byte_size(&self) -> usize {
        self.store.buffer.as_ref().map_or(0, |b| b.byte_size())
    }

    /// Bytes per pixel; `None` for block-compressed formats and invalid
    /// images.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        self.format().and_then(|f| f.bytes_per_pixel())
    }

    pub fn is_compressed(&self) -> bool {
        self.format().is_some_and(|f| f.is_compressed())
    }

    pub fn is_cubemap(&self) -> bool {
        self.kind() == Some(ImageKind::Cubemap)
    }

    /// Dimensions of one mip level, `(width, height, slices)`.
    pub fn level_dimensions(&self, level: u8) -> Result<(u32, u32, u32), ImageError> {
        self.buffer()?.level_dimensions(level)
    }

    /// Byte size of one mip level.
    pub fn level_byte_size(&self, level: u8) -> Result<usize, ImageError> {
        self.buffer()?.level_byte_size(level)
    }

    /// Color of the base-level texel at `(x, y, z)`.
    pub fn pixel_color(&self, x: u32, y: u32, z: u32) -> Result<Rgba<u8>, ImageError> {
        self.buffer()?.pixel_color(x, y, z)
    }

    /// Read-only bytes of one mip level. Does not detach shared storage.
    pub fn pixels(&self, level: u8) -> Result<&[u8], ImageError> {
        self.buffer()?.level_bytes(level)
    }

    /// Mutable bytes of one mip level.
    ///
    /// Detaches shared storage first, since the returned slice permits
    /// mutation.
    pub fn pixels_mut(&mut self, level: u8) -> Result<&mut [u8], ImageError> {
        self.owned_buffer()?.level_bytes_mut(level)
    }

    /// Read-only bytes of the texel at `(x, y, z)` in the given level.
    pub fn pixel_bytes(&self, x: u32, y: u32, z: u32, level: u8) -> Result<&[u8], ImageError> {
        let buffer = self.buffer()?;
        let offset = buffer.pixel_offset(x, y, z, level)?;
        let bpp = buffer
            .format()
            .bytes_per_pixel()
            .ok_or(ImageError::UnsupportedOperation(
                "block-compressed formats only support whole-level operations",
            ))?;
        Ok(&buffer.level_bytes(level)?[offset..offset + bpp])
    }

    /// Mutable bytes of the texel at `(x, y, z)` in the given level.
    /// Detaches shared storage first.
    pub fn pixel_bytes_mut(
        &mut self,
        x: u32,
        y: u32,
        z: u32,
        level: u8,
    ) -> Result<&mut [u8], ImageError> {
        let buffer = self.owned_buffer()?;
        let offset = buffer.pixel_offset(x, y, z, level)?;
        let bpp = buffer
            .format()
            .bytes_per_pixel()
            .ok_or(ImageError::UnsupportedOperation(
                "block-compressed formats only support whole-level operations",
            ))?;
        Ok(&mut buffer.level_bytes_mut(level)?[offset..offset + bpp])
    }

    // --- Mutation (copy-on-write) ---

    /// Rewrite every level into `format`.
    ///
    /// A no-op when the format already matches — shared storage is not even
    /// detached.
    pub fn convert(&mut self, format: PixelFormat) -> Result<(), ImageError> {
        if self.format() == Some(format) {
            return Ok(());
        }
        self.owned_buffer()?.convert(format)
    }

    /// Copy a base-level region from `source` into this image at `dst`.
    pub fn copy_from(
        &mut self,
        source: &Image,
        src_region: Cuboid,
        dst: (u32, u32, u32),
    ) -> Result<(), ImageError> {
        let src = source.buffer()?;
        self.owned_buffer()?.copy_from(src, src_region, dst)
    }

    /// Fill every texel of every level with one color.
    pub fn fill(&mut self, color: Rgba<u8>) -> Result<(), ImageError> {
        self.owned_buffer()?.fill(color)
    }

    /// Fill a base-level rectangle on slice `z`.
    pub fn fill_rect(&mut self, color: Rgba<u8>, rect: Rect, z: u32) -> Result<(), ImageError> {
        self.owned_buffer()?.fill_rect(color, rect, z)
    }

    /// Fill a base-level box of texels.
    pub fn fill_cuboid(&mut self, color: Rgba<u8>, cuboid: Cuboid) -> Result<(), ImageError> {
        self.owned_buffer()?.fill_cuboid(color, cuboid)
    }

    /// Mirror every row of every level and slice.
    pub fn flip_horizontally(&mut self) -> Result<(), ImageError> {
        self.owned_buffer()?.flip_horizontally()
    }

    /// Mirror every column of every level and slice.
    pub fn flip_vertically(&mut self) -> Result<(), ImageError> {
        self.owned_buffer()?.flip_vertically()
    }

    /// Grow or shrink the mip chain to `count` levels.
    pub fn set_level_count(&mut self, count: u8) -> Result<(), ImageError> {
        self.owned_buffer()?.set_level_count(count)
    }

    /// Overwrite the base-level texel at `(x, y, z)`.
    pub fn set_pixel_color(
        &mut self,
        color: Rgba<u8>,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<(), ImageError> {
        self.owned_buffer()?.set_pixel_color(color, x, y, z)
    }

    /// Replace the whole content of one level. `bytes` must match the level
    /// byte size exactly.
    pub fn update(&mut self, bytes: &[u8], level: u8) -> Result<(), ImageError> {
        self.owned_buffer()?.update_level(bytes, level)
    }

    /// Replace a rectangle of one level slice from tightly packed rows.
    pub fn update_rect(
        &mut self,
        bytes: &[u8],
        rect: Rect,
        z: u32,
        level: u8,
    ) -> Result<(), ImageError> {
        self.owned_buffer()?.update_rect(bytes, rect, z, level)
    }

    /// Replace a box of one level from tightly packed rows.
    pub fn update_cuboid(
        &mut self,
        bytes: &[u8],
        cuboid: Cuboid,
        level: u8,
    ) -> Result<(), ImageError> {
        self.owned_buffer()?.update_cuboid(bytes, cuboid, level)
    }

    // --- Loading ---

    /// Decode a file through the registry and replace this image's content.
    ///
    /// The handle is untouched on failure.
    pub fn load_from_file(
        &mut self,
        registry: &LoaderRegistry,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<(), ImageError> {
        let buffer = registry.load_from_file(path.as_ref(), options)?;
        self.replace(buffer);
        Ok(())
    }

    /// Decode an in-memory encoded image and replace this image's content.
    ///
    /// The handle is untouched on failure.
    pub fn load_from_memory(
        &mut self,
        registry: &LoaderRegistry,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<(), ImageError> {
        let buffer = registry.load_from_memory(bytes, options)?;
        self.replace(buffer);
        Ok(())
    }

    /// Decode a stream and replace this image's content.
    ///
    /// The handle is untouched on failure.
    pub fn load_from_stream(
        &mut self,
        registry: &LoaderRegistry,
        reader: &mut dyn Read,
        options: &LoadOptions,
    ) -> Result<(), ImageError> {
        let buffer = registry.load_from_stream(reader, options)?;
        self.replace(buffer);
        Ok(())
    }

    // --- Internals ---

    fn buffer(&self) -> Result<&PixelBuffer, ImageError> {
        self.store
            .buffer
            .as_ref()
            .ok_or(ImageError::InvalidArgument("image has no pixel storage"))
    }

    /// The copy-on-write gate: detach into a private store when shared, then
    /// hand out the only mutable reference to the buffer.
    fn owned_buffer(&mut self) -> Result<&mut PixelBuffer, ImageError> {
        if self.store.buffer.is_none() {
            return Err(ImageError::InvalidArgument("image has no pixel storage"));
        }
        let shared = Arc::strong_count(&self.store) > 1;
        if shared {
            trace!(
                ref_count = Arc::strong_count(&self.store),
                "detaching shared pixel store before mutation"
            );
        }
        Arc::make_mut(&mut self.store)
            .buffer
            .as_mut()
            .ok_or(ImageError::InvalidArgument("image has no pixel storage"))
    }

    fn replace(&mut self, buffer: PixelBuffer) {
        self.store = Arc::new(SharedPixelStore {
            buffer: Some(buffer),
        });
    }
}

impl From<PixelBuffer> for Image {
    fn from(buffer: PixelBuffer) -> Self {
        let mut image = Image::default();
        image.replace(buffer);
        image
    }
}

impl core::fmt::Debug for Image {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.store.buffer.as_ref() {
            None => write!(f, "Image(empty)"),
            Some(b) => write!(
                f,
                "Image({:?} {} {}x{}x{}, {} levels, {} refs)",
                b.kind(),
                b.format(),
                b.width(),
                b.height(),
                b.depth(),
                b.level_count(),
                self.ref_count(),
            ),
        }
    }
}
