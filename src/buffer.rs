//! Raw multi-level, multi-layer pixel storage.
//!
//! [`PixelBuffer`] owns one byte allocation per mip level and knows how to
//! address, fill, copy, convert, and flip texels inside them. It has no
//! sharing semantics of its own — exactly one shared store owns a buffer at
//! a time, and the [`Image`](crate::Image) handle layers copy-on-write on
//! top.
//!
//! All fallible operations validate their arguments completely before the
//! first write, so a returned error means the buffer content is unchanged.

use rgb::Rgba;

use crate::error::ImageError;
use crate::format::PixelFormat;
use crate::region::{Cuboid, Rect};

/// Number of faces a cubemap stores per level, as depth slices.
const CUBEMAP_FACES: u32 = 6;

/// Storage topology of an image.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// A single 2D pixel plane.
    Flat,
    /// Six square faces stored as depth slices; faces never mip away.
    Cubemap,
    /// A 3D volume whose depth shrinks along the mip chain.
    Volume,
}

/// Multi-level, multi-layer pixel storage for one image.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    kind: ImageKind,
    format: PixelFormat,
    width: u32,
    height: u32,
    /// Base-level slice count: 1 for flat, 6 for cubemaps, the logical depth
    /// for volumes.
    depth: u32,
    levels: Vec<Box<[u8]>>,
}

impl PixelBuffer {
    /// Allocate zero-filled storage.
    ///
    /// `depth` is the logical depth: it must be 1 for [`Flat`](ImageKind::Flat)
    /// and [`Cubemap`](ImageKind::Cubemap) images (cubemap faces are implicit)
    /// and is the slice count for [`Volume`](ImageKind::Volume) images.
    /// Cubemap faces must be square. `level_count` must be between 1 and
    /// [`max_level_count`](Self::max_level_count) of the dimensions.
    pub fn new(
        kind: ImageKind,
        format: PixelFormat,
        width: u32,
        height: u32,
        depth: u32,
        level_count: u8,
    ) -> Result<Self, ImageError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(ImageError::InvalidArgument("dimensions must be non-zero"));
        }
        match kind {
            ImageKind::Flat | ImageKind::Cubemap if depth != 1 => {
                return Err(ImageError::InvalidArgument(
                    "only volume images take a depth greater than 1",
                ));
            }
            ImageKind::Cubemap if width != height => {
                return Err(ImageError::InvalidArgument("cubemap faces must be square"));
            }
            _ => {}
        }
        if level_count == 0 {
            return Err(ImageError::InvalidArgument("level count must be at least 1"));
        }
        if level_count > Self::max_level_count(width, height, depth) {
            return Err(ImageError::InvalidArgument(
                "level count exceeds the usable mip chain",
            ));
        }

        let storage_depth = match kind {
            ImageKind::Cubemap => CUBEMAP_FACES,
            _ => depth,
        };
        let mut buffer = Self {
            kind,
            format,
            width,
            height,
            depth: storage_depth,
            levels: Vec::new(),
        };
        let mut levels = Vec::with_capacity(level_count as usize);
        for level in 0..level_count {
            let (w, h, d) = buffer.level_extent(level);
            levels.push(alloc_zeroed(level_size(format, w, h, d)?)?);
        }
        buffer.levels = levels;
        Ok(buffer)
    }

    /// Length of the longest useful mip chain for the given base dimensions:
    /// `floor(log2(max(width, height, depth))) + 1`.
    ///
    /// `max_level_count(256, 256, 1) == 9`.
    pub const fn max_level_count(width: u32, height: u32, depth: u32) -> u8 {
        let largest = if width >= height { width } else { height };
        let largest = if largest >= depth { largest } else { depth };
        (u32::BITS - largest.leading_zeros()) as u8
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Base-level width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Base-level height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Base-level slice count (6 for cubemaps).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of allocated mip levels.
    pub fn level_count(&self) -> u8 {
        self.levels.len() as u8
    }

    /// Longest mip chain these dimensions support. Cubemap face count does
    /// not extend the chain — only volume depth mips.
    pub fn max_level(&self) -> u8 {
        let depth = match self.kind {
            ImageKind::Volume => self.depth,
            _ => 1,
        };
        Self::max_level_count(self.width, self.height, depth)
    }

    /// Dimensions of one mip level, `(width, height, slices)`.
    pub fn level_dimensions(&self, level: u8) -> Result<(u32, u32, u32), ImageError> {
        self.check_level(level)?;
        Ok(self.level_extent(level))
    }

    /// Byte size of one mip level.
    pub fn level_byte_size(&self, level: u8) -> Result<usize, ImageError> {
        Ok(self.level_bytes(level)?.len())
    }

    /// Total byte size across all levels.
    pub fn byte_size(&self) -> usize {
        self.levels.iter().map(|l| l.len()).sum()
    }

    /// Raw bytes of one mip level.
    pub fn level_bytes(&self, level: u8) -> Result<&[u8], ImageError> {
        self.check_level(level)?;
        Ok(&self.levels[level as usize])
    }

    /// Mutable raw bytes of one mip level.
    pub fn level_bytes_mut(&mut self, level: u8) -> Result<&mut [u8], ImageError> {
        self.check_level(level)?;
        Ok(&mut self.levels[level as usize])
    }

    /// Byte offset of the texel at `(x, y, z)` within the given level.
    ///
    /// Only defined for uncompressed formats.
    pub fn pixel_offset(&self, x: u32, y: u32, z: u32, level: u8) -> Result<usize, ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        let (w, h, d) = self.level_dimensions(level)?;
        if x >= w || y >= h || z >= d {
            return Err(ImageError::InvalidArgument(
                "pixel coordinates outside level bounds",
            ));
        }
        Ok(((z as usize * h as usize + y as usize) * w as usize + x as usize) * bpp)
    }

    /// Color of the base-level texel at `(x, y, z)`.
    pub fn pixel_color(&self, x: u32, y: u32, z: u32) -> Result<Rgba<u8>, ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        let offset = self.pixel_offset(x, y, z, 0)?;
        let texel = self.format.decode_texel(&self.levels[0][offset..offset + bpp]);
        Ok(texel_to_color(texel))
    }

    /// Overwrite the base-level texel at `(x, y, z)`.
    pub fn set_pixel_color(
        &mut self,
        color: Rgba<u8>,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<(), ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        let offset = self.pixel_offset(x, y, z, 0)?;
        self.format
            .encode_texel(color_to_texel(color), &mut self.levels[0][offset..offset + bpp]);
        Ok(())
    }

    /// Fill every texel of every level with one color.
    pub fn fill(&mut self, color: Rgba<u8>) -> Result<(), ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        let mut texel = [0u8; 16];
        let texel = &mut texel[..bpp];
        self.format.encode_texel(color_to_texel(color), texel);
        for level in &mut self.levels {
            for chunk in level.chunks_exact_mut(bpp) {
                chunk.copy_from_slice(texel);
            }
        }
        Ok(())
    }

    /// Fill a base-level rectangle on slice `z`.
    pub fn fill_rect(&mut self, color: Rgba<u8>, rect: Rect, z: u32) -> Result<(), ImageError> {
        self.fill_cuboid(color, Cuboid::from_rect(rect, z))
    }

    /// Fill a base-level box of texels.
    pub fn fill_cuboid(&mut self, color: Rgba<u8>, cuboid: Cuboid) -> Result<(), ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        let (w, h, d) = self.level_extent(0);
        if !cuboid.fits_within(w, h, d) {
            return Err(ImageError::InvalidArgument(
                "fill region exceeds level bounds",
            ));
        }
        let mut texel = [0u8; 16];
        let texel = &mut texel[..bpp];
        self.format.encode_texel(color_to_texel(color), texel);
        let level = &mut self.levels[0];
        for z in cuboid.z..cuboid.z + cuboid.depth {
            for y in cuboid.y..cuboid.y + cuboid.height {
                let row =
                    ((z as usize * h as usize + y as usize) * w as usize + cuboid.x as usize) * bpp;
                for chunk in level[row..row + cuboid.width as usize * bpp].chunks_exact_mut(bpp) {
                    chunk.copy_from_slice(texel);
                }
            }
        }
        Ok(())
    }

    /// Copy a base-level region from `source` into this buffer at `dst`.
    ///
    /// Byte-for-byte when formats match; otherwise the source region is
    /// converted texel by texel. Block-compressed content can only be copied
    /// between identical formats and whole identical levels.
    pub fn copy_from(
        &mut self,
        source: &PixelBuffer,
        src_region: Cuboid,
        dst: (u32, u32, u32),
    ) -> Result<(), ImageError> {
        if self.format.is_compressed() || source.format.is_compressed() {
            return self.copy_whole_compressed(source, src_region, dst);
        }

        let (sw, sh, sd) = source.level_extent(0);
        if !src_region.fits_within(sw, sh, sd) {
            return Err(ImageError::InvalidArgument(
                "source region exceeds level bounds",
            ));
        }
        let dst_region = Cuboid::new(
            dst.0,
            dst.1,
            dst.2,
            src_region.width,
            src_region.height,
            src_region.depth,
        );
        let (dw, dh, dd) = self.level_extent(0);
        if !dst_region.fits_within(dw, dh, dd) {
            return Err(ImageError::InvalidArgument(
                "destination region exceeds level bounds",
            ));
        }

        let src_bpp = source.require_per_pixel_layout()?;
        let dst_bpp = self.require_per_pixel_layout()?;
        let src_level = &source.levels[0];
        let dst_level = &mut self.levels[0];
        for z in 0..src_region.depth {
            for y in 0..src_region.height {
                let src_row = ((src_region.z + z) as usize * sh as usize
                    + (src_region.y + y) as usize)
                    * sw as usize
                    + src_region.x as usize;
                let dst_row = ((dst.2 + z) as usize * dh as usize + (dst.1 + y) as usize)
                    * dw as usize
                    + dst.0 as usize;
                if self.format == source.format {
                    let len = src_region.width as usize * src_bpp;
                    dst_level[dst_row * dst_bpp..dst_row * dst_bpp + len]
                        .copy_from_slice(&src_level[src_row * src_bpp..src_row * src_bpp + len]);
                } else {
                    for x in 0..src_region.width as usize {
                        let s = (src_row + x) * src_bpp;
                        let d = (dst_row + x) * dst_bpp;
                        let texel = source.format.decode_texel(&src_level[s..s + src_bpp]);
                        self.format.encode_texel(texel, &mut dst_level[d..d + dst_bpp]);
                    }
                }
            }
        }
        Ok(())
    }

    /// Rewrite every level into `format`.
    ///
    /// A no-op when the format already matches. Fails without touching the
    /// buffer when either side lacks a converter.
    pub fn convert(&mut self, format: PixelFormat) -> Result<(), ImageError> {
        if format == self.format {
            return Ok(());
        }
        // A format has a texel codec exactly when it has a per-pixel layout.
        let (Some(src_bpp), Some(dst_bpp)) =
            (self.format.bytes_per_pixel(), format.bytes_per_pixel())
        else {
            return Err(ImageError::UnsupportedConversion {
                from: self.format,
                to: format,
            });
        };

        let mut converted = Vec::with_capacity(self.levels.len());
        for level in 0..self.level_count() {
            let (w, h, d) = self.level_extent(level);
            let mut out = alloc_zeroed(level_size(format, w, h, d)?)?;
            let src = &self.levels[level as usize];
            for (src_texel, dst_texel) in
                src.chunks_exact(src_bpp).zip(out.chunks_exact_mut(dst_bpp))
            {
                format.encode_texel(self.format.decode_texel(src_texel), dst_texel);
            }
            converted.push(out);
        }
        self.levels = converted;
        self.format = format;
        Ok(())
    }

    /// Mirror every row of every level and slice.
    pub fn flip_horizontally(&mut self) -> Result<(), ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        for level in 0..self.level_count() {
            let (w, h, d) = self.level_extent(level);
            let level = &mut self.levels[level as usize];
            let row_len = w as usize * bpp;
            for row_index in 0..(h as usize * d as usize) {
                let row = &mut level[row_index * row_len..(row_index + 1) * row_len];
                for x in 0..w as usize / 2 {
                    let (a, b) = (x * bpp, (w as usize - 1 - x) * bpp);
                    for k in 0..bpp {
                        row.swap(a + k, b + k);
                    }
                }
            }
        }
        Ok(())
    }

    /// Mirror every column of every level and slice.
    pub fn flip_vertically(&mut self) -> Result<(), ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        for level in 0..self.level_count() {
            let (w, h, d) = self.level_extent(level);
            let level = &mut self.levels[level as usize];
            let row_len = w as usize * bpp;
            let slice_len = row_len * h as usize;
            for z in 0..d as usize {
                let slice = &mut level[z * slice_len..(z + 1) * slice_len];
                for y in 0..h as usize / 2 {
                    let (head, tail) = slice.split_at_mut((h as usize - 1 - y) * row_len);
                    head[y * row_len..(y + 1) * row_len].swap_with_slice(&mut tail[..row_len]);
                }
            }
        }
        Ok(())
    }

    /// Grow or shrink the mip chain to `count` levels.
    ///
    /// Levels below `min(old, new)` keep their content; added levels are
    /// zero-filled; removed levels are discarded.
    pub fn set_level_count(&mut self, count: u8) -> Result<(), ImageError> {
        if count == 0 {
            return Err(ImageError::InvalidArgument("level count must be at least 1"));
        }
        if count > self.max_level() {
            return Err(ImageError::InvalidArgument(
                "level count exceeds the usable mip chain",
            ));
        }
        let current = self.level_count();
        if count <= current {
            self.levels.truncate(count as usize);
            return Ok(());
        }
        let mut added = Vec::with_capacity((count - current) as usize);
        for level in current..count {
            let (w, h, d) = self.level_extent(level);
            added.push(alloc_zeroed(level_size(self.format, w, h, d)?)?);
        }
        self.levels.append(&mut added);
        Ok(())
    }

    /// Replace the whole content of one level.
    ///
    /// `bytes` must match the level byte size exactly. This is the one write
    /// path that works for block-compressed formats, since the caller
    /// supplies pre-encoded content.
    pub fn update_level(&mut self, bytes: &[u8], level: u8) -> Result<(), ImageError> {
        let target = self.level_bytes_mut(level)?;
        if bytes.len() != target.len() {
            return Err(ImageError::InvalidArgument(
                "pixel data length must match the level byte size",
            ));
        }
        target.copy_from_slice(bytes);
        Ok(())
    }

    /// Replace a rectangle of one level slice from tightly packed rows.
    pub fn update_rect(
        &mut self,
        bytes: &[u8],
        rect: Rect,
        z: u32,
        level: u8,
    ) -> Result<(), ImageError> {
        self.update_cuboid(bytes, Cuboid::from_rect(rect, z), level)
    }

    /// Replace a box of one level from tightly packed rows.
    pub fn update_cuboid(
        &mut self,
        bytes: &[u8],
        cuboid: Cuboid,
        level: u8,
    ) -> Result<(), ImageError> {
        let bpp = self.require_per_pixel_layout()?;
        let (w, h, d) = self.level_dimensions(level)?;
        if !cuboid.fits_within(w, h, d) {
            return Err(ImageError::InvalidArgument(
                "update region exceeds level bounds",
            ));
        }
        let expected = usize::try_from(cuboid.pixel_count())
            .ok()
            .and_then(|px| px.checked_mul(bpp))
            .ok_or(ImageError::InvalidArgument("update region overflows"))?;
        if bytes.len() != expected {
            return Err(ImageError::InvalidArgument(
                "pixel data length must match the update region",
            ));
        }
        let level = &mut self.levels[level as usize];
        let row_len = cuboid.width as usize * bpp;
        for z_off in 0..cuboid.depth as usize {
            for y_off in 0..cuboid.height as usize {
                let src = (z_off * cuboid.height as usize + y_off) * row_len;
                let dst = (((cuboid.z as usize + z_off) * h as usize
                    + cuboid.y as usize
                    + y_off)
                    * w as usize
                    + cuboid.x as usize)
                    * bpp;
                level[dst..dst + row_len].copy_from_slice(&bytes[src..src + row_len]);
            }
        }
        Ok(())
    }

    /// Extent of a level, without validating the level index.
    fn level_extent(&self, level: u8) -> (u32, u32, u32) {
        let w = (self.width >> level).max(1);
        let h = (self.height >> level).max(1);
        let d = match self.kind {
            ImageKind::Volume => (self.depth >> level).max(1),
            _ => self.depth,
        };
        (w, h, d)
    }

    fn check_level(&self, level: u8) -> Result<(), ImageError> {
        if level as usize >= self.levels.len() {
            return Err(ImageError::InvalidArgument("level index out of range"));
        }
        Ok(())
    }

    fn require_per_pixel_layout(&self) -> Result<usize, ImageError> {
        self.format.bytes_per_pixel().ok_or(ImageError::UnsupportedOperation(
            "block-compressed formats only support whole-level operations",
        ))
    }

    fn copy_whole_compressed(
        &mut self,
        source: &PixelBuffer,
        src_region: Cuboid,
        dst: (u32, u32, u32),
    ) -> Result<(), ImageError> {
        let (sw, sh, sd) = source.level_extent(0);
        let whole_source = src_region == Cuboid::new(0, 0, 0, sw, sh, sd);
        let whole_dest = dst == (0, 0, 0) && self.level_extent(0) == (sw, sh, sd);
        if self.format != source.format || !whole_source || !whole_dest {
            return Err(ImageError::UnsupportedOperation(
                "block-compressed copies must cover a whole level of matching format",
            ));
        }
        let src = &source.levels[0];
        let target = &mut self.levels[0];
        if src.len() != target.len() {
            return Err(ImageError::InvalidArgument(
                "source level size does not match destination",
            ));
        }
        target.copy_from_slice(src);
        Ok(())
    }
}

/// Byte size of a level, surfacing overflow as an argument error.
fn level_size(format: PixelFormat, w: u32, h: u32, d: u32) -> Result<usize, ImageError> {
    format
        .level_byte_size(w, h, d)
        .ok_or(ImageError::InvalidArgument("level byte size overflows"))
}

fn alloc_zeroed(size: usize) -> Result<Box<[u8]>, ImageError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| ImageError::OutOfMemory { bytes: size })?;
    buf.resize(size, 0);
    Ok(buf.into_boxed_slice())
}

fn color_to_texel(color: Rgba<u8>) -> Rgba<f32> {
    Rgba {
        r: color.r as f32 / 255.0,
        g: color.g as f32 / 255.0,
        b: color.b as f32 / 255.0,
        a: color.a as f32 / 255.0,
    }
}

fn texel_to_color(texel: Rgba<f32>) -> Rgba<u8> {
    let to8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba {
        r: to8(texel.r),
        g: to8(texel.g),
        b: to8(texel.b),
        a: to8(texel.a),
    }
}
