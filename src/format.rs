//! Pixel formats and their byte layouts.
//!
//! Exactly one of two layouts governs every format: uncompressed formats use
//! a per-pixel byte layout ([`bytes_per_pixel`](PixelFormat::bytes_per_pixel)),
//! block-compressed formats use a fixed-size block layout
//! ([`block_layout`](PixelFormat::block_layout)). Accessors for the other
//! layout return `None`.
//!
//! Conversion between uncompressed formats goes through a crate-private
//! per-texel codec pivoting on `Rgba<f32>`. Compressed formats have no texel
//! codec — operations that need one fail with
//! [`UnsupportedConversion`](crate::ImageError::UnsupportedConversion) or
//! [`UnsupportedOperation`](crate::ImageError::UnsupportedOperation).

use rgb::Rgba;

// Rec. 601 luma weights, used when collapsing RGB to luminance.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Supported pixel formats.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit luminance.
    L8,
    /// 8-bit luminance + alpha.
    La8,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit BGR (Windows/DirectX byte order).
    Bgr8,
    /// 8-bit RGBA.
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
    /// 16-bit-per-channel RGBA, native endianness.
    Rgba16,
    /// 32-bit float RGBA, native endianness.
    RgbaF32,
    /// BC1 (DXT1) block compression: 4×4 texels in 8 bytes.
    Bc1,
    /// BC2 (DXT3) block compression: 4×4 texels in 16 bytes.
    Bc2,
    /// BC3 (DXT5) block compression: 4×4 texels in 16 bytes.
    Bc3,
}

/// Block geometry of a compressed format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockLayout {
    /// Block width in texels.
    pub width: u32,
    /// Block height in texels.
    pub height: u32,
    /// Encoded size of one block in bytes.
    pub bytes: usize,
}

impl PixelFormat {
    /// Bytes per pixel. `None` for block-compressed formats, which have no
    /// per-pixel size.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::L8 => Some(1),
            Self::La8 => Some(2),
            Self::Rgb8 | Self::Bgr8 => Some(3),
            Self::Rgba8 | Self::Bgra8 => Some(4),
            Self::Rgba16 => Some(8),
            Self::RgbaF32 => Some(16),
            Self::Bc1 | Self::Bc2 | Self::Bc3 => None,
        }
    }

    /// Block geometry. `None` for uncompressed formats.
    pub const fn block_layout(self) -> Option<BlockLayout> {
        match self {
            Self::Bc1 => Some(BlockLayout {
                width: 4,
                height: 4,
                bytes: 8,
            }),
            Self::Bc2 | Self::Bc3 => Some(BlockLayout {
                width: 4,
                height: 4,
                bytes: 16,
            }),
            _ => None,
        }
    }

    /// Whether this format stores fixed-size blocks instead of single texels.
    pub const fn is_compressed(self) -> bool {
        self.block_layout().is_some()
    }

    /// Number of color/alpha channels a texel carries.
    pub const fn channels(self) -> u8 {
        match self {
            Self::L8 => 1,
            Self::La8 => 2,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 | Self::Rgba16 | Self::RgbaF32 => 4,
            // BC blocks decode to RGBA.
            Self::Bc1 | Self::Bc2 | Self::Bc3 => 4,
        }
    }

    /// Whether texels carry an alpha channel.
    pub const fn has_alpha(self) -> bool {
        !matches!(self, Self::L8 | Self::Rgb8 | Self::Bgr8)
    }

    /// Whether a per-texel conversion routine exists for this format.
    ///
    /// Conversion, region fills, and pixel color access all require one on
    /// both sides.
    pub const fn has_converter(self) -> bool {
        !self.is_compressed()
    }

    /// Byte size of one whole level of `width` × `height` × `depth` texels,
    /// under whichever layout governs this format.
    ///
    /// Returns `None` if the size overflows `usize`.
    pub fn level_byte_size(self, width: u32, height: u32, depth: u32) -> Option<usize> {
        match self.block_layout() {
            None => {
                let bpp = self.bytes_per_pixel()?;
                (width as usize)
                    .checked_mul(height as usize)?
                    .checked_mul(depth as usize)?
                    .checked_mul(bpp)
            }
            Some(block) => {
                let blocks_x = width.div_ceil(block.width) as usize;
                let blocks_y = height.div_ceil(block.height) as usize;
                blocks_x
                    .checked_mul(blocks_y)?
                    .checked_mul(depth as usize)?
                    .checked_mul(block.bytes)
            }
        }
    }

    /// Decode one texel into normalized RGBA.
    ///
    /// `bytes` must hold exactly `bytes_per_pixel()` bytes. Callers guarantee
    /// the format is uncompressed.
    pub(crate) fn decode_texel(self, bytes: &[u8]) -> Rgba<f32> {
        let u8f = |v: u8| v as f32 / 255.0;
        match self {
            Self::L8 => {
                let v = u8f(bytes[0]);
                Rgba {
                    r: v,
                    g: v,
                    b: v,
                    a: 1.0,
                }
            }
            Self::La8 => {
                let v = u8f(bytes[0]);
                Rgba {
                    r: v,
                    g: v,
                    b: v,
                    a: u8f(bytes[1]),
                }
            }
            Self::Rgb8 => Rgba {
                r: u8f(bytes[0]),
                g: u8f(bytes[1]),
                b: u8f(bytes[2]),
                a: 1.0,
            },
            Self::Bgr8 => Rgba {
                r: u8f(bytes[2]),
                g: u8f(bytes[1]),
                b: u8f(bytes[0]),
                a: 1.0,
            },
            Self::Rgba8 => Rgba {
                r: u8f(bytes[0]),
                g: u8f(bytes[1]),
                b: u8f(bytes[2]),
                a: u8f(bytes[3]),
            },
            Self::Bgra8 => Rgba {
                r: u8f(bytes[2]),
                g: u8f(bytes[1]),
                b: u8f(bytes[0]),
                a: u8f(bytes[3]),
            },
            Self::Rgba16 => {
                let u16f = |lo: u8, hi: u8| u16::from_ne_bytes([lo, hi]) as f32 / 65535.0;
                Rgba {
                    r: u16f(bytes[0], bytes[1]),
                    g: u16f(bytes[2], bytes[3]),
                    b: u16f(bytes[4], bytes[5]),
                    a: u16f(bytes[6], bytes[7]),
                }
            }
            Self::RgbaF32 => {
                let f = |c: &[u8]| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]);
                Rgba {
                    r: f(&bytes[0..4]),
                    g: f(&bytes[4..8]),
                    b: f(&bytes[8..12]),
                    a: f(&bytes[12..16]),
                }
            }
            Self::Bc1 | Self::Bc2 | Self::Bc3 => {
                unreachable!("compressed formats have no texel codec")
            }
        }
    }

    /// Encode one normalized RGBA texel.
    ///
    /// `bytes` must hold exactly `bytes_per_pixel()` bytes. Callers guarantee
    /// the format is uncompressed. Channel values are clamped to `[0, 1]` and
    /// rounded, so integer formats round-trip exactly.
    pub(crate) fn encode_texel(self, texel: Rgba<f32>, bytes: &mut [u8]) {
        let fu8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let fu16 = |v: f32| (v.clamp(0.0, 1.0) * 65535.0).round() as u16;
        let luma = |t: &Rgba<f32>| LUMA_R * t.r + LUMA_G * t.g + LUMA_B * t.b;
        match self {
            Self::L8 => bytes[0] = fu8(luma(&texel)),
            Self::La8 => {
                bytes[0] = fu8(luma(&texel));
                bytes[1] = fu8(texel.a);
            }
            Self::Rgb8 => {
                bytes[0] = fu8(texel.r);
                bytes[1] = fu8(texel.g);
                bytes[2] = fu8(texel.b);
            }
            Self::Bgr8 => {
                bytes[0] = fu8(texel.b);
                bytes[1] = fu8(texel.g);
                bytes[2] = fu8(texel.r);
            }
            Self::Rgba8 => {
                bytes[0] = fu8(texel.r);
                bytes[1] = fu8(texel.g);
                bytes[2] = fu8(texel.b);
                bytes[3] = fu8(texel.a);
            }
            Self::Bgra8 => {
                bytes[0] = fu8(texel.b);
                bytes[1] = fu8(texel.g);
                bytes[2] = fu8(texel.r);
                bytes[3] = fu8(texel.a);
            }
            Self::Rgba16 => {
                bytes[0..2].copy_from_slice(&fu16(texel.r).to_ne_bytes());
                bytes[2..4].copy_from_slice(&fu16(texel.g).to_ne_bytes());
                bytes[4..6].copy_from_slice(&fu16(texel.b).to_ne_bytes());
                bytes[6..8].copy_from_slice(&fu16(texel.a).to_ne_bytes());
            }
            Self::RgbaF32 => {
                bytes[0..4].copy_from_slice(&texel.r.to_ne_bytes());
                bytes[4..8].copy_from_slice(&texel.g.to_ne_bytes());
                bytes[8..12].copy_from_slice(&texel.b.to_ne_bytes());
                bytes[12..16].copy_from_slice(&texel.a.to_ne_bytes());
            }
            Self::Bc1 | Self::Bc2 | Self::Bc3 => {
                unreachable!("compressed formats have no texel codec")
            }
        }
    }
}

impl core::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::L8 => "L8",
            Self::La8 => "LA8",
            Self::Rgb8 => "RGB8",
            Self::Bgr8 => "BGR8",
            Self::Rgba8 => "RGBA8",
            Self::Bgra8 => "BGRA8",
            Self::Rgba16 => "RGBA16",
            Self::RgbaF32 => "RGBA32F",
            Self::Bc1 => "BC1",
            Self::Bc2 => "BC2",
            Self::Bc3 => "BC3",
        })
    }
}
