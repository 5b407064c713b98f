//! Copy-on-write image storage with mip chains, cubemap and volume layers.
//!
//! This crate is the pixel-storage core of a game engine's image handling:
//!
//! - [`Image`] — the public value-type handle. Cloning is cheap: clones share
//!   one reference-counted store, and a handle detaches into private storage
//!   before its first write, so mutation through one handle is never visible
//!   through another.
//! - [`PixelBuffer`] — raw multi-level storage: one byte allocation per mip
//!   level, flat/cubemap/volume topologies, format conversion, region fills,
//!   copies, and flips.
//! - [`PixelFormat`] — uncompressed and block-compressed formats. Compressed
//!   formats only support whole-level operations.
//! - [`LoaderRegistry`] / [`ImageDecoder`] — pluggable decoders keyed by file
//!   extension or content signature, consulted by the `Image` load
//!   operations.
//!
//! Handles are `Send + Sync`; the store refcount is atomic, and copy-on-write
//! guarantees a writer holds the only reference before pixels change.
//!
//! # Example
//!
//! ```
//! use pixcow::{Image, ImageKind, PixelFormat, Rgba};
//!
//! let red = Rgba { r: 255, g: 0, b: 0, a: 255 };
//! let green = Rgba { r: 0, g: 255, b: 0, a: 255 };
//!
//! let mut image = Image::create(ImageKind::Flat, PixelFormat::Rgba8, 4, 4, 1, 1)?;
//! image.fill(red)?;
//!
//! let copy = image.clone(); // shares storage
//! image.set_pixel_color(green, 0, 0, 0)?; // detaches first
//!
//! assert_eq!(copy.pixel_color(0, 0, 0)?, red);
//! assert_eq!(image.pixel_color(0, 0, 0)?, green);
//! # Ok::<(), pixcow::ImageError>(())
//! ```

#![forbid(unsafe_code)]

mod buffer;
mod error;
mod format;
mod image;
mod loader;
mod region;
mod store;

pub use buffer::{ImageKind, PixelBuffer};
pub use error::ImageError;
pub use format::{BlockLayout, PixelFormat};
pub use image::Image;
pub use loader::{ImageDecoder, LoadOptions, LoaderRegistry};
pub use region::{Cuboid, Rect};

// Re-exports for decoder implementors and users.
pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb::Rgba;
