//! Source images: decoding, aspect-ratio cropping and scaling into uniform tiles.

pub mod decode;
#[cfg(feature = "gpu")]
pub mod gpu_resize;
pub mod resize;
pub mod tile;

pub use decode::{decode_image, encode_image};
#[cfg(feature = "gpu")]
pub use gpu_resize::GpuResizer;
pub use resize::{CpuResizer, ResizeProvider, negotiate_resizer};
pub use tile::{Tile, TileSpec, crop_window, preprocess};

#[cfg(test)]
#[path = "../../tests/unit/assets/mod.rs"]
mod tests;
