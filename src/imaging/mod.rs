//! Pixel-level operations used by the pipeline stages
//!
//! Every function here is pure with respect to shared state: it reads an input
//! image (or file) and produces a new image (or file) at a caller-chosen path.

pub mod codec;
pub mod orientation;
pub mod scale;
pub mod watermark;

pub use codec::{decode, encode_jpeg, encode_png, save_png, Quality, QualityPolicy};
pub use orientation::{normalize_orientation, read_orientation, unmirror};
pub use scale::{cap_megapixels, capped_dimensions};
pub use watermark::{draw_watermark, draw_watermark_with_style, WatermarkStyle};
