//! Pipeline stages for proof processing
//!
//! 1. NormalizeStage - Bake EXIF orientation (and front-camera unmirror) into pixels
//! 2. WatermarkStage - Burn capture time, location state and identifiers into the image
//! 3. DownscaleStage - Enforce the megapixel cap
//! 4. CompressStage - Encode the only lossy JPEG at the requested quality
//! 5. SaveStage - Copy the JPEG to its final location
//! 6. HashStage - SHA-256 of the saved bytes
//! 7. ManifestStage - Re-check the hash and write the manifest next to the image
//! 8. FinalizeStage - Remove the run's work directory

pub mod compress;
pub mod downscale;
pub mod finalize;
pub mod hash;
pub mod manifest;
pub mod normalize;
pub mod save;
pub mod watermark;

pub use compress::CompressStage;
pub use downscale::DownscaleStage;
pub use finalize::FinalizeStage;
pub use hash::HashStage;
pub use manifest::ManifestStage;
pub use normalize::NormalizeStage;
pub use save::SaveStage;
pub use watermark::{overlay_lines, WatermarkStage};

use super::core::PipelineStage;
use crate::state_machine::Stage;

/// Dispatch table: the one place a stage kind is bound to its implementation
pub fn handler(stage: Stage) -> &'static dyn PipelineStage {
    match stage {
        Stage::Normalize => &NormalizeStage,
        Stage::Watermark => &WatermarkStage,
        Stage::Downscale => &DownscaleStage,
        Stage::Compress => &CompressStage,
        Stage::Save => &SaveStage,
        Stage::Hash => &HashStage,
        Stage::Manifest => &ManifestStage,
        Stage::Finalize => &FinalizeStage,
    }
}
