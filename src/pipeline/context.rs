use crate::config::PipelineConfig;
use crate::imaging::{QualityPolicy, WatermarkStyle};
use crate::storage::ArtifactLayout;

/// Everything a stage needs besides the job itself
///
/// Per-job data travels on `ProofJob`; this holds the process-wide settings shared by
/// every run, resolved once from `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub layout: ArtifactLayout,
    pub quality: QualityPolicy,
    /// Burned into the watermark (last 6 characters)
    pub device_id: String,
    pub watermark: WatermarkStyle,
    /// Finalize removes the source image after a successful chain
    pub delete_source_on_success: bool,
    /// Largest accepted `max_megapixels`, re-checked at every stage boundary
    pub max_megapixels_limit: u32,
}

impl StageContext {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            layout: config.layout(),
            quality: config.quality_policy(),
            device_id: config.resolved_device_id(),
            watermark: WatermarkStyle::default(),
            delete_source_on_success: config.delete_source_on_success,
            max_megapixels_limit: config.max_megapixels_limit,
        }
    }
}
