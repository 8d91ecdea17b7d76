use crate::error::{ProofError, ProofResult};
use crate::storage::write_atomic;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Requested output quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    Low,
    Med,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "LOW",
            Quality::Med => "MED",
            Quality::High => "HIGH",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Quality::Low),
            "MED" | "MEDIUM" => Ok(Quality::Med),
            "HIGH" => Ok(Quality::High),
            other => Err(ProofError::InvalidParameters(format!(
                "Unknown quality '{}', expected LOW, MED or HIGH",
                other
            ))),
        }
    }
}

/// Numeric JPEG quality per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPolicy {
    pub low: u8,
    pub med: u8,
    pub high: u8,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            low: 70,
            med: 85,
            high: 92,
        }
    }
}

impl QualityPolicy {
    pub fn value(&self, quality: Quality) -> u8 {
        match quality {
            Quality::Low => self.low,
            Quality::Med => self.med,
            Quality::High => self.high,
        }
    }
}

/// Decode an image, sniffing the format from its content
pub fn decode(path: &Path) -> ProofResult<DynamicImage> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image)
}

/// Encode as baseline JPEG at the given quality (1-100)
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> ProofResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    Ok(buffer)
}

/// Lossless encode used for intermediate artifacts
pub fn encode_png(image: &DynamicImage) -> ProofResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Fast, PngFilterType::Adaptive);
    image.write_with_encoder(encoder)?;
    Ok(buffer)
}

/// Encode as PNG and atomically write to `path`
pub fn save_png(image: &DynamicImage, path: &Path) -> ProofResult<()> {
    let bytes = encode_png(image)?;
    write_atomic(path, &bytes)?;
    Ok(())
}
