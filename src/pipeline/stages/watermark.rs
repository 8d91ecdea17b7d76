use crate::error::ProofResult;
use crate::evidence::LocationState;
use crate::imaging::{decode, draw_watermark_with_style, save_png};
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::{ProofJob, Stage};
use chrono::Utc;
use tracing::debug;

const SHORT_ID_LEN: usize = 6;

/// Stage that burns the capture overlay into the image
///
/// Output: `work/<id>/g<gen>/02_watermark.png`
pub struct WatermarkStage;

impl PipelineStage for WatermarkStage {
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput> {
        let image = decode(&job.current_artifact_path)?;
        let lines = overlay_lines(job, &context.device_id);

        debug!(
            target: "pipeline::watermark",
            proof_id = %job.id,
            width = image.width(),
            height = image.height(),
            lines = lines.len(),
            "Drawing watermark"
        );

        let marked = draw_watermark_with_style(&image, &lines, &context.watermark);
        let output = context
            .layout
            .stage_output(&job.id, job.generation, Stage::Watermark, "png");
        save_png(&marked, &output)?;

        Ok(StageOutput::artifact(output))
    }

    fn name(&self) -> &str {
        "Draw Watermark"
    }
}

/// Overlay text, top line first
///
/// ```text
/// UTC 2024-03-01 12:30:00Z
/// Local 2024-03-01 17:30:00 +05:00
/// GPS 24.86070, 67.00110 ±8m        | GPS Stale | GPS None
/// Device 7a1234 | Proof 200000
/// ```
pub fn overlay_lines(job: &ProofJob, device_id: &str) -> Vec<String> {
    let utc = job.captured_at.with_timezone(&Utc);
    vec![
        format!("UTC {}", utc.format("%Y-%m-%d %H:%M:%SZ")),
        format!("Local {}", job.captured_at.format("%Y-%m-%d %H:%M:%S %:z")),
        location_line(job),
        format!(
            "Device {} | Proof {}",
            short_id(device_id),
            short_id(&job.id)
        ),
    ]
}

fn location_line(job: &ProofJob) -> String {
    match (job.location_state, &job.location_fix) {
        (LocationState::Fresh, Some(fix)) => {
            let mut line = format!("GPS {:.5}, {:.5}", fix.lat, fix.lon);
            if let Some(accuracy) = fix.accuracy_meters {
                line.push_str(&format!(" ±{}m", accuracy.round() as i64));
            }
            line
        }
        (LocationState::Stale, _) => "GPS Stale".to_string(),
        _ => "GPS None".to_string(),
    }
}

/// Last six characters, or the whole value when shorter
fn short_id(value: &str) -> String {
    let count = value.chars().count();
    value.chars().skip(count.saturating_sub(SHORT_ID_LEN)).collect()
}
