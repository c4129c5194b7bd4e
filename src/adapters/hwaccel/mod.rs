//! Hardware encoder detection through `ffmpeg -encoders`

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::model::{HardwareAccel, VideoCodecFamily};
use crate::error::{ExportError, ExportResult};
use crate::planner::encoder_for;
use crate::ports::EncoderProbe;

/// Accelerations whose H.264 encoder appears in an `-encoders` listing;
/// software is always first
pub fn parse_encoder_list(listing: &str) -> Vec<HardwareAccel> {
    let names: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();

    let mut found = vec![HardwareAccel::Software];
    for accel in HardwareAccel::ALL {
        if accel.is_software() {
            continue;
        }
        let encoder = encoder_for(accel, VideoCodecFamily::H264);
        if names.contains(&encoder) {
            found.push(accel);
        }
    }
    found
}

/// Run `<ffmpeg> -hide_banner -encoders` and report what it supports
pub async fn detect_hardware_accels(ffmpeg: &Path) -> ExportResult<Vec<HardwareAccel>> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ExportError::Spawn {
            program: ffmpeg.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExportError::ProcessExit {
            code: output.status.code(),
            diagnostics: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let found = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
    info!(accels = ?found, "Hardware encoders detected");
    Ok(found)
}

/// [`EncoderProbe`] backed by the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoderProbe {
    ffmpeg: PathBuf,
}

impl FfmpegEncoderProbe {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

#[async_trait]
impl EncoderProbe for FfmpegEncoderProbe {
    async fn available_accels(&self) -> ExportResult<Vec<HardwareAccel>> {
        debug!(ffmpeg = %self.ffmpeg.display(), "Probing encoders");
        detect_hardware_accels(&self.ffmpeg).await
    }
}
