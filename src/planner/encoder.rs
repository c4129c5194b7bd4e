//! Video encoder selection

use tracing::warn;

use crate::domain::model::{ExportSettings, HardwareAccel, VideoCodecFamily};
use crate::ports::EncoderProbe;

/// Render node used for VAAPI uploads
pub const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Encoder name for an acceleration mode and codec family
pub fn encoder_for(accel: HardwareAccel, family: VideoCodecFamily) -> &'static str {
    match (accel, family) {
        (HardwareAccel::Nvenc, VideoCodecFamily::H264) => "h264_nvenc",
        (HardwareAccel::Nvenc, VideoCodecFamily::H265) => "hevc_nvenc",
        (HardwareAccel::Qsv, VideoCodecFamily::H264) => "h264_qsv",
        (HardwareAccel::Qsv, VideoCodecFamily::H265) => "hevc_qsv",
        (HardwareAccel::Vaapi, VideoCodecFamily::H264) => "h264_vaapi",
        (HardwareAccel::Vaapi, VideoCodecFamily::H265) => "hevc_vaapi",
        (HardwareAccel::Software, VideoCodecFamily::H264) => "libx264",
        (HardwareAccel::Software, VideoCodecFamily::H265) => "libx265",
    }
}

/// Encoder chosen for a job, with the extra arguments its backend needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    pub accel: HardwareAccel,
    pub name: &'static str,
}

impl EncoderProfile {
    pub fn software(family: VideoCodecFamily) -> Self {
        Self {
            accel: HardwareAccel::Software,
            name: encoder_for(HardwareAccel::Software, family),
        }
    }

    /// Arguments that must precede the first `-i`
    pub fn input_args(&self) -> Vec<String> {
        match self.accel {
            HardwareAccel::Vaapi => vec!["-vaapi_device".to_string(), VAAPI_DEVICE.to_string()],
            _ => Vec::new(),
        }
    }

    /// Filter appended to the chain to move frames onto the device
    pub fn upload_filter(&self) -> Option<&'static str> {
        match self.accel {
            HardwareAccel::Vaapi => Some("format=nv12,hwupload"),
            _ => None,
        }
    }

    /// Pixel format for broad player compatibility
    pub fn pixel_format(&self) -> Option<&'static str> {
        match self.accel {
            HardwareAccel::Software => Some("yuv420p"),
            HardwareAccel::Nvenc | HardwareAccel::Qsv => Some("nv12"),
            HardwareAccel::Vaapi => None,
        }
    }
}

/// Use the requested hardware encoder only when it was detected, otherwise
/// fall back to software
pub fn select_encoder(
    requested: HardwareAccel,
    available: &[HardwareAccel],
    family: VideoCodecFamily,
) -> EncoderProfile {
    if requested == HardwareAccel::Software {
        return EncoderProfile::software(family);
    }
    if available.contains(&requested) {
        return EncoderProfile {
            accel: requested,
            name: encoder_for(requested, family),
        };
    }
    warn!(
        requested = %requested,
        "Requested hardware acceleration is not available, using software encoder"
    );
    EncoderProfile::software(family)
}

/// Encoder for a job's settings, probing hardware support only when a
/// hardware mode was requested; a failed probe means software only
pub async fn resolve_encoder(probe: &dyn EncoderProbe, settings: &ExportSettings) -> EncoderProfile {
    let family = settings.codec_family();
    if settings.hardware_accel.is_software() {
        return EncoderProfile::software(family);
    }
    let available = match probe.available_accels().await {
        Ok(available) => available,
        Err(err) => {
            warn!(error = %err, "Encoder probe failed, assuming software only");
            vec![HardwareAccel::Software]
        }
    };
    select_encoder(settings.hardware_accel, &available, family)
}
