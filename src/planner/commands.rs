//! ffmpeg argument lists for per-clip renders and the final concatenation

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::model::{Clip, ExportSettings};
use crate::filters::{build_clip_filters, Canvas, FilterChain};
use crate::planner::encoder::EncoderProfile;
use crate::ports::Invocation;
use crate::utils::time::ffmpeg_seconds;

/// Leading arguments shared by every invocation; progress goes to stdout
pub const COMMON_ARGS: [&str; 5] = ["-y", "-hide_banner", "-nostats", "-progress", "pipe:1"];

/// Sample rate of the silent track added to text segments
const SILENT_SAMPLE_RATE: u32 = 48_000;

/// Per-job inputs to command construction
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub encoder: EncoderProfile,
    pub canvas: Canvas,
}

fn common_args() -> Vec<String> {
    COMMON_ARGS.iter().map(|s| s.to_string()).collect()
}

fn push(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_string());
    args.push(value.into());
}

/// `atempo` only accepts factors in [0.5, 2], so larger changes are chained
pub fn atempo_chain(speed: f64) -> Vec<String> {
    let mut remaining = speed;
    let mut filters = Vec::new();
    if !(remaining.is_finite() && remaining > 0.0) {
        return filters;
    }
    while remaining > 2.0 {
        filters.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        filters.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    if (remaining - 1.0).abs() > 1e-9 {
        filters.push(format!("atempo={}", remaining));
    }
    filters
}

/// Audio filters for a clip that keeps its audio stream
fn audio_filters(clip: &Clip) -> Vec<String> {
    let mut filters = Vec::new();
    if clip.volume != 1.0 {
        filters.push(format!("volume={}", clip.volume));
    }
    if clip.speed != 1.0 {
        filters.extend(atempo_chain(clip.speed));
    }
    filters
}

/// Render of one clip into an intermediate segment
#[derive(Debug, Clone, Serialize)]
pub struct RenderCommand {
    pub clip_id: String,
    pub output: PathBuf,
    pub filter_graph: String,
    pub args: Vec<String>,
    pub duration: f64,
}

impl RenderCommand {
    /// Build the argument list for one clip
    ///
    /// Order: seek to trim-in, cap to the trimmed span, video encoder and
    /// bitrate, filter chain, audio encoder and bitrate, then mute or volume.
    pub fn for_clip(
        clip: &Clip,
        output: &Path,
        settings: &ExportSettings,
        ctx: &RenderContext,
    ) -> Self {
        let filters = build_clip_filters(clip, ctx.canvas);
        let mut args = common_args();
        args.extend(ctx.encoder.input_args());

        if clip.is_text_overlay() {
            Self::push_text_inputs(&mut args, clip, settings, ctx.canvas);
        } else {
            if clip.trim_start > 0.0 {
                push(&mut args, "-ss", ffmpeg_seconds(clip.trim_start));
            }
            push(&mut args, "-t", ffmpeg_seconds(clip.source_span()));
            push(&mut args, "-i", clip.media_path.clone().unwrap_or_default());
        }

        push(&mut args, "-c:v", ctx.encoder.name);
        push(&mut args, "-b:v", settings.video_bitrate.clone());
        if let Some(preset) = settings.preset.as_ref().filter(|_| ctx.encoder.accel.is_software()) {
            push(&mut args, "-preset", preset.clone());
        }

        let filter_graph = with_upload(&filters, ctx.encoder.upload_filter());
        if !filter_graph.is_empty() {
            push(&mut args, "-vf", filter_graph.clone());
        }
        if let Some(pix_fmt) = ctx.encoder.pixel_format() {
            push(&mut args, "-pix_fmt", pix_fmt);
        }

        push(&mut args, "-c:a", settings.audio_codec.clone());
        push(&mut args, "-b:a", settings.audio_bitrate.clone());

        if clip.is_text_overlay() {
            args.push("-shortest".to_string());
        } else if clip.muted {
            args.push("-an".to_string());
        } else {
            let audio = audio_filters(clip);
            if !audio.is_empty() {
                push(&mut args, "-af", audio.join(","));
            }
        }

        args.push(output.to_string_lossy().into_owned());

        Self {
            clip_id: clip.id.clone(),
            output: output.to_path_buf(),
            filter_graph,
            args,
            duration: clip.timeline_duration(),
        }
    }

    /// Black canvas plus silence, so text segments concat like media segments
    fn push_text_inputs(args: &mut Vec<String>, clip: &Clip, settings: &ExportSettings, canvas: Canvas) {
        let duration = ffmpeg_seconds(clip.timeline_duration());
        push(args, "-f", "lavfi");
        push(
            args,
            "-i",
            format!(
                "color=c=black:s={}x{}:d={}:r={}",
                canvas.width, canvas.height, duration, settings.fps
            ),
        );
        push(args, "-f", "lavfi");
        push(
            args,
            "-i",
            format!(
                "anullsrc=channel_layout=stereo:sample_rate={}",
                SILENT_SAMPLE_RATE
            ),
        );
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::new(format!("render clip {}", self.clip_id), self.args.clone())
            .with_expected_duration(self.duration)
    }
}

fn with_upload(filters: &FilterChain, upload: Option<&str>) -> String {
    let graph = filters.to_filter_graph();
    match upload {
        Some(upload) if graph.is_empty() => upload.to_string(),
        Some(upload) => format!("{},{}", graph, upload),
        None => graph,
    }
}

/// How the concat demuxer output is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatMode {
    /// Remux only
    Copy,
    /// Re-encode once to the final codec, size and frame rate
    Encode,
}

/// Final concatenation over a manifest
#[derive(Debug, Clone, Serialize)]
pub struct ConcatCommand {
    pub manifest: PathBuf,
    pub output: PathBuf,
    pub mode: ConcatMode,
    pub args: Vec<String>,
    pub duration: f64,
}

impl ConcatCommand {
    pub fn new(
        manifest: &Path,
        output: &Path,
        settings: &ExportSettings,
        mode: ConcatMode,
        encoder: &EncoderProfile,
        duration: f64,
    ) -> Self {
        let mut args = common_args();
        if mode == ConcatMode::Encode {
            args.extend(encoder.input_args());
        }
        push(&mut args, "-f", "concat");
        push(&mut args, "-safe", "0");
        push(&mut args, "-i", manifest.to_string_lossy().into_owned());

        match mode {
            ConcatMode::Copy => push(&mut args, "-c", "copy"),
            ConcatMode::Encode => {
                push(&mut args, "-c:v", encoder.name);
                match encoder.upload_filter() {
                    Some(upload) => push(
                        &mut args,
                        "-vf",
                        format!("scale={}:{},{}", settings.width, settings.height, upload),
                    ),
                    None => push(
                        &mut args,
                        "-s",
                        format!("{}x{}", settings.width, settings.height),
                    ),
                }
                push(&mut args, "-r", settings.fps.to_string());
                push(&mut args, "-b:v", settings.video_bitrate.clone());
                if let Some(pix_fmt) = encoder.pixel_format() {
                    push(&mut args, "-pix_fmt", pix_fmt);
                }
                push(&mut args, "-c:a", settings.audio_codec.clone());
                push(&mut args, "-b:a", settings.audio_bitrate.clone());
            }
        }

        args.push(output.to_string_lossy().into_owned());

        Self {
            manifest: manifest.to_path_buf(),
            output: output.to_path_buf(),
            mode,
            args,
            duration,
        }
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::new("concat", self.args.clone()).with_expected_duration(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{HardwareAccel, TextOverlay, VideoCodecFamily};
    use crate::planner::encoder::select_encoder;

    fn ctx() -> RenderContext {
        RenderContext {
            encoder: EncoderProfile::software(VideoCodecFamily::H264),
            canvas: Canvas::default(),
        }
    }

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_render_args_follow_step_order() {
        let mut clip = Clip::media("c1", "/media/a.mp4", 10.0).with_trim(2.0, 7.5);
        clip.grading.brightness = 10.0;
        clip.volume = 0.5;

        let cmd = RenderCommand::for_clip(&clip, Path::new("/tmp/seg.mp4"), &ExportSettings::default(), &ctx());
        let args = &cmd.args;

        assert_eq!(&args[..5], &COMMON_ARGS.map(String::from));
        assert_eq!(args[position(args, "-ss").unwrap() + 1], "2");
        assert_eq!(args[position(args, "-t").unwrap() + 1], "5.5");
        assert_eq!(args[position(args, "-c:v").unwrap() + 1], "libx264");
        assert_eq!(
            args[position(args, "-vf").unwrap() + 1],
            "eq=brightness=0.1:contrast=1:saturation=1"
        );
        assert_eq!(args[position(args, "-af").unwrap() + 1], "volume=0.5");
        assert_eq!(args.last().unwrap(), "/tmp/seg.mp4");

        let order: Vec<usize> = ["-ss", "-t", "-i", "-c:v", "-b:v", "-vf", "-c:a", "-b:a", "-af"]
            .iter()
            .map(|flag| position(args, flag).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{:?}", args);
        assert_eq!(cmd.duration, 5.5);
    }

    #[test]
    fn test_no_seek_without_trim_in() {
        let mut clip = Clip::media("c1", "/media/a.mp4", 10.0).with_trim(0.0, 4.0);
        clip.muted = true;
        let cmd = RenderCommand::for_clip(&clip, Path::new("out.mp4"), &ExportSettings::default(), &ctx());
        assert!(position(&cmd.args, "-ss").is_none());
        assert!(position(&cmd.args, "-vf").is_none());
        assert!(position(&cmd.args, "-an").is_some());
        assert!(position(&cmd.args, "-af").is_none());
    }

    #[test]
    fn test_speed_adds_atempo() {
        let mut clip = Clip::media("c1", "/media/a.mp4", 8.0);
        clip.speed = 4.0;
        let cmd = RenderCommand::for_clip(&clip, Path::new("out.mp4"), &ExportSettings::default(), &ctx());
        assert_eq!(cmd.args[position(&cmd.args, "-af").unwrap() + 1], "atempo=2,atempo=2");
        assert_eq!(cmd.duration, 2.0);
        assert_eq!(atempo_chain(0.25), vec!["atempo=0.5", "atempo=0.5"]);
        assert_eq!(atempo_chain(1.5), vec!["atempo=1.5"]);
    }

    #[test]
    fn test_text_clip_uses_lavfi_sources() {
        let clip = Clip::text(
            "t1",
            TextOverlay {
                text: "Hi".to_string(),
                ..TextOverlay::default()
            },
            3.0,
        );
        let cmd = RenderCommand::for_clip(&clip, Path::new("t.mp4"), &ExportSettings::default(), &ctx());
        assert!(cmd
            .args
            .contains(&"color=c=black:s=1920x1080:d=3:r=30".to_string()));
        assert!(cmd.args.iter().any(|a| a.starts_with("anullsrc")));
        assert!(cmd.filter_graph.starts_with("drawtext=text='Hi'"));
        assert!(cmd.args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_vaapi_render_uploads_frames() {
        let encoder = select_encoder(HardwareAccel::Vaapi, &[HardwareAccel::Vaapi], VideoCodecFamily::H264);
        let ctx = RenderContext {
            encoder,
            canvas: Canvas::default(),
        };
        let clip = Clip::media("c1", "/media/a.mp4", 10.0).with_trim(1.0, 10.0);
        let cmd = RenderCommand::for_clip(&clip, Path::new("out.mp4"), &ExportSettings::default(), &ctx);
        assert!(position(&cmd.args, "-vaapi_device").unwrap() < position(&cmd.args, "-i").unwrap());
        assert_eq!(cmd.filter_graph, "format=nv12,hwupload");
    }

    #[test]
    fn test_concat_copy_mode() {
        let encoder = EncoderProfile::software(VideoCodecFamily::H264);
        let cmd = ConcatCommand::new(
            Path::new("/tmp/list.txt"),
            Path::new("/out/final.mp4"),
            &ExportSettings::default(),
            ConcatMode::Copy,
            &encoder,
            12.0,
        );
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-f concat -safe 0 -i /tmp/list.txt -c copy /out/final.mp4"));
        assert!(!joined.contains("-c:v"));
    }

    #[test]
    fn test_concat_encode_mode_applies_final_settings() {
        let encoder = EncoderProfile::software(VideoCodecFamily::H265);
        let settings = ExportSettings {
            width: 1280,
            height: 720,
            fps: 29.97,
            ..ExportSettings::default()
        };
        let cmd = ConcatCommand::new(
            Path::new("/tmp/list.txt"),
            Path::new("/out/final.mp4"),
            &settings,
            ConcatMode::Encode,
            &encoder,
            12.0,
        );
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-c:v libx265 -s 1280x720 -r 29.97 -b:v 8M"));
        assert!(joined.contains("-c:a aac -b:a 192k"));
        assert_eq!(cmd.invocation().expected_duration, Some(12.0));
    }
}
