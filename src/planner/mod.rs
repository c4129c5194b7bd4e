//! Export planning
//!
//! Turns a job descriptor into the concrete list of ffmpeg invocations: either
//! a single stream-copy concatenation (fast path) or per-clip renders followed
//! by a re-encoding concatenation (smart render).

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::model::{Clip, JobDescriptor, JobId};
use crate::domain::rules::ClipClassifier;
use crate::error::{ExportError, ExportResult};
use crate::utils::path::{absolutize, job_work_dir, manifest_path, segment_path};

pub mod commands;
pub mod encoder;

pub use commands::{ConcatCommand, ConcatMode, RenderCommand, RenderContext};
pub use encoder::{encoder_for, resolve_encoder, select_encoder, EncoderProfile};

/// Export strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportStrategy {
    /// Every clip can be remuxed as is
    FastPath,
    /// At least one clip is rendered first
    SmartRender,
}

/// Where a concat segment comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentSource {
    Original,
    Rendered,
}

/// One line of the concat manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSegment {
    pub clip_id: String,
    pub path: PathBuf,
    pub source: SegmentSource,
}

/// Complete plan for one job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPlan {
    pub job_id: JobId,
    pub strategy: ExportStrategy,
    pub work_dir: PathBuf,
    pub renders: Vec<RenderCommand>,
    pub segments: Vec<PlannedSegment>,
    pub concat: ConcatCommand,
    /// Sum of the timeline durations of all clips
    pub total_duration: f64,
}

impl ExportPlan {
    /// Plan a job without touching the filesystem
    pub fn build(
        job_id: JobId,
        descriptor: &JobDescriptor,
        temp_root: &Path,
        ctx: &RenderContext,
    ) -> ExportResult<Self> {
        let clips = descriptor.clips();
        let classification = ClipClassifier::classify(&clips);
        if classification.total() == 0 {
            return Err(ExportError::InvalidJob("no clips to export".to_string()));
        }

        let work_dir = job_work_dir(&absolutize(temp_root), job_id);
        let manifest = manifest_path(&work_dir);
        let output = absolutize(&descriptor.output_path);
        let settings = &descriptor.settings;
        let total_duration: f64 = clips.iter().map(Clip::timeline_duration).sum();

        let strategy = if classification.is_fast_path() {
            ExportStrategy::FastPath
        } else {
            ExportStrategy::SmartRender
        };

        let mut renders = Vec::with_capacity(classification.needs_reencode.len());
        let mut segments = Vec::with_capacity(clips.len());
        for (index, clip) in clips.iter().enumerate() {
            if ClipClassifier::needs_reencode(clip) {
                let target = segment_path(&work_dir, index, &clip.id, settings.extension());
                renders.push(RenderCommand::for_clip(clip, &target, settings, ctx));
                segments.push(PlannedSegment {
                    clip_id: clip.id.clone(),
                    path: target,
                    source: SegmentSource::Rendered,
                });
            } else {
                let source = clip.media_path.clone().unwrap_or_default();
                segments.push(PlannedSegment {
                    clip_id: clip.id.clone(),
                    path: absolutize(Path::new(&source)),
                    source: SegmentSource::Original,
                });
            }
        }

        let mode = match strategy {
            ExportStrategy::FastPath => ConcatMode::Copy,
            ExportStrategy::SmartRender => ConcatMode::Encode,
        };
        let concat = ConcatCommand::new(&manifest, &output, settings, mode, &ctx.encoder, total_duration);

        info!(
            job_id = %job_id,
            strategy = ?strategy,
            renders = renders.len(),
            stream_copy = classification.stream_copy_eligible.len(),
            "Export planned"
        );
        debug!(job_id = %job_id, work_dir = %work_dir.display(), "Working directory");

        Ok(Self {
            job_id,
            strategy,
            work_dir,
            renders,
            segments,
            concat,
            total_duration,
        })
    }

    /// Segment paths in manifest order
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }

    pub fn manifest(&self) -> &Path {
        &self.concat.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ExportSettings, Track, VideoCodecFamily};
    use crate::filters::Canvas;

    fn ctx() -> RenderContext {
        RenderContext {
            encoder: EncoderProfile::software(VideoCodecFamily::H264),
            canvas: Canvas::default(),
        }
    }

    fn job(clips: Vec<Clip>) -> JobDescriptor {
        JobDescriptor {
            output_path: "/out/final.mp4".into(),
            settings: ExportSettings::default(),
            tracks: vec![Track {
                id: "v1".to_string(),
                clips,
            }],
        }
    }

    #[test]
    fn test_untouched_clips_take_fast_path() {
        let descriptor = job(vec![
            Clip::media("a", "/media/a.mp4", 5.0),
            Clip::media("b", "/media/b.mp4", 5.0),
        ]);
        let plan = ExportPlan::build(JobId::new(), &descriptor, Path::new("/tmp"), &ctx()).unwrap();

        assert_eq!(plan.strategy, ExportStrategy::FastPath);
        assert!(plan.renders.is_empty());
        assert_eq!(plan.concat.mode, ConcatMode::Copy);
        assert_eq!(
            plan.segment_paths(),
            vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b.mp4")]
        );
        assert_eq!(plan.total_duration, 10.0);
    }

    #[test]
    fn test_smart_render_interleaves_segments() {
        let mut graded = Clip::media("b", "/media/b.mp4", 5.0);
        graded.grading.brightness = 20.0;
        let descriptor = job(vec![
            Clip::media("a", "/media/a.mp4", 5.0),
            graded,
            Clip::media("c", "/media/c.mp4", 5.0),
        ]);
        let id = JobId::new();
        let plan = ExportPlan::build(id, &descriptor, Path::new("/tmp"), &ctx()).unwrap();

        assert_eq!(plan.strategy, ExportStrategy::SmartRender);
        assert_eq!(plan.renders.len(), 1);
        assert_eq!(plan.concat.mode, ConcatMode::Encode);

        let sources: Vec<SegmentSource> = plan.segments.iter().map(|s| s.source).collect();
        assert_eq!(
            sources,
            vec![SegmentSource::Original, SegmentSource::Rendered, SegmentSource::Original]
        );
        assert_eq!(plan.segments[1].path, plan.renders[0].output);
        assert!(plan.renders[0].output.starts_with(&plan.work_dir));
        assert!(plan.work_dir.ends_with(format!("atacut_{}", id)));
        assert!(plan.manifest().starts_with(&plan.work_dir));
    }

    #[test]
    fn test_colliding_clip_ids_render_to_distinct_segments() {
        let graded = |id: &str| {
            let mut clip = Clip::media(id, format!("/media/{}.mp4", id), 5.0);
            clip.grading.brightness = 20.0;
            clip
        };
        let louder = |id: &str| {
            let mut clip = Clip::media(id, "/media/loud.mp4", 5.0);
            clip.volume = 1.5;
            clip
        };
        let mut descriptor = job(vec![graded("a.1"), graded("a_1"), louder("dup")]);
        descriptor.tracks.push(Track {
            id: "v2".to_string(),
            clips: vec![louder("dup")],
        });
        let plan = ExportPlan::build(JobId::new(), &descriptor, Path::new("/tmp"), &ctx()).unwrap();

        let outputs: Vec<&PathBuf> = plan.renders.iter().map(|r| &r.output).collect();
        assert_eq!(outputs.len(), 4);
        for (i, left) in outputs.iter().enumerate() {
            for right in &outputs[i + 1..] {
                assert_ne!(left, right);
            }
        }
        let manifest: Vec<PathBuf> = plan.segment_paths();
        assert_eq!(manifest, outputs.into_iter().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_job_cannot_be_planned() {
        let result = ExportPlan::build(JobId::new(), &job(vec![]), Path::new("/tmp"), &ctx());
        assert!(matches!(result, Err(ExportError::InvalidJob(_))));
    }
}
