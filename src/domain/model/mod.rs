// Domain models - Export jobs, timeline clips and encode settings

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExportError, ExportResult};
use crate::utils::path::normalize_media_reference;

/// Tolerance used when comparing trim points against source duration
pub const TIME_EPSILON: f64 = 1e-6;

fn default_unity() -> f64 {
    1.0
}

fn default_percent() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

/// Colour grading adjustments, each on a [-100, 100] scale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColorGrading {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub temperature: f64,
}

impl ColorGrading {
    /// True when no component departs from neutral
    pub fn is_neutral(&self) -> bool {
        self.brightness == 0.0
            && self.contrast == 0.0
            && self.saturation == 0.0
            && self.temperature == 0.0
    }
}

/// Stylistic look applied on top of grading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleFilter {
    #[default]
    None,
    Blur,
    Sharpen,
    Vintage,
    Sepia,
    /// Any filter name this exporter does not know how to render
    #[serde(other)]
    Unsupported,
}

/// Transition styles understood by the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Fade,
    Dissolve,
    Crossfade,
    FadeIn,
    FadeOut,
    Wipe,
    Slide,
    Zoom,
    Blur,
    #[serde(other)]
    Unsupported,
}

/// A clip's in or out transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    /// Duration in milliseconds
    #[serde(rename = "duration", default = "Transition::default_duration_ms")]
    pub duration_ms: f64,
}

impl Transition {
    fn default_duration_ms() -> f64 {
        1000.0
    }

    pub fn new(kind: TransitionKind, duration_ms: f64) -> Self {
        Self {
            id: None,
            kind,
            duration_ms,
        }
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms / 1000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transitions {
    #[serde(default, rename = "in")]
    pub in_: Option<Transition>,
    #[serde(default)]
    pub out: Option<Transition>,
}

impl Transitions {
    pub fn any(&self) -> bool {
        self.in_.is_some() || self.out.is_some()
    }
}

/// Green-screen removal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChromaKey {
    pub enabled: bool,
    /// Key colour as `#rrggbb`
    pub color: String,
    /// Similarity threshold, 0-100
    pub threshold: f64,
    /// Edge smoothing, 0-100
    pub smoothing: f64,
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self {
            enabled: true,
            color: "#00ff00".to_string(),
            threshold: 40.0,
            smoothing: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Cubic,
    /// Curves without an expression form (bounce, elastic) render linearly
    #[serde(other)]
    Other,
}

impl Easing {
    /// Map linear progress `t` in [0, 1] onto the eased curve
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::Cubic => t * t * t,
            Easing::Linear | Easing::Other => t,
        }
    }
}

/// Animated property value at a clip-local time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    #[serde(default)]
    pub id: Option<String>,
    /// Seconds relative to clip start
    pub time: f64,
    pub property: String,
    pub value: f64,
    #[serde(default)]
    pub easing: Easing,
}

/// Spatial transform of a clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transform {
    pub scale_x: f64,
    pub scale_y: f64,
    /// Degrees clockwise
    pub rotation: f64,
    pub keyframes: Vec<Keyframe>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            keyframes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Brightness,
    Contrast,
    Saturation,
    Hue,
    Blur,
    Sharpen,
    Sepia,
    Vignette,
    Lut,
    #[serde(other)]
    Unsupported,
}

/// An effect attached to a clip from the effects panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: EffectKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: None,
            kind,
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.parameters
            .insert(name.to_string(), serde_json::Value::from(value));
        self
    }

    /// Numeric parameter, accepting numbers and numeric strings
    pub fn param(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Text drawn by a text clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextOverlay {
    pub text: String,
    pub font_size: u32,
    pub font_family: String,
    /// Fill colour as `#rrggbb`
    pub color: String,
    /// Horizontal anchor as a fraction of canvas width
    pub position_x: f64,
    /// Vertical anchor as a fraction of canvas height
    pub position_y: f64,
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 32,
            font_family: "Arial".to_string(),
            color: "#FFFFFF".to_string(),
            position_x: 0.5,
            position_y: 0.5,
        }
    }
}

/// A timeline clip as consumed by export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    /// Source media path or `file://` URI; absent for text clips
    #[serde(default, alias = "path", alias = "mediaId")]
    pub media_path: Option<String>,
    /// Position on the timeline in seconds
    #[serde(default)]
    pub start_time: f64,
    /// Nominal full duration of the source in seconds
    pub duration: f64,
    #[serde(default)]
    pub trim_start: f64,
    /// Trim out point; defaults to the full duration
    #[serde(default)]
    pub trim_end: Option<f64>,
    #[serde(default = "default_unity")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_unity")]
    pub speed: f64,
    /// 0-100
    #[serde(default = "default_percent")]
    pub opacity: f64,
    #[serde(default, flatten)]
    pub grading: ColorGrading,
    #[serde(default)]
    pub filter: StyleFilter,
    /// 0-100
    #[serde(default = "default_percent")]
    pub filter_intensity: f64,
    #[serde(default)]
    pub fade_in: f64,
    #[serde(default)]
    pub fade_out: f64,
    #[serde(default)]
    pub transitions: Transitions,
    #[serde(default)]
    pub chroma_key: Option<ChromaKey>,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default, alias = "textOverlay")]
    pub text: Option<TextOverlay>,
}

impl Clip {
    /// A plain media clip covering its whole source
    pub fn media(id: impl Into<String>, media_path: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            media_path: Some(media_path.into()),
            start_time: 0.0,
            duration,
            trim_start: 0.0,
            trim_end: Some(duration),
            volume: 1.0,
            muted: false,
            speed: 1.0,
            opacity: 100.0,
            grading: ColorGrading::default(),
            filter: StyleFilter::None,
            filter_intensity: 100.0,
            fade_in: 0.0,
            fade_out: 0.0,
            transitions: Transitions::default(),
            chroma_key: None,
            transform: None,
            effects: Vec::new(),
            text: None,
        }
    }

    /// A text overlay clip lasting `duration` seconds
    pub fn text(id: impl Into<String>, overlay: TextOverlay, duration: f64) -> Self {
        let mut clip = Self::media(id, String::new(), duration);
        clip.media_path = None;
        clip.text = Some(overlay);
        clip
    }

    pub fn with_trim(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.trim_start = trim_start;
        self.trim_end = Some(trim_end);
        self
    }

    /// Derived flag distinguishing text clips from media clips
    pub fn is_text_overlay(&self) -> bool {
        self.text.is_some()
    }

    /// Effective trim out point
    pub fn trim_out(&self) -> f64 {
        self.trim_end.unwrap_or(self.duration)
    }

    /// Length of the used source window in seconds
    pub fn source_span(&self) -> f64 {
        (self.trim_out() - self.trim_start).max(0.0)
    }

    /// Length on the timeline after speed change
    pub fn timeline_duration(&self) -> f64 {
        if self.speed > 0.0 {
            self.source_span() / self.speed
        } else {
            self.source_span()
        }
    }

    /// True when the trim window covers the full source
    pub fn is_untrimmed(&self) -> bool {
        self.trim_start <= TIME_EPSILON && (self.trim_out() - self.duration).abs() <= TIME_EPSILON
    }

    /// Check the clip's invariants
    pub fn validate(&self) -> ExportResult<()> {
        if self.trim_start < 0.0 || self.duration < 0.0 {
            return Err(ExportError::InvalidJob(format!(
                "clip {}: times cannot be negative",
                self.id
            )));
        }
        if self.trim_out() + TIME_EPSILON < self.trim_start {
            return Err(ExportError::InvalidJob(format!(
                "clip {}: trim out ({:.3}s) is before trim in ({:.3}s)",
                self.id,
                self.trim_out(),
                self.trim_start
            )));
        }
        if self.speed <= 0.0 {
            return Err(ExportError::InvalidJob(format!(
                "clip {}: speed must be positive",
                self.id
            )));
        }
        if !self.is_text_overlay()
            && self.media_path.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(ExportError::InvalidJob(format!(
                "clip {} has no media path",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

/// Named encoder backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareAccel {
    #[default]
    Software,
    Nvenc,
    Qsv,
    Vaapi,
}

impl HardwareAccel {
    pub const ALL: [HardwareAccel; 4] = [
        HardwareAccel::Software,
        HardwareAccel::Nvenc,
        HardwareAccel::Qsv,
        HardwareAccel::Vaapi,
    ];

    pub fn is_software(self) -> bool {
        self == HardwareAccel::Software
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HardwareAccel::Software => "software",
            HardwareAccel::Nvenc => "nvenc",
            HardwareAccel::Qsv => "qsv",
            HardwareAccel::Vaapi => "vaapi",
        }
    }
}

impl fmt::Display for HardwareAccel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareAccel {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "software" | "none" | "cpu" => Ok(HardwareAccel::Software),
            "nvenc" => Ok(HardwareAccel::Nvenc),
            "qsv" => Ok(HardwareAccel::Qsv),
            "vaapi" => Ok(HardwareAccel::Vaapi),
            other => Err(ExportError::Config(format!(
                "Invalid hardware acceleration: {}. Valid values: software, nvenc, qsv, vaapi",
                other
            ))),
        }
    }
}

/// Video codec family used to pick an encoder name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecFamily {
    H264,
    H265,
}

/// Target encode settings for an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportSettings {
    /// Container format
    pub format: String,
    /// Video codec (`h264`, `h265`, `libx264`, `hevc`...)
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub audio_codec: String,
    pub hardware_accel: HardwareAccel,
    pub preset: Option<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: "mp4".to_string(),
            codec: "h264".to_string(),
            width: 1920,
            height: 1080,
            fps: 30.0,
            video_bitrate: "8M".to_string(),
            audio_bitrate: "192k".to_string(),
            audio_codec: "aac".to_string(),
            hardware_accel: HardwareAccel::Software,
            preset: None,
        }
    }
}

impl ExportSettings {
    pub fn codec_family(&self) -> VideoCodecFamily {
        let codec = self.codec.to_lowercase();
        if codec.contains("265") || codec.contains("hevc") {
            VideoCodecFamily::H265
        } else {
            VideoCodecFamily::H264
        }
    }

    /// File extension for intermediate and final segments
    pub fn extension(&self) -> &str {
        let format = self.format.trim().trim_start_matches('.');
        if format.is_empty() {
            "mp4"
        } else {
            format
        }
    }

    pub fn validate(&self) -> ExportResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::InvalidJob(
                "output dimensions cannot be zero".to_string(),
            ));
        }
        if self.fps <= 0.0 {
            return Err(ExportError::InvalidJob(
                "frame rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Submission payload for one export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub output_path: PathBuf,
    #[serde(default)]
    pub settings: ExportSettings,
    pub tracks: Vec<Track>,
}

impl JobDescriptor {
    /// Clips in original timeline order (track by track)
    pub fn clips(&self) -> Vec<Clip> {
        self.tracks
            .iter()
            .flat_map(|track| track.clips.iter().cloned())
            .collect()
    }

    /// Validate the descriptor and normalize media references
    pub fn normalized(mut self) -> ExportResult<Self> {
        if self.output_path.as_os_str().is_empty() {
            return Err(ExportError::InvalidJob("output path is empty".to_string()));
        }
        self.settings.validate()?;

        let mut clip_count = 0;
        for track in &mut self.tracks {
            for clip in &mut track.clips {
                if let Some(path) = clip.media_path.take() {
                    clip.media_path = Some(normalize_media_reference(&path));
                }
                clip.validate()?;
                clip_count += 1;
            }
        }
        if clip_count == 0 {
            return Err(ExportError::InvalidJob("no clips to export".to_string()));
        }
        Ok(self)
    }
}

/// Unique export job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short prefix for file names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|e| ExportError::InvalidJob(format!("invalid job id {}: {}", s, e)))
    }
}

/// Export job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// No transitions leave a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Sub-step of a processing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportStep {
    Analyzing,
    Rendering { index: usize, total: usize },
    Concatenating,
}

impl fmt::Display for ExportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStep::Analyzing => write!(f, "analyzing clips"),
            ExportStep::Rendering { index, total } => {
                write!(f, "rendering clip {}/{}", index + 1, total)
            }
            ExportStep::Concatenating => write!(f, "concatenating"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    File,
    Directory,
}

/// Filesystem path created while a job runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TempArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl TempArtifact {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::File,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Directory,
        }
    }
}

/// Read-only view of a job handed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub step: Option<ExportStep>,
    pub output_path: PathBuf,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub temp_artifacts: Vec<PathBuf>,
}

/// One user-requested export, owned by the export queue
#[derive(Debug, Clone)]
pub struct ExportJob {
    id: JobId,
    descriptor: JobDescriptor,
    status: JobStatus,
    progress: u8,
    step: Option<ExportStep>,
    queued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    temp_artifacts: Vec<TempArtifact>,
    cleaned_up: bool,
}

impl ExportJob {
    /// Create a job in the `queued` state
    pub fn new(descriptor: JobDescriptor) -> Self {
        Self {
            id: JobId::new(),
            descriptor,
            status: JobStatus::Queued,
            progress: 0,
            step: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            temp_artifacts: Vec::new(),
            cleaned_up: false,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn temp_artifacts(&self) -> &[TempArtifact] {
        &self.temp_artifacts
    }

    /// queued -> processing
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.step = Some(ExportStep::Analyzing);
        true
    }

    /// Raise progress; values never decrease and are ignored outside `processing`
    pub fn advance(&mut self, progress: u8, step: Option<ExportStep>) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let progress = progress.min(100).max(self.progress);
        let step = step.or(self.step);
        if progress == self.progress && step == self.step {
            return false;
        }
        self.progress = progress;
        self.step = step;
        true
    }

    /// processing -> completed
    pub fn complete(&mut self) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.step = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// processing -> failed
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.step = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// queued | processing -> cancelled
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.error = None;
        self.step = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Record a temp artifact; the list only grows until cleanup
    pub fn record_artifact(&mut self, artifact: TempArtifact) -> bool {
        if self.cleaned_up || self.temp_artifacts.contains(&artifact) {
            return false;
        }
        self.temp_artifacts.push(artifact);
        true
    }

    /// Hand over the artifacts for deletion; yields them exactly once
    pub fn take_artifacts(&mut self) -> Vec<TempArtifact> {
        if self.cleaned_up {
            return Vec::new();
        }
        self.cleaned_up = true;
        std::mem::take(&mut self.temp_artifacts)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status,
            progress: self.progress,
            step: self.step,
            output_path: self.descriptor.output_path.clone(),
            queued_at: self.queued_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self.error.clone(),
            temp_artifacts: self
                .temp_artifacts
                .iter()
                .map(|a| a.path.clone())
                .collect(),
        }
    }
}
