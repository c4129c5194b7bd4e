//! Filter-chain builder
//!
//! Maps a clip's visual adjustments to an ordered list of ffmpeg video
//! filter fragments. Building is pure: no I/O and no failure modes. Unknown
//! or unsupported effect and transition types are skipped.

use std::fmt;

use crate::domain::model::*;

pub mod keyframes;
pub mod text;

pub use text::{build_text_overlay, escape_drawtext};

use keyframes::{piecewise_expr, sample_property, AnimatedProperty};

/// Frame rate assumed when converting zoom durations to frame counts
const ZOOM_FRAME_RATE: f64 = 25.0;

/// Reference frame used to place text overlays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// `eq` parameter driven by a single effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqParam {
    Brightness,
    Contrast,
    Saturation,
}

impl EqParam {
    fn name(self) -> &'static str {
        match self {
            EqParam::Brightness => "brightness",
            EqParam::Contrast => "contrast",
            EqParam::Saturation => "saturation",
        }
    }
}

/// One ffmpeg video filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterFragment {
    ChromaKey {
        color: String,
        similarity: f64,
        blend: f64,
    },
    ColorGrade {
        brightness: f64,
        contrast: f64,
        saturation: f64,
        temperature: f64,
    },
    BoxBlur {
        radius: f64,
        power: Option<u32>,
    },
    Unsharp {
        amount: f64,
        chroma: bool,
    },
    Vintage,
    Sepia,
    Opacity(f64),
    FadeIn {
        start: f64,
        duration: f64,
        alpha: bool,
    },
    FadeOut {
        start: f64,
        duration: f64,
    },
    Eq {
        param: EqParam,
        value: f64,
    },
    Hue(f64),
    Scale {
        width: String,
        height: String,
        per_frame: bool,
    },
    Rotate {
        degrees: String,
        animated: bool,
    },
    Zoom {
        frames: u32,
    },
    Speed(f64),
    DrawText {
        text: String,
        font_size: u32,
        font_color: String,
        x: u32,
        y: u32,
    },
}

const SEPIA_MATRIX: &str = "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131";

impl fmt::Display for FilterFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterFragment::ChromaKey {
                color,
                similarity,
                blend,
            } => write!(f, "chromakey={}:{}:{}", color, similarity, blend),
            FilterFragment::ColorGrade {
                brightness,
                contrast,
                saturation,
                temperature,
            } => {
                write!(
                    f,
                    "eq=brightness={}:contrast={}:saturation={}",
                    brightness, contrast, saturation
                )?;
                if *temperature != 0.0 {
                    write!(f, ",colorbalance=rs={}:gs=0:bs={}", temperature, -temperature)?;
                }
                Ok(())
            }
            FilterFragment::BoxBlur { radius, power } => match power {
                Some(power) => write!(f, "boxblur={}:{}", radius, power),
                None => write!(f, "boxblur={}", radius),
            },
            FilterFragment::Unsharp { amount, chroma } => {
                if *chroma {
                    write!(f, "unsharp=5:5:{}:5:5:0", amount)
                } else {
                    write!(f, "unsharp=5:5:{}", amount)
                }
            }
            FilterFragment::Vintage => f.write_str("curves=vintage,vignette=PI/4"),
            FilterFragment::Sepia => f.write_str(SEPIA_MATRIX),
            FilterFragment::Opacity(alpha) => write!(f, "colorchannelmixer=aa={}", alpha),
            FilterFragment::FadeIn {
                start,
                duration,
                alpha,
            } => {
                write!(f, "fade=t=in:st={}:d={}", start, duration)?;
                if *alpha {
                    f.write_str(":alpha=1")?;
                }
                Ok(())
            }
            FilterFragment::FadeOut { start, duration } => {
                write!(f, "fade=t=out:st={}:d={}", start, duration)
            }
            FilterFragment::Eq { param, value } => write!(f, "eq={}={}", param.name(), value),
            FilterFragment::Hue(degrees) => write!(f, "hue=h={}", degrees),
            FilterFragment::Scale {
                width,
                height,
                per_frame,
            } => {
                if *per_frame {
                    write!(f, "scale=w='{}':h='{}':eval=frame", width, height)
                } else {
                    write!(f, "scale={}:{}", width, height)
                }
            }
            FilterFragment::Rotate { degrees, animated } => {
                if *animated {
                    write!(f, "rotate='({})*PI/180'", degrees)
                } else {
                    write!(f, "rotate={}*PI/180", degrees)
                }
            }
            FilterFragment::Zoom { frames } => {
                write!(f, "zoompan=z='min(zoom+0.0015,1.5)':d={}", frames)
            }
            FilterFragment::Speed(speed) => write!(f, "setpts=PTS/{}", speed),
            FilterFragment::DrawText {
                text,
                font_size,
                font_color,
                x,
                y,
            } => write!(
                f,
                "drawtext=text='{}':fontsize={}:fontcolor={}:x={}:y={}",
                text, font_size, font_color, x, y
            ),
        }
    }
}

/// Ordered list of filter fragments for one clip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    fragments: Vec<FilterFragment>,
}

impl FilterChain {
    pub fn new(fragments: Vec<FilterFragment>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[FilterFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Serialize as a single `-vf` filter graph
    pub fn to_filter_graph(&self) -> String {
        self.fragments
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_filter_graph())
    }
}

/// `#rrggbb` to ffmpeg's `0xrrggbb`; named colours pass through
pub fn ffmpeg_color(color: &str) -> String {
    let trimmed = color.trim();
    match trimmed.strip_prefix('#') {
        Some(hex) => format!("0x{}", hex),
        None => trimmed.to_string(),
    }
}

/// Chain for a clip: text clips get their drawtext fragment, media clips the
/// full adjustment chain
pub fn build_clip_filters(clip: &Clip, canvas: Canvas) -> FilterChain {
    if clip.is_text_overlay() {
        build_text_overlay(clip, canvas)
    } else {
        build_filters(clip)
    }
}

/// Build the ordered filter chain for a media clip
pub fn build_filters(clip: &Clip) -> FilterChain {
    let mut fragments = Vec::new();

    if let Some(key) = clip.chroma_key.as_ref().filter(|key| key.enabled) {
        fragments.push(FilterFragment::ChromaKey {
            color: ffmpeg_color(&key.color),
            similarity: key.threshold / 100.0,
            blend: key.smoothing / 100.0,
        });
    }

    if !clip.grading.is_neutral() {
        fragments.push(grading_fragment(&clip.grading));
    }

    if let Some(fragment) = style_fragment(clip.filter, clip.filter_intensity) {
        fragments.push(fragment);
    }

    if clip.opacity != 100.0 {
        fragments.push(FilterFragment::Opacity(clip.opacity / 100.0));
    }

    if clip.fade_in > 0.0 {
        fragments.push(FilterFragment::FadeIn {
            start: 0.0,
            duration: clip.fade_in,
            alpha: false,
        });
    }

    if clip.fade_out > 0.0 {
        fragments.push(FilterFragment::FadeOut {
            start: (clip.source_span() - clip.fade_out).max(0.0),
            duration: clip.fade_out,
        });
    }

    fragments.extend(clip.effects.iter().filter_map(effect_fragment));

    if let Some(transform) = &clip.transform {
        fragments.extend(transform_fragments(transform));
    }

    fragments.extend(transition_fragments(clip));

    if clip.speed > 0.0 && clip.speed != 1.0 {
        fragments.push(FilterFragment::Speed(clip.speed));
    }

    FilterChain::new(fragments)
}

/// Brightness is an offset, contrast and saturation a multiplier centred on 1
fn grading_fragment(grading: &ColorGrading) -> FilterFragment {
    FilterFragment::ColorGrade {
        brightness: grading.brightness / 100.0,
        contrast: 1.0 + grading.contrast / 200.0,
        saturation: 1.0 + grading.saturation / 200.0,
        temperature: grading.temperature / 100.0,
    }
}

fn style_fragment(filter: StyleFilter, intensity: f64) -> Option<FilterFragment> {
    let intensity = (if intensity > 0.0 { intensity } else { 100.0 }) / 100.0;
    match filter {
        StyleFilter::Blur => Some(FilterFragment::BoxBlur {
            radius: 5.0 * intensity,
            power: Some(1),
        }),
        StyleFilter::Sharpen => Some(FilterFragment::Unsharp {
            amount: 1.5 * intensity,
            chroma: true,
        }),
        StyleFilter::Vintage => Some(FilterFragment::Vintage),
        StyleFilter::Sepia => Some(FilterFragment::Sepia),
        StyleFilter::None | StyleFilter::Unsupported => None,
    }
}

/// Fragment for one panel effect; disabled and unknown effects yield nothing
pub fn effect_fragment(effect: &Effect) -> Option<FilterFragment> {
    if !effect.enabled {
        return None;
    }
    let param_or = |name: &str, default: f64| {
        effect
            .param(name)
            .filter(|v| *v != 0.0)
            .unwrap_or(default)
    };

    match effect.kind {
        EffectKind::Brightness => Some(FilterFragment::Eq {
            param: EqParam::Brightness,
            value: param_or("value", 0.0),
        }),
        EffectKind::Contrast => Some(FilterFragment::Eq {
            param: EqParam::Contrast,
            value: param_or("value", 1.0),
        }),
        EffectKind::Saturation => Some(FilterFragment::Eq {
            param: EqParam::Saturation,
            value: param_or("value", 1.0),
        }),
        EffectKind::Hue => Some(FilterFragment::Hue(param_or("value", 0.0))),
        EffectKind::Blur => Some(FilterFragment::BoxBlur {
            radius: param_or("radius", 5.0),
            power: None,
        }),
        EffectKind::Sharpen => Some(FilterFragment::Unsharp {
            amount: param_or("amount", 1.0),
            chroma: false,
        }),
        EffectKind::Sepia => Some(FilterFragment::Sepia),
        EffectKind::Vignette | EffectKind::Lut | EffectKind::Unsupported => {
            tracing::debug!(kind = ?effect.kind, "Skipping effect without a filter mapping");
            None
        }
    }
}

/// Scale and rotation, static or keyframed
fn transform_fragments(transform: &Transform) -> Vec<FilterFragment> {
    let mut fragments = Vec::new();

    let uniform = sample_property(&transform.keyframes, AnimatedProperty::Scale);
    let axis = |property: AnimatedProperty, fallback: f64| {
        let points = sample_property(&transform.keyframes, property);
        if !points.is_empty() {
            Some(piecewise_expr(points))
        } else if !uniform.is_empty() {
            Some(piecewise_expr(uniform.clone()))
        } else {
            (fallback != 1.0).then(|| fallback.to_string())
        }
    };
    let animated_scale = transform.keyframes.iter().any(|kf| {
        matches!(
            AnimatedProperty::from_name(&kf.property),
            Some(AnimatedProperty::Scale | AnimatedProperty::ScaleX | AnimatedProperty::ScaleY)
        )
    });

    let scale_x = axis(AnimatedProperty::ScaleX, transform.scale_x);
    let scale_y = axis(AnimatedProperty::ScaleY, transform.scale_y);
    if scale_x.is_some() || scale_y.is_some() {
        let sx = scale_x.unwrap_or_else(|| transform.scale_x.to_string());
        let sy = scale_y.unwrap_or_else(|| transform.scale_y.to_string());
        fragments.push(if animated_scale {
            FilterFragment::Scale {
                width: format!("iw*({})", sx),
                height: format!("ih*({})", sy),
                per_frame: true,
            }
        } else {
            FilterFragment::Scale {
                width: format!("{}*iw", sx),
                height: format!("{}*ih", sy),
                per_frame: false,
            }
        });
    }

    let rotation = sample_property(&transform.keyframes, AnimatedProperty::Rotation);
    if !rotation.is_empty() {
        fragments.push(FilterFragment::Rotate {
            degrees: piecewise_expr(rotation),
            animated: true,
        });
    } else if transform.rotation != 0.0 {
        fragments.push(FilterFragment::Rotate {
            degrees: transform.rotation.to_string(),
            animated: false,
        });
    }

    fragments
}

/// In and out transitions expressible on a single input
fn transition_fragments(clip: &Clip) -> Vec<FilterFragment> {
    let mut fragments = Vec::new();

    if let Some(transition) = &clip.transitions.in_ {
        let duration = transition.duration_secs();
        match transition.kind {
            TransitionKind::Fade | TransitionKind::Crossfade | TransitionKind::FadeIn => {
                fragments.push(FilterFragment::FadeIn {
                    start: 0.0,
                    duration,
                    alpha: false,
                })
            }
            TransitionKind::Dissolve => fragments.push(FilterFragment::FadeIn {
                start: 0.0,
                duration,
                alpha: true,
            }),
            TransitionKind::Zoom => fragments.push(FilterFragment::Zoom {
                frames: (duration * ZOOM_FRAME_RATE).round().max(1.0) as u32,
            }),
            kind => {
                tracing::debug!(clip_id = %clip.id, ?kind, "Skipping in-transition");
            }
        }
    }

    if let Some(transition) = &clip.transitions.out {
        let duration = transition.duration_secs();
        match transition.kind {
            TransitionKind::Fade
            | TransitionKind::Crossfade
            | TransitionKind::FadeOut
            | TransitionKind::Dissolve => fragments.push(FilterFragment::FadeOut {
                start: (clip.source_span() - duration).max(0.0),
                duration,
            }),
            kind => {
                tracing::debug!(clip_id = %clip.id, ?kind, "Skipping out-transition");
            }
        }
    }

    fragments
}
