//! Keyframe animation rendered as ffmpeg time expressions

use crate::domain::model::{Easing, Keyframe};

/// Intermediate samples inserted between two keyframes with a non-linear easing
const EASING_SAMPLES: usize = 8;

/// Properties that can be animated through a single-input filter chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatedProperty {
    Scale,
    ScaleX,
    ScaleY,
    Rotation,
}

impl AnimatedProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "scale" => Some(AnimatedProperty::Scale),
            "scaleX" | "scale_x" => Some(AnimatedProperty::ScaleX),
            "scaleY" | "scale_y" => Some(AnimatedProperty::ScaleY),
            "rotation" | "rotate" => Some(AnimatedProperty::Rotation),
            _ => None,
        }
    }
}

/// Keyframes of one property as `(time, value)` samples sorted by time,
/// easing curves expanded into linear segments
pub fn sample_property(keyframes: &[Keyframe], property: AnimatedProperty) -> Vec<(f64, f64)> {
    let mut frames: Vec<&Keyframe> = keyframes
        .iter()
        .filter(|kf| AnimatedProperty::from_name(&kf.property) == Some(property))
        .filter(|kf| kf.time.is_finite() && kf.value.is_finite())
        .collect();
    frames.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut points = Vec::with_capacity(frames.len());
    for pair in frames.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        points.push((from.time, from.value));
        if matches!(from.easing, Easing::Linear | Easing::Other) {
            continue;
        }
        for step in 1..EASING_SAMPLES {
            let fraction = step as f64 / EASING_SAMPLES as f64;
            let eased = from.easing.apply(fraction);
            points.push((
                from.time + (to.time - from.time) * fraction,
                from.value + (to.value - from.value) * eased,
            ));
        }
    }
    if let Some(last) = frames.last() {
        points.push((last.time, last.value));
    }
    points
}

/// Piecewise-linear expression in `t` through the given points; holds the
/// first value before the first point and the last value after the last
pub fn piecewise_expr(mut points: Vec<(f64, f64)>) -> String {
    if points.is_empty() {
        return "0".to_string();
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut sanitized: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for (t, v) in points {
        if let Some((last_t, last_v)) = sanitized.last_mut() {
            if (t - *last_t).abs() < 1e-4 {
                *last_t = t;
                *last_v = v;
                continue;
            }
        }
        sanitized.push((t, v));
    }

    let (first_t, first_v) = sanitized[0];
    let (_, last_v) = sanitized[sanitized.len() - 1];
    if sanitized.len() == 1 {
        return format!("{:.6}", first_v);
    }

    let mut expr = format!("{:.6}", last_v);
    for idx in (0..sanitized.len() - 1).rev() {
        let (t0, v0) = sanitized[idx];
        let (t1, v1) = sanitized[idx + 1];
        let interp = format!(
            "{v0:.6}+({delta:.6})*(t-{t0:.6})/{dur:.6}",
            delta = v1 - v0,
            dur = (t1 - t0).max(1e-4)
        );
        expr = format!("if(lt(t,{t1:.6}),{interp},{tail})", tail = expr);
    }
    format!("if(lt(t,{first_t:.6}),{first_v:.6},{expr})")
}
