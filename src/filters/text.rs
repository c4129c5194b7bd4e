//! Text overlay (drawtext) fragments

use crate::domain::model::{Clip, TextOverlay};
use crate::filters::{ffmpeg_color, Canvas, FilterChain, FilterFragment};

/// Escape text for a drawtext `text='...'` value
///
/// Backslash goes first so later escapes are not doubled.
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('[', "\\[")
        .replace(']', "\\]")
        .replace(',', "\\,")
}

/// Pixel position of a fractional anchor, clamped to the canvas
pub fn anchor_position(canvas: Canvas, x: f64, y: f64) -> (u32, u32) {
    let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.5 };
    (
        (canvas.width as f64 * clamp(x)).round() as u32,
        (canvas.height as f64 * clamp(y)).round() as u32,
    )
}

/// Drawtext fragment for a text overlay
pub fn drawtext_fragment(overlay: &TextOverlay, canvas: Canvas) -> FilterFragment {
    let (x, y) = anchor_position(canvas, overlay.position_x, overlay.position_y);
    let font_size = if overlay.font_size == 0 {
        TextOverlay::default().font_size
    } else {
        overlay.font_size
    };
    FilterFragment::DrawText {
        text: escape_drawtext(&overlay.text),
        font_size,
        font_color: ffmpeg_color(&overlay.color),
        x,
        y,
    }
}

/// Single-fragment chain for a text clip; empty for media clips
pub fn build_text_overlay(clip: &Clip, canvas: Canvas) -> FilterChain {
    match &clip.text {
        Some(overlay) => FilterChain::new(vec![drawtext_fragment(overlay, canvas)]),
        None => FilterChain::default(),
    }
}
