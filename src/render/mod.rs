/// Overlay renderer: composes caption text onto uploaded media.
///
/// Two backends behind one interface: a raster surface for images
/// (`image.rs`) and a delegated external encoder for video (`video.rs`).
/// Both share the payload-size and blank-caption guards here.
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod image;
pub mod video;

/// Maximum characters per caption.
pub const MAX_CAPTION_CHARS: usize = 100;

pub const MIN_FONT_PX: f32 = 16.0;
pub const MAX_FONT_PX: f32 = 120.0;
pub const MAX_STROKE_PX: f32 = 8.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("File could not be decoded as the declared media type")]
    UnsupportedFormat,

    #[error("At least one caption (top or bottom) is required")]
    EmptyCaption,

    #[error("File exceeds the upload size limit")]
    PayloadTooLarge,

    #[error("Video overlay rendering is not available on this deployment")]
    Unsupported,

    #[error("Failed to produce output: {0}")]
    Encode(String),
}

/// Caption appearance. Every field has a baseline default (white fill,
/// black stroke, scale-invariant sizing); overrides are clamped to sane
/// ranges rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    /// Fixed font size in pixels (16-120). None scales with image width.
    pub font_px: Option<f32>,
    /// Outline width in pixels (0-8). None derives from the font size.
    pub stroke_px: Option<f32>,
    pub fill: [u8; 4],
    pub stroke: [u8; 4],
    /// Vertical anchor for the top caption, percent of height (5-95).
    pub top_y_percent: Option<f32>,
    /// Vertical anchor for the bottom caption, percent of height (5-95).
    pub bottom_y_percent: Option<f32>,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_px: None,
            stroke_px: None,
            fill: [255, 255, 255, 255],
            stroke: [0, 0, 0, 255],
            top_y_percent: None,
            bottom_y_percent: None,
        }
    }
}

impl CaptionStyle {
    /// Font size in pixels for a surface of the given width. The size grows
    /// with image width so captions stay legible across resolutions.
    pub fn resolved_font_px(&self, width: u32) -> f32 {
        match self.font_px {
            Some(px) => px.clamp(MIN_FONT_PX, MAX_FONT_PX),
            None => (width as f32 / 15.0).max(20.0),
        }
    }

    pub fn resolved_stroke_px(&self, font_px: f32) -> f32 {
        match self.stroke_px {
            Some(px) => px.clamp(0.0, MAX_STROKE_PX),
            None => font_px / 15.0,
        }
    }

    pub fn clamped_percent(percent: f32) -> f32 {
        percent.clamp(5.0, 95.0)
    }
}

/// Trimmed caption text, or None if absent or whitespace-only.
pub(crate) fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Shared pre-decode guards for both render backends.
pub(crate) fn check_source(
    source: &[u8],
    max_bytes: usize,
    top: Option<&str>,
    bottom: Option<&str>,
) -> Result<(), RenderError> {
    if source.len() > max_bytes {
        return Err(RenderError::PayloadTooLarge);
    }
    if non_blank(top).is_none() && non_blank(bottom).is_none() {
        return Err(RenderError::EmptyCaption);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_clamping() {
        let style = CaptionStyle {
            font_px: Some(500.0),
            stroke_px: Some(99.0),
            ..CaptionStyle::default()
        };
        assert_eq!(style.resolved_font_px(1000), 120.0);
        assert_eq!(style.resolved_stroke_px(60.0), 8.0);

        let tiny = CaptionStyle {
            font_px: Some(1.0),
            ..CaptionStyle::default()
        };
        assert_eq!(tiny.resolved_font_px(1000), 16.0);

        assert_eq!(CaptionStyle::clamped_percent(0.0), 5.0);
        assert_eq!(CaptionStyle::clamped_percent(100.0), 95.0);
        assert_eq!(CaptionStyle::clamped_percent(50.0), 50.0);
    }

    #[test]
    fn test_scale_invariant_font_size() {
        let style = CaptionStyle::default();
        // Wide images scale with width, narrow images hit the floor.
        assert_eq!(style.resolved_font_px(600), 40.0);
        assert_eq!(style.resolved_font_px(150), 20.0);
        assert_eq!(style.resolved_stroke_px(45.0), 3.0);
    }

    #[test]
    fn test_guards() {
        assert!(matches!(
            check_source(&[0u8; 8], 4, Some("hi"), None),
            Err(RenderError::PayloadTooLarge)
        ));
        assert!(matches!(
            check_source(&[0u8; 8], 1024, Some("  "), Some("")),
            Err(RenderError::EmptyCaption)
        ));
        assert!(check_source(&[0u8; 8], 1024, None, Some("hi")).is_ok());
    }
}
