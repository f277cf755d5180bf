/// Raster backend: burns captions into a decoded pixel surface.
///
/// Purely functional over its inputs; identical inputs produce
/// byte-identical output.
use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::io::Cursor;
use std::sync::OnceLock;

use super::{check_source, non_blank, CaptionStyle, RenderError};

static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");

fn caption_font() -> &'static FontRef<'static> {
    static FONT: OnceLock<FontRef<'static>> = OnceLock::new();
    FONT.get_or_init(|| {
        FontRef::try_from_slice(FONT_BYTES).expect("embedded caption font parses")
    })
}

/// Decode `source`, draw the captions, and re-encode as PNG.
pub fn render_image(
    source: &[u8],
    top: Option<&str>,
    bottom: Option<&str>,
    style: &CaptionStyle,
    max_bytes: usize,
) -> Result<Vec<u8>, RenderError> {
    check_source(source, max_bytes, top, bottom)?;

    let decoded =
        image::load_from_memory(source).map_err(|_| RenderError::UnsupportedFormat)?;
    let mut canvas = decoded.to_rgba8();
    let (width, height) = canvas.dimensions();

    let font_px = style.resolved_font_px(width);
    let stroke_px = style.resolved_stroke_px(font_px);

    if let Some(text) = non_blank(top) {
        let midline = match style.top_y_percent {
            Some(percent) => height as f32 * CaptionStyle::clamped_percent(percent) / 100.0,
            None => font_px,
        };
        draw_caption(&mut canvas, text, midline as i32, font_px, stroke_px, style);
    }
    if let Some(text) = non_blank(bottom) {
        let midline = match style.bottom_y_percent {
            Some(percent) => height as f32 * CaptionStyle::clamped_percent(percent) / 100.0,
            None => height as f32 - font_px,
        };
        draw_caption(&mut canvas, text, midline as i32, font_px, stroke_px, style);
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out)
}

/// Draw one uppercased caption centered horizontally, its text midline at
/// `midline_y`. The outline pass runs first so it never occludes the fill.
fn draw_caption(
    canvas: &mut RgbaImage,
    text: &str,
    midline_y: i32,
    font_px: f32,
    stroke_px: f32,
    style: &CaptionStyle,
) {
    let text = text.to_uppercase();
    let font = caption_font();
    let scale = PxScale::from(font_px);

    let (text_w, text_h) = text_size(scale, font, &text);
    let x = (canvas.width() as i32 - text_w as i32) / 2;
    let y = midline_y - text_h as i32 / 2;

    let radius = stroke_px.round() as i32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx == 0 && dy == 0 {
                continue;
            }
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            draw_text_mut(canvas, Rgba(style.stroke), x + dx, y + dy, scale, font, &text);
        }
    }
    draw_text_mut(canvas, Rgba(style.fill), x, y, scale, font, &text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_UPLOAD_BYTES;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_render_is_deterministic() {
        let source = sample_png(300, 200);
        let style = CaptionStyle::default();

        let a = render_image(&source, Some("TOP"), Some("BOTTOM"), &style, MAX_UPLOAD_BYTES)
            .unwrap();
        let b = render_image(&source, Some("TOP"), Some("BOTTOM"), &style, MAX_UPLOAD_BYTES)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_changes_pixels_and_keeps_dimensions() {
        let source = sample_png(300, 200);
        let out = render_image(
            &source,
            Some("hello"),
            None,
            &CaptionStyle::default(),
            MAX_UPLOAD_BYTES,
        )
        .unwrap();

        let rendered = image::load_from_memory(&out).unwrap();
        assert_eq!(rendered.width(), 300);
        assert_eq!(rendered.height(), 200);
        // The caption must actually have been drawn.
        assert_ne!(out, source);
    }

    #[test]
    fn test_single_caption_is_enough() {
        let source = sample_png(120, 120);
        let style = CaptionStyle::default();
        assert!(render_image(&source, Some("hi"), None, &style, MAX_UPLOAD_BYTES).is_ok());
        assert!(render_image(&source, None, Some("hi"), &style, MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn test_both_captions_blank_rejected() {
        let source = sample_png(120, 120);
        let result = render_image(
            &source,
            Some(""),
            Some("   "),
            &CaptionStyle::default(),
            MAX_UPLOAD_BYTES,
        );
        assert!(matches!(result, Err(RenderError::EmptyCaption)));
    }

    #[test]
    fn test_oversized_payload_rejected_before_decode() {
        // Not an image at all; the size guard must fire first.
        let source = vec![0u8; MAX_UPLOAD_BYTES + 1];
        let result = render_image(
            &source,
            Some("hi"),
            None,
            &CaptionStyle::default(),
            MAX_UPLOAD_BYTES,
        );
        assert!(matches!(result, Err(RenderError::PayloadTooLarge)));
    }

    #[test]
    fn test_undecodable_bytes_rejected() {
        let result = render_image(
            b"definitely not an image",
            Some("hi"),
            None,
            &CaptionStyle::default(),
            MAX_UPLOAD_BYTES,
        );
        assert!(matches!(result, Err(RenderError::UnsupportedFormat)));
    }

    #[test]
    fn test_custom_style_applies() {
        let source = sample_png(300, 200);
        let custom = CaptionStyle {
            font_px: Some(32.0),
            stroke_px: Some(0.0),
            fill: [255, 0, 0, 255],
            ..CaptionStyle::default()
        };
        let default_out = render_image(
            &source,
            Some("hi"),
            None,
            &CaptionStyle::default(),
            MAX_UPLOAD_BYTES,
        )
        .unwrap();
        let custom_out =
            render_image(&source, Some("hi"), None, &custom, MAX_UPLOAD_BYTES).unwrap();
        assert_ne!(default_out, custom_out);
    }
}
