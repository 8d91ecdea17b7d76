//! Burn-in text overlay
//!
//! Lines are rendered with the 8x8 bitmap glyphs from `font8x8`, scaled by an integer
//! factor so the text height tracks the image size. Each line is drawn twice: a dilated
//! black stroke, then the white glyph on top, which keeps it readable on any background.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{DynamicImage, Rgb, RgbImage};

const GLYPH_SIZE: u32 = 8;
const STROKE_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const FILL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Layout knobs, all relative to the larger image dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkStyle {
    /// Glyph height as a fraction of max(width, height)
    pub text_height_ratio: f32,
    /// Baseline-to-baseline distance as a multiple of the glyph height
    pub line_spacing: f32,
    /// Distance from the anchored corner as a fraction of max(width, height)
    pub margin_ratio: f32,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            text_height_ratio: 0.03,
            line_spacing: 1.25,
            margin_ratio: 0.02,
        }
    }
}

/// Pixel metrics derived from a style for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    scale: u32,
    cell: u32,
    advance: u32,
    margin: u32,
    stroke: u32,
}

impl WatermarkStyle {
    fn layout(&self, width: u32, height: u32) -> Layout {
        let max_dim = width.max(height) as f32;
        let text_height = (max_dim * self.text_height_ratio).round() as u32;
        let scale = (text_height / GLYPH_SIZE).max(1);
        let cell = GLYPH_SIZE * scale;
        Layout {
            scale,
            cell,
            advance: ((cell as f32) * self.line_spacing).round() as u32,
            margin: ((max_dim * self.margin_ratio).round() as u32).max(scale * 2),
            stroke: (scale / 2).max(1),
        }
    }
}

/// Draw `lines` anchored to the bottom-left corner with the default style
pub fn draw_watermark(image: &DynamicImage, lines: &[String]) -> DynamicImage {
    draw_watermark_with_style(image, lines, &WatermarkStyle::default())
}

pub fn draw_watermark_with_style(
    image: &DynamicImage,
    lines: &[String],
    style: &WatermarkStyle,
) -> DynamicImage {
    let mut canvas = image.to_rgb8();
    if lines.is_empty() {
        return DynamicImage::ImageRgb8(canvas);
    }

    let layout = style.layout(canvas.width(), canvas.height());
    let line_count = lines.len() as i64;
    let origin_y = |index: usize| -> i64 {
        canvas.height() as i64
            - layout.margin as i64
            - layout.cell as i64
            - (line_count - 1 - index as i64) * layout.advance as i64
    };
    let origins: Vec<i64> = (0..lines.len()).map(origin_y).collect();

    for (line, y) in lines.iter().zip(&origins) {
        draw_line(&mut canvas, line, layout.margin as i64, *y, &layout, layout.stroke, STROKE_COLOR);
    }
    for (line, y) in lines.iter().zip(&origins) {
        draw_line(&mut canvas, line, layout.margin as i64, *y, &layout, 0, FILL_COLOR);
    }

    DynamicImage::ImageRgb8(canvas)
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn draw_line(
    canvas: &mut RgbImage,
    text: &str,
    x: i64,
    y: i64,
    layout: &Layout,
    grow: u32,
    color: Rgb<u8>,
) {
    let scale = layout.scale as i64;
    let grow = grow as i64;
    for (column, ch) in text.chars().enumerate() {
        let glyph_x = x + column as i64 * layout.cell as i64;
        if glyph_x >= canvas.width() as i64 {
            break;
        }
        for (row, bits) in glyph(ch).iter().enumerate() {
            for bit in 0..GLYPH_SIZE as i64 {
                // Bit 0 is the leftmost pixel
                if bits & (1 << bit) == 0 {
                    continue;
                }
                let px = glyph_x + bit * scale;
                let py = y + row as i64 * scale;
                fill_rect(
                    canvas,
                    px - grow,
                    py - grow,
                    scale + 2 * grow,
                    scale + 2 * grow,
                    color,
                );
            }
        }
    }
}

fn fill_rect(canvas: &mut RgbImage, x: i64, y: i64, width: i64, height: i64, color: Rgb<u8>) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width).min(canvas.width() as i64);
    let y1 = (y + height).min(canvas.height() as i64);
    for py in y0..y1 {
        for px in x0..x1 {
            canvas.put_pixel(px as u32, py as u32, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREY: Rgb<u8> = Rgb([128, 128, 128]);

    fn grey_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, GREY))
    }

    fn count(image: &RgbImage, color: Rgb<u8>) -> usize {
        image.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn test_layout_tracks_larger_dimension() {
        let style = WatermarkStyle::default();
        let layout = style.layout(4000, 3000);
        // 3% of 4000 = 120px text, 15x glyph scale
        assert_eq!(layout.scale, 15);
        assert_eq!(layout.cell, 120);
        assert_eq!(layout.advance, 150);
        assert_eq!(layout.margin, 80);

        let tiny = style.layout(40, 30);
        assert_eq!(tiny.scale, 1);
        assert_eq!(tiny.cell, 8);
    }

    #[test]
    fn test_text_is_burned_in_bottom_left() {
        let lines = vec!["UTC 2024-01-01 00:00:00Z".to_string(), "GPS None".to_string()];
        let result = draw_watermark(&grey_image(800, 600), &lines).to_rgb8();

        assert_eq!(result.dimensions(), (800, 600));
        assert!(count(&result, FILL_COLOR) > 0);
        assert!(count(&result, STROKE_COLOR) > 0);

        // Top half is never touched by a bottom-anchored block of two lines
        for y in 0..300 {
            for x in 0..800 {
                assert_eq!(result.get_pixel(x, y), &GREY);
            }
        }
    }

    #[test]
    fn test_fill_is_drawn_over_stroke() {
        let lines = vec!["#".to_string()];
        let result = draw_watermark(&grey_image(400, 400), &lines).to_rgb8();
        let white = count(&result, FILL_COLOR);
        let black = count(&result, STROKE_COLOR);
        assert!(white > 0);
        // The stroke only shows as an outline around the glyph
        assert!(black > 0);
    }

    #[test]
    fn test_empty_lines_leave_pixels_unchanged() {
        let source = grey_image(50, 40);
        let result = draw_watermark(&source, &[]);
        assert_eq!(result.to_rgb8(), source.to_rgb8());
    }

    #[test]
    fn test_long_lines_clip_without_panicking() {
        let lines = vec!["x".repeat(500), "±".repeat(10)];
        let result = draw_watermark(&grey_image(64, 16), &lines);
        assert_eq!((result.width(), result.height()), (64, 16));
    }

    #[test]
    fn test_glyph_fallback() {
        assert_ne!(glyph('A'), [0; 8]);
        assert_ne!(glyph('±'), [0; 8]);
        assert_eq!(glyph('\u{4e2d}'), glyph('?'));
    }
}
