#![forbid(unsafe_code)]

//! Text layout and rasterization.
//!
//! Text is broken on explicit `\n` only; there is no automatic wrapping.
//! The block is centered horizontally and vertically, then shifted by the
//! configured offset (positive moves up). Glyphs are alpha-blended onto
//! whatever is already in the image.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use hassdeck_core::color::Rgb;
use image::RgbImage;

/// Draw `text` centered on `image`.
pub fn draw_text(image: &mut RgbImage, font: &FontArc, text: &str, size: u32, offset: i32, color: Rgb) {
    if text.is_empty() {
        return;
    }
    let (w, h) = image.dimensions();
    let scale = PxScale::from(size as f32);
    let scaled = font.as_scaled(scale);
    let line_height = scaled.ascent() - scaled.descent() + scaled.line_gap();

    let lines: Vec<&str> = text.split('\n').collect();
    let block_height = line_height * lines.len() as f32;
    let mut baseline_y = (h as f32 - block_height) / 2.0 + scaled.ascent() - offset as f32;

    for line in lines {
        let line_width: f32 = line
            .chars()
            .map(|c| scaled.h_advance(font.glyph_id(c)))
            .sum();
        let mut x = (w as f32 - line_width) / 2.0;
        for c in line.chars() {
            let id = font.glyph_id(c);
            let glyph = id.with_scale_and_position(scale, point(x, baseline_y));
            x += scaled.h_advance(id);
            let Some(outline) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outline.px_bounds();
            outline.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px < 0 || py < 0 || px >= w as i32 || py >= h as i32 {
                    return;
                }
                let pixel = image.get_pixel_mut(px as u32, py as u32);
                let base = Rgb::new(pixel[0], pixel[1], pixel[2]);
                let blended = base.mixed(color, coverage.clamp(0.0, 1.0));
                *pixel = image::Rgb([blended.r, blended.g, blended.b]);
            });
        }
        baseline_y += line_height;
    }
}
