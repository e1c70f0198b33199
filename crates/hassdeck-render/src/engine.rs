#![forbid(unsafe_code)]

//! The tile render engine.
//!
//! Layering order is fixed: background (flat fill, raster icon, or tinted
//! glyph), progress ring, text, then the grayscale and pressed passes over
//! the finished image. A raster or glyph that fails to load degrades to
//! the layers underneath it; only the explicit failed tile is red.

use crate::icons::IconProvider;
use crate::ring::draw_ring;
use crate::text::draw_text;
use ab_glyph::FontArc;
use hassdeck_core::color::Rgb;
use hassdeck_core::spec::{Background, ResolvedSpec};
use image::RgbImage;
use tracing::warn;

/// Brightness factor applied while a key is held down.
const PRESSED_DIM: f32 = 0.6;

/// Renders resolved specs into tile bitmaps.
pub struct RenderEngine {
    font: Option<FontArc>,
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine {
    /// An engine without a font: text layers are skipped with a warning.
    #[must_use]
    pub fn new() -> Self {
        Self { font: None }
    }

    #[must_use]
    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    #[must_use]
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render one tile.
    #[must_use]
    pub fn render(
        &self,
        spec: &ResolvedSpec,
        size: (u32, u32),
        icons: &dyn IconProvider,
    ) -> RgbImage {
        let mut image = match &spec.background {
            Background::Flat(color) => fill(size, *color),
            Background::Raster(descriptor) => match icons.raster(descriptor, size) {
                Ok(img) => img,
                Err(err) => {
                    warn!(%err, "raster icon failed to load");
                    fill(size, Rgb::BLACK)
                }
            },
            Background::Glyph {
                name,
                color,
                background,
            } => {
                let mut img = fill(size, *background);
                match icons.glyph_mask(name, size) {
                    Ok(mask) => tint_mask(&mut img, &mask, *color),
                    Err(err) => warn!(glyph = %name, %err, "glyph unavailable"),
                }
                img
            }
        };

        if let Some(pct) = spec.ring {
            draw_ring(&mut image, pct);
        }

        if !spec.text.is_empty() {
            match &self.font {
                Some(font) => draw_text(
                    &mut image,
                    font,
                    &spec.text,
                    spec.text_size,
                    spec.text_offset,
                    spec.text_color,
                ),
                None => warn!("no font configured, text layer skipped"),
            }
        }

        if spec.grayscale {
            grayscale(&mut image);
        }
        if spec.pressed {
            dim(&mut image, PRESSED_DIM);
        }
        image
    }

    /// Render the all-black tile used for empty positions and sleep.
    #[must_use]
    pub fn blank(&self, size: (u32, u32)) -> RgbImage {
        fill(size, Rgb::BLACK)
    }
}

fn fill(size: (u32, u32), color: Rgb) -> RgbImage {
    RgbImage::from_pixel(size.0, size.1, image::Rgb([color.r, color.g, color.b]))
}

/// Composite a tinted alpha mask over the image.
fn tint_mask(image: &mut RgbImage, mask: &image::GrayImage, color: Rgb) {
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if x >= mask.width() || y >= mask.height() {
            continue;
        }
        let alpha = f32::from(mask.get_pixel(x, y)[0]) / 255.0;
        let base = Rgb::new(pixel[0], pixel[1], pixel[2]);
        let blended = base.mixed(color, alpha);
        *pixel = image::Rgb([blended.r, blended.g, blended.b]);
    }
}

fn grayscale(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        let luma = Rgb::new(pixel[0], pixel[1], pixel[2]).luminance() as u8;
        *pixel = image::Rgb([luma, luma, luma]);
    }
}

fn dim(image: &mut RgbImage, factor: f32) {
    for pixel in image.pixels_mut() {
        let scaled = Rgb::new(pixel[0], pixel[1], pixel[2]).scaled(factor);
        *pixel = image::Rgb([scaled.r, scaled.g, scaled.b]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::{IconLoadError, NullIconProvider};
    use hassdeck_core::spec::IconDescriptor;
    use image::GrayImage;

    const SIZE: (u32, u32) = (72, 72);

    fn px(image: &RgbImage, x: u32, y: u32) -> Rgb {
        let p = image.get_pixel(x, y);
        Rgb::new(p[0], p[1], p[2])
    }

    #[test]
    fn flat_background_fills_every_pixel() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Flat(Rgb::new(10, 20, 30)),
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &NullIconProvider);
        assert_eq!(px(&image, 0, 0), Rgb::new(10, 20, 30));
        assert_eq!(px(&image, 71, 71), Rgb::new(10, 20, 30));
    }

    #[test]
    fn missing_raster_degrades_to_black() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Raster(IconDescriptor::File("missing.png".into())),
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &NullIconProvider);
        assert_eq!(px(&image, 36, 36), Rgb::BLACK);
    }

    #[test]
    fn missing_glyph_keeps_background_fill() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Glyph {
                name: "lightbulb".into(),
                color: Rgb::WHITE,
                background: Rgb::new(0, 0, 90),
            },
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &NullIconProvider);
        assert_eq!(px(&image, 36, 36), Rgb::new(0, 0, 90));
    }

    struct SolidGlyphs;
    impl IconProvider for SolidGlyphs {
        fn raster(
            &self,
            _: &IconDescriptor,
            size: (u32, u32),
        ) -> Result<RgbImage, IconLoadError> {
            Ok(RgbImage::from_pixel(size.0, size.1, image::Rgb([0, 255, 0])))
        }

        fn glyph_mask(&self, _: &str, size: (u32, u32)) -> Result<GrayImage, IconLoadError> {
            // Opaque left half, transparent right half.
            let mut mask = GrayImage::new(size.0, size.1);
            for (x, _, p) in mask.enumerate_pixels_mut() {
                p[0] = if x < size.0 / 2 { 255 } else { 0 };
            }
            Ok(mask)
        }
    }

    #[test]
    fn glyph_mask_is_tinted_over_background() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Glyph {
                name: "lightbulb".into(),
                color: Rgb::new(200, 100, 0),
                background: Rgb::BLACK,
            },
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &SolidGlyphs);
        assert_eq!(px(&image, 10, 36), Rgb::new(200, 100, 0));
        assert_eq!(px(&image, 60, 36), Rgb::BLACK);
    }

    #[test]
    fn grayscale_pass_flattens_color() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Raster(IconDescriptor::File("any".into())),
            grayscale: true,
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &SolidGlyphs);
        let p = px(&image, 36, 36);
        assert_eq!(p.r, p.g);
        assert_eq!(p.g, p.b);
        // Pure green has substantial luminance.
        assert!(p.r > 100);
    }

    #[test]
    fn pressed_pass_dims() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Flat(Rgb::new(200, 200, 200)),
            pressed: true,
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &NullIconProvider);
        let p = px(&image, 36, 36);
        assert!(p.r < 200 && p.r > 80);
    }

    #[test]
    fn deterministic_output() {
        let engine = RenderEngine::new();
        let spec = ResolvedSpec {
            background: Background::Flat(Rgb::new(30, 30, 30)),
            ring: Some(62.0),
            ..ResolvedSpec::default()
        };
        let a = engine.render(&spec, SIZE, &NullIconProvider);
        let b = engine.render(&spec, SIZE, &NullIconProvider);
        assert_eq!(a, b);
    }

    #[test]
    fn text_without_font_is_skipped_not_fatal() {
        let engine = RenderEngine::new();
        assert!(!engine.has_font());
        let spec = ResolvedSpec {
            text: "Desk".into(),
            background: Background::Flat(Rgb::BLACK),
            ..ResolvedSpec::default()
        };
        let image = engine.render(&spec, SIZE, &NullIconProvider);
        assert_eq!(px(&image, 36, 36), Rgb::BLACK);
    }
}
