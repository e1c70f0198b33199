#![forbid(unsafe_code)]

//! Progress-ring drawing.
//!
//! The ring starts at twelve o'clock and sweeps clockwise. The full circle
//! is drawn in a faint gray so the filled fraction reads against it.

use hassdeck_core::color::Rgb;
use image::RgbImage;

const THICKNESS: f32 = 4.0;
const RING_COLOR: Rgb = Rgb::new(0xff, 0x00, 0x00);
const TRACK_COLOR: Rgb = Rgb::new(100, 100, 100);

/// Draw a ring at `percentage` (0 to 100) over `image`.
pub fn draw_ring(image: &mut RgbImage, percentage: f32) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let radius = w.min(h) as f32 / 2.0 - THICKNESS / 2.0;
    let filled = (percentage.clamp(0.0, 100.0) / 100.0) * std::f32::consts::TAU;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        // Coverage of the annulus, feathered half a pixel at each edge.
        let coverage = (THICKNESS / 2.0 + 0.5 - (dist - radius).abs()).clamp(0.0, 1.0);
        if coverage <= 0.0 {
            continue;
        }
        // Angle from twelve o'clock, clockwise, in [0, TAU).
        let angle = dx.atan2(-dy).rem_euclid(std::f32::consts::TAU);
        let color = if angle <= filled { RING_COLOR } else { TRACK_COLOR };
        let base = Rgb::new(pixel[0], pixel[1], pixel[2]);
        let blended = base.mixed(color, coverage);
        *pixel = image::Rgb([blended.r, blended.g, blended.b]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(image: &RgbImage, x: u32, y: u32) -> Rgb {
        let p = image.get_pixel(x, y);
        Rgb::new(p[0], p[1], p[2])
    }

    #[test]
    fn center_is_untouched() {
        let mut image = RgbImage::new(72, 72);
        draw_ring(&mut image, 50.0);
        assert_eq!(px(&image, 36, 36), Rgb::BLACK);
    }

    #[test]
    fn half_ring_fills_right_side_only() {
        let mut image = RgbImage::new(72, 72);
        draw_ring(&mut image, 50.0);
        // Three o'clock sits inside the filled half.
        let right = px(&image, 69, 36);
        assert!(right.r > 180 && right.g < 60, "got {right:?}");
        // Nine o'clock is on the gray track.
        let left = px(&image, 2, 36);
        assert!(left.r > 60 && left.r < 140 && left.r == left.g, "got {left:?}");
    }

    #[test]
    fn full_ring_covers_top_both_sides() {
        let mut image = RgbImage::new(72, 72);
        draw_ring(&mut image, 100.0);
        for x in [2u32, 69] {
            let p = px(&image, x, 36);
            assert!(p.r > 180 && p.g < 60, "at x={x}: {p:?}");
        }
    }

    #[test]
    fn zero_percentage_draws_track_only() {
        let mut image = RgbImage::new(72, 72);
        draw_ring(&mut image, 0.0);
        let p = px(&image, 69, 36);
        assert!(p.r == p.g && p.g == p.b && p.r > 60, "got {p:?}");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_panics_for_any_percentage_or_size(
                pct in -1000.0f32..1000.0,
                w in 0u32..64,
                h in 0u32..64,
            ) {
                let mut image = RgbImage::new(w, h);
                draw_ring(&mut image, pct);
            }

            #[test]
            fn out_of_range_percentages_clamp_to_the_extremes(pct in 100.0f32..1000.0) {
                let mut full = RgbImage::new(32, 32);
                draw_ring(&mut full, 100.0);
                let mut over = RgbImage::new(32, 32);
                draw_ring(&mut over, pct);
                prop_assert_eq!(&full, &over);
            }
        }
    }
}
