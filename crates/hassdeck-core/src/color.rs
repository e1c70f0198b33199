#![forbid(unsafe_code)]

//! RGB color handling: parsing, derivation, and the small palette helpers
//! used by light-control page generation.
//!
//! Colors in the configuration are either `#RRGGBB` hex strings or one of a
//! small set of named colors. Parsing is strict; an unknown name is an
//! error that the resolver degrades to a safe default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Error parsing a color string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color: {0:?}")]
pub struct ColorError(pub String);

/// Named colors accepted in configuration fields.
///
/// This is intentionally a small table, not a full X11 registry: the names
/// that deck configurations actually use.
const NAMED: &[(&str, Rgb)] = &[
    ("white", Rgb::new(0xff, 0xff, 0xff)),
    ("black", Rgb::new(0x00, 0x00, 0x00)),
    ("red", Rgb::new(0xff, 0x00, 0x00)),
    ("green", Rgb::new(0x00, 0x80, 0x00)),
    ("blue", Rgb::new(0x00, 0x00, 0xff)),
    ("yellow", Rgb::new(0xff, 0xff, 0x00)),
    ("orange", Rgb::new(0xff, 0xa5, 0x00)),
    ("orangered", Rgb::new(0xff, 0x45, 0x00)),
    ("amber", Rgb::new(0xff, 0xbf, 0x00)),
    ("gray", Rgb::new(0x80, 0x80, 0x80)),
    ("grey", Rgb::new(0x80, 0x80, 0x80)),
    ("purple", Rgb::new(0x80, 0x00, 0x80)),
    ("cyan", Rgb::new(0x00, 0xff, 0xff)),
    ("magenta", Rgb::new(0xff, 0x00, 0xff)),
];

impl Rgb {
    pub const WHITE: Self = Self::new(0xff, 0xff, 0xff);
    pub const BLACK: Self = Self::new(0x00, 0x00, 0x00);
    pub const GRAY: Self = Self::new(0x80, 0x80, 0x80);
    /// Text color for controls whose bound entity is "on".
    pub const ON_HIGHLIGHT: Self = Self::new(0xff, 0x45, 0x00);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` or a named color.
    pub fn parse(s: &str) -> Result<Self, ColorError> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 6
                && let Ok(v) = u32::from_str_radix(hex, 16)
            {
                return Ok(Self::new((v >> 16) as u8, (v >> 8) as u8, v as u8));
            }
            return Err(ColorError(s.to_owned()));
        }
        let lower = s.to_ascii_lowercase();
        NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, rgb)| *rgb)
            .ok_or_else(|| ColorError(s.to_owned()))
    }

    /// `#rrggbb` representation.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Scale toward black. 0.0 is black, 1.0 is the original color.
    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        Self::new(
            (f32::from(self.r) * f) as u8,
            (f32::from(self.g) * f) as u8,
            (f32::from(self.b) * f) as u8,
        )
    }

    /// Linear blend with another color. `t` = 0.0 keeps `self`, 1.0 is `other`.
    #[must_use]
    pub fn mixed(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let lerp = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t) as u8;
        Self::new(lerp(self.r, other.r), lerp(self.g, other.g), lerp(self.b, other.b))
    }

    /// Perceptual luminance (ITU-R BT.601 weights).
    #[must_use]
    pub fn luminance(self) -> f32 {
        0.2989 * f32::from(self.r) + 0.5870 * f32::from(self.g) + 0.1140 * f32::from(self.b)
    }

    /// White or black, whichever contrasts more with this color.
    #[must_use]
    pub fn max_contrast(self) -> Self {
        if self.luminance() < 128.0 { Self::WHITE } else { Self::BLACK }
    }
}

/// Convert a color temperature in Kelvin to RGB.
///
/// Tanner Helland's approximation; input is clamped to [1000, 40000].
#[must_use]
pub fn kelvin_to_rgb(kelvin: u32) -> Rgb {
    let t = f64::from(kelvin.clamp(1000, 40_000)) / 100.0;

    let clamp255 = |v: f64| v.clamp(0.0, 255.0) as u8;

    let r = if t <= 66.0 {
        255
    } else {
        clamp255(329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2))
    };

    let g = if t <= 66.0 {
        clamp255(99.470_802_586_1 * t.ln() - 161.119_568_166_1)
    } else {
        clamp255(288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2))
    };

    let b = if t >= 66.0 {
        255
    } else if t <= 19.0 {
        0
    } else {
        clamp255(138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7)
    };

    Rgb::new(r, g, b)
}

/// Generate `n` hues spread uniformly around the HSV color wheel.
///
/// Deterministic for a given `n`; used to fill a light-control page when no
/// explicit color list is configured.
#[must_use]
pub fn uniform_colors(n: usize) -> Vec<Rgb> {
    (0..n)
        .map(|i| {
            let h = if n <= 1 { 0.0 } else { i as f32 / n as f32 };
            hsv_to_rgb(h, 1.0, 1.0)
        })
        .collect()
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let h = (h.fract() + 1.0).fract() * 6.0;
    let i = h.floor() as u32 % 6;
    let f = h - h.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb::new((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex() {
        assert_eq!(Rgb::parse("#ff4500").unwrap(), Rgb::new(0xff, 0x45, 0x00));
        assert_eq!(Rgb::parse("#000000").unwrap(), Rgb::BLACK);
    }

    #[test]
    fn parses_named_case_insensitive() {
        assert_eq!(Rgb::parse("White").unwrap(), Rgb::WHITE);
        assert_eq!(Rgb::parse("orangered").unwrap(), Rgb::ON_HIGHLIGHT);
    }

    #[test]
    fn rejects_unknown() {
        assert!(Rgb::parse("chartreuse-ish").is_err());
        assert!(Rgb::parse("#12345").is_err());
        assert!(Rgb::parse("#1234567").is_err());
    }

    #[test]
    fn hex_round_trip() {
        let c = Rgb::new(1, 2, 3);
        assert_eq!(Rgb::parse(&c.to_hex()).unwrap(), c);
    }

    #[test]
    fn scaled_endpoints() {
        let c = Rgb::new(200, 100, 50);
        assert_eq!(c.scaled(0.0), Rgb::BLACK);
        assert_eq!(c.scaled(1.0), c);
    }

    #[test]
    fn contrast_picks_white_on_dark() {
        assert_eq!(Rgb::BLACK.max_contrast(), Rgb::WHITE);
        assert_eq!(Rgb::WHITE.max_contrast(), Rgb::BLACK);
    }

    #[test]
    fn kelvin_extremes() {
        // Warm candlelight is strongly red; clear-sky blue has full blue.
        let warm = kelvin_to_rgb(1500);
        assert_eq!(warm.r, 255);
        assert!(warm.b < 64);
        let cold = kelvin_to_rgb(20_000);
        assert_eq!(cold.b, 255);
    }

    #[test]
    fn kelvin_clamps_range() {
        assert_eq!(kelvin_to_rgb(100), kelvin_to_rgb(1000));
        assert_eq!(kelvin_to_rgb(90_000), kelvin_to_rgb(40_000));
    }

    #[test]
    fn uniform_colors_deterministic_and_distinct() {
        let a = uniform_colors(8);
        let b = uniform_colors(8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        // First hue is pure red.
        assert_eq!(a[0], Rgb::new(255, 0, 0));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_color_round_trips_through_hex(r: u8, g: u8, b: u8) {
                let c = Rgb::new(r, g, b);
                prop_assert_eq!(Rgb::parse(&c.to_hex()).unwrap(), c);
            }

            #[test]
            fn parse_never_panics(s in ".*") {
                let _ = Rgb::parse(&s);
            }

            #[test]
            fn contrast_is_always_an_extreme(r: u8, g: u8, b: u8) {
                let c = Rgb::new(r, g, b).max_contrast();
                prop_assert!(c == Rgb::WHITE || c == Rgb::BLACK);
            }

            #[test]
            fn kelvin_warm_end_stays_fully_red(kelvin in 1000u32..=6600) {
                prop_assert_eq!(kelvin_to_rgb(kelvin).r, 255);
            }
        }
    }
}
