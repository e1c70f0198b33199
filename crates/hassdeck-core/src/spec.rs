#![forbid(unsafe_code)]

//! The resolved visual description of one control tile.
//!
//! Resolution turns a configured button or dial plus live entity state into
//! a [`ResolvedSpec`]: plain values only, no templates, no entity lookups.
//! The render engine consumes it without touching state, and the dispatcher
//! compares specs for equality to skip redrawing unchanged tiles.

use crate::color::Rgb;
use thiserror::Error;

/// A malformed icon reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid icon reference {0:?}")]
pub struct IconError(pub String);

/// Where a tile's image content comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum IconDescriptor {
    /// A progress ring, 0 to 100 percent.
    Ring(f32),
    /// An image fetched over HTTP.
    Url(String),
    /// A provider-specific id, e.g. `spotify:album/...`.
    Provider { scheme: String, id: String },
    /// A local image file path.
    File(String),
}

impl IconDescriptor {
    /// Parse an icon reference string.
    ///
    /// `ring:NN` and `url:...` are recognized schemes; any other
    /// `scheme:id` pair is handed to an icon provider; everything else is a
    /// file path.
    pub fn parse(raw: &str) -> Result<Self, IconError> {
        if let Some(pct) = raw.strip_prefix("ring:") {
            return pct
                .trim()
                .parse::<f32>()
                .map(|p| Self::Ring(p.clamp(0.0, 100.0)))
                .map_err(|_| IconError(raw.to_owned()));
        }
        if let Some(url) = raw.strip_prefix("url:") {
            return Ok(Self::Url(url.to_owned()));
        }
        if let Some((scheme, id)) = raw.split_once(':')
            && !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Ok(Self::Provider {
                scheme: scheme.to_owned(),
                id: id.to_owned(),
            });
        }
        Ok(Self::File(raw.to_owned()))
    }
}

/// The base layer of a tile.
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// A solid fill.
    Flat(Rgb),
    /// A raster image (file, URL, or provider id).
    Raster(IconDescriptor),
    /// A Material Design Icon glyph over a solid fill.
    Glyph {
        name: String,
        color: Rgb,
        background: Rgb,
    },
}

/// Everything the renderer needs to draw one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    pub text: String,
    pub text_size: u32,
    pub text_offset: i32,
    pub text_color: Rgb,
    pub background: Background,
    /// Progress ring percentage drawn over the background.
    pub ring: Option<f32>,
    /// Convert the final image to grayscale (entity off).
    pub grayscale: bool,
    /// Dim the tile to acknowledge an in-flight press.
    pub pressed: bool,
}

impl Default for ResolvedSpec {
    fn default() -> Self {
        Self {
            text: String::new(),
            text_size: 12,
            text_offset: 0,
            text_color: Rgb::WHITE,
            background: Background::Flat(Rgb::BLACK),
            ring: None,
            grayscale: false,
            pressed: false,
        }
    }
}

impl ResolvedSpec {
    /// A blank black tile, used for empty key positions.
    #[must_use]
    pub fn blank() -> Self {
        Self::default()
    }

    /// The tile shown when resolution of a control failed outright.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            text: "Rendering\nfailed".to_owned(),
            text_color: Rgb::WHITE,
            background: Background::Flat(Rgb::new(0x8b, 0x00, 0x00)),
            ..Self::default()
        }
    }

    /// The countdown tile shown while a delayed press is pending: remaining
    /// seconds plus a draining ring.
    #[must_use]
    pub fn countdown(remaining_seconds: f64, total_seconds: f64) -> Self {
        let pct = if total_seconds > 0.0 {
            ((remaining_seconds / total_seconds) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            text: format!("{remaining_seconds:.0}s\n{pct:.0}%"),
            ring: Some(pct as f32),
            ..Self::default()
        }
    }
}
