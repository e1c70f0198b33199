#![forbid(unsafe_code)]

//! HTTP-backed icon provider.
//!
//! Fetches raster icons from disk or the network and renders Material
//! Design Icon glyphs from their upstream SVGs. Downloads land in a disk
//! cache so repeated runs stay offline; the in-memory layer above this
//! ([`CachedIconProvider`]) keeps the hot set decoded.
//!
//! [`CachedIconProvider`]: hassdeck_render::CachedIconProvider

use hassdeck_core::spec::IconDescriptor;
use hassdeck_render::{IconLoadError, IconProvider};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const MDI_SVG_BASE: &str = "https://raw.githubusercontent.com/Templarian/MaterialDesign/master/svg";
const SPOTIFY_OEMBED: &str = "https://embed.spotify.com/oembed/?url=http://open.spotify.com";

pub struct HttpIconProvider {
    http: reqwest::blocking::Client,
    cache_dir: PathBuf,
}

impl HttpIconProvider {
    pub fn new(cache_dir: PathBuf) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, cache_dir }
    }

    /// Fetch a URL through the disk cache.
    fn fetch_cached(&self, url: &str, name: &Path) -> Result<Vec<u8>, IconLoadError> {
        let path = self.cache_dir.join(name);
        if let Ok(bytes) = std::fs::read(&path) {
            return Ok(bytes);
        }
        debug!(url, "fetching icon");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| IconLoadError::Other(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IconLoadError::Other(format!("{url}: not found")));
        }
        let response = response
            .error_for_status()
            .map_err(|e| IconLoadError::Other(e.to_string()))?;
        let bytes = response
            .bytes()
            .map_err(|e| IconLoadError::Other(e.to_string()))?
            .to_vec();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &bytes)?;
        Ok(bytes)
    }

    fn fetch_image(&self, url: &str, size: (u32, u32)) -> Result<RgbImage, IconLoadError> {
        let bytes = self.fetch_cached(url, &cache_name(url))?;
        let image = image::load_from_memory(&bytes)?;
        Ok(image::imageops::resize(
            &image.to_rgb8(),
            size.0,
            size.1,
            FilterType::Lanczos3,
        ))
    }

    /// Resolve a Spotify id to its cover art URL via the oembed endpoint.
    fn spotify_thumbnail(&self, id: &str) -> Result<String, IconLoadError> {
        let url = format!("{SPOTIFY_OEMBED}/{id}");
        let bytes = self.fetch_cached(&url, &cache_name(&url).with_extension("json"))?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| IconLoadError::Other(e.to_string()))?;
        value["thumbnail_url"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| IconLoadError::Other(format!("no thumbnail for spotify id {id:?}")))
    }
}

impl IconProvider for HttpIconProvider {
    fn raster(
        &self,
        descriptor: &IconDescriptor,
        size: (u32, u32),
    ) -> Result<RgbImage, IconLoadError> {
        match descriptor {
            IconDescriptor::File(path) => {
                let image = image::ImageReader::open(path)?.decode()?;
                Ok(image::imageops::resize(
                    &image.to_rgb8(),
                    size.0,
                    size.1,
                    FilterType::Lanczos3,
                ))
            }
            IconDescriptor::Url(url) => self.fetch_image(url, size),
            IconDescriptor::Provider { scheme, id } if scheme == "spotify" => {
                let url = self.spotify_thumbnail(id)?;
                self.fetch_image(&url, size)
            }
            IconDescriptor::Provider { scheme, .. } => {
                Err(IconLoadError::Unsupported(scheme.clone()))
            }
            // Rings are drawn by the engine, not loaded.
            IconDescriptor::Ring(_) => Err(IconLoadError::Unsupported("ring".to_owned())),
        }
    }

    fn glyph_mask(&self, name: &str, size: (u32, u32)) -> Result<GrayImage, IconLoadError> {
        if !is_valid_glyph_name(name) {
            return Err(IconLoadError::UnknownGlyph(name.to_owned()));
        }
        let url = format!("{MDI_SVG_BASE}/{name}.svg");
        let svg = self
            .fetch_cached(&url, Path::new("mdi").join(format!("{name}.svg")).as_path())
            .map_err(|_| IconLoadError::UnknownGlyph(name.to_owned()))?;
        rasterize_svg_alpha(&svg, size)
            .ok_or_else(|| IconLoadError::Other(format!("glyph {name:?} failed to rasterize")))
    }
}

/// MDI names are lowercase words joined with hyphens.
fn is_valid_glyph_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Render an SVG and keep only its alpha channel as a mask.
fn rasterize_svg_alpha(svg: &[u8], size: (u32, u32)) -> Option<GrayImage> {
    let options = resvg::usvg::Options::default();
    let tree = resvg::usvg::Tree::from_data(svg, &options).ok()?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.0, size.1)?;
    let transform = resvg::tiny_skia::Transform::from_scale(
        size.0 as f32 / tree.size().width(),
        size.1 as f32 / tree.size().height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    let alpha: Vec<u8> = pixmap.pixels().iter().map(|p| p.alpha()).collect();
    GrayImage::from_raw(size.0, size.1, alpha)
}

/// Stable on-disk name for an arbitrary URL.
fn cache_name(url: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let extension = url
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");
    PathBuf::from(format!("{:016x}.{extension}", hasher.finish()))
}
