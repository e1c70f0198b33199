#![forbid(unsafe_code)]

//! The icon-provider boundary and its caching wrapper.
//!
//! Raster icons (files, URLs, provider ids) and MDI glyph masks come from
//! outside the render engine. The engine only sees this trait; the binary
//! wires in an HTTP-backed implementation, tests use [`NullIconProvider`].

use hassdeck_core::spec::IconDescriptor;
use image::{GrayImage, RgbImage};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Failure to produce an icon image.
#[derive(Debug, Error)]
pub enum IconLoadError {
    #[error("unsupported icon scheme {0:?}")]
    Unsupported(String),
    #[error("glyph {0:?} not found")]
    UnknownGlyph(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode: {0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Other(String),
}

/// Source of raster icons and glyph alpha masks.
pub trait IconProvider: Send + Sync {
    /// Load a raster icon scaled to `size`.
    fn raster(
        &self,
        descriptor: &IconDescriptor,
        size: (u32, u32),
    ) -> Result<RgbImage, IconLoadError>;

    /// Load an MDI glyph as an alpha mask scaled to `size`; the engine
    /// tints it.
    fn glyph_mask(&self, name: &str, size: (u32, u32)) -> Result<GrayImage, IconLoadError>;
}

/// A provider with nothing to give. Every request fails, which the engine
/// degrades to a flat tile.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIconProvider;

impl IconProvider for NullIconProvider {
    fn raster(
        &self,
        descriptor: &IconDescriptor,
        _size: (u32, u32),
    ) -> Result<RgbImage, IconLoadError> {
        Err(IconLoadError::Unsupported(format!("{descriptor:?}")))
    }

    fn glyph_mask(&self, name: &str, _size: (u32, u32)) -> Result<GrayImage, IconLoadError> {
        Err(IconLoadError::UnknownGlyph(name.to_owned()))
    }
}

/// Memoizing wrapper around a provider.
///
/// The cache is append-only and keyed by request; icons for a given key
/// never change within a run. Failures are not cached, so a transient
/// network error retries on the next render.
pub struct CachedIconProvider<P> {
    inner: P,
    rasters: Mutex<HashMap<String, RgbImage>>,
    masks: Mutex<HashMap<String, GrayImage>>,
}

impl<P: IconProvider> CachedIconProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            rasters: Mutex::new(HashMap::new()),
            masks: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: IconProvider> IconProvider for CachedIconProvider<P> {
    fn raster(
        &self,
        descriptor: &IconDescriptor,
        size: (u32, u32),
    ) -> Result<RgbImage, IconLoadError> {
        let key = format!("{descriptor:?}@{}x{}", size.0, size.1);
        if let Ok(cache) = self.rasters.lock()
            && let Some(hit) = cache.get(&key)
        {
            return Ok(hit.clone());
        }
        let image = self.inner.raster(descriptor, size)?;
        if let Ok(mut cache) = self.rasters.lock() {
            cache.insert(key, image.clone());
        }
        Ok(image)
    }

    fn glyph_mask(&self, name: &str, size: (u32, u32)) -> Result<GrayImage, IconLoadError> {
        let key = format!("{name}@{}x{}", size.0, size.1);
        if let Ok(cache) = self.masks.lock()
            && let Some(hit) = cache.get(&key)
        {
            return Ok(hit.clone());
        }
        let mask = self.inner.glyph_mask(name, size)?;
        if let Ok(mut cache) = self.masks.lock() {
            cache.insert(key, mask.clone());
        }
        Ok(mask)
    }
}
