#![forbid(unsafe_code)]

//! Bitmap rendering for deck tiles.
//!
//! Consumes the resolved visual spec produced by hassdeck-core and emits
//! RGB images sized for the target tile: background, progress ring, glyph,
//! text, then the grayscale and pressed passes. Rendering is deterministic;
//! the same spec and size always produce the same pixels.

pub mod engine;
pub mod icons;
pub mod ring;
pub mod text;

pub use engine::RenderEngine;
pub use icons::{CachedIconProvider, IconLoadError, IconProvider, NullIconProvider};
