#![forbid(unsafe_code)]

//! Core data model for hassdeck: configuration tree, entity state cache,
//! page navigation session, canonical events, and the template-engine
//! boundary.
//!
//! Nothing in this crate performs I/O. The dispatcher (hassdeck-runtime)
//! owns all mutation; resolution and rendering receive read-only views.

pub mod color;
pub mod config;
pub mod event;
pub mod lightpage;
pub mod model;
pub mod resolve;
pub mod session;
pub mod spec;
pub mod state;
pub mod template;
