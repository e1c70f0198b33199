#![forbid(unsafe_code)]

//! Canonical events.
//!
//! Every input source (deck hardware, the websocket reader, the config-file
//! watcher) normalizes into [`RuntimeEvent`] and pushes onto one channel;
//! the dispatcher is the only consumer. Raw hardware reports are first
//! mapped into [`InputEvent`] so dispatch logic never sees device-specific
//! shapes.

use crate::state::EntityState;

/// A touchscreen gesture over a dial's strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    /// Short tap: drive the dial to its minimum.
    Tap,
    /// Long press: drive the dial to its maximum.
    Hold,
    /// Horizontal drag; `to_x` is the lift-off column in pixels.
    Drag { to_x: i32 },
}

/// A normalized report from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Key press or release at a grid position.
    Key { index: u8, pressed: bool },
    /// Dial rotation; `delta` is signed detents.
    DialTurn { index: u8, delta: i32 },
    /// Dial push or release.
    DialPush { index: u8, pressed: bool },
    /// Touchscreen gesture; `x` is the touch-down column in pixels.
    Touch { x: i32, kind: TouchKind },
}

impl InputEvent {
    /// Whether this event is an activation edge (press, turn, or touch)
    /// rather than a release.
    #[must_use]
    pub fn is_activation(&self) -> bool {
        match self {
            Self::Key { pressed, .. } | Self::DialPush { pressed, .. } => *pressed,
            Self::DialTurn { .. } | Self::Touch { .. } => true,
        }
    }
}

/// Everything the dispatcher reacts to, across all sources.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A normalized deck input.
    Input(InputEvent),
    /// A state-changed notification from the remote server.
    StateChanged {
        entity_id: String,
        state: EntityState,
    },
    /// The configuration file was modified on disk.
    ConfigTouched,
    /// Orderly shutdown requested.
    Shutdown,
}
