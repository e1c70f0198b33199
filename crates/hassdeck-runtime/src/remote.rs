#![forbid(unsafe_code)]

//! The remote-server boundary.
//!
//! The dispatcher fires service calls through this trait; the websocket
//! client in the binary implements it. A failed call is logged and
//! dropped, never retried by the dispatcher.

use hassdeck_core::resolve::ServiceCall;
use thiserror::Error;

/// A service call could not be delivered.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not connected")]
    Disconnected,
    #[error("malformed service {0:?}")]
    BadService(String),
    #[error("{0}")]
    Transport(String),
}

/// Command half of the remote-server connection.
pub trait RemoteClient: Send {
    fn call_service(&mut self, call: &ServiceCall) -> Result<(), RemoteError>;
}
