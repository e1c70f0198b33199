#![forbid(unsafe_code)]

//! The dispatch runtime.
//!
//! One dispatcher thread owns all mutable state (configuration, entity
//! cache, navigation session, pending delayed actions). Input sources run
//! on feed threads and push [`hassdeck_core::event::RuntimeEvent`]s into a
//! single channel; delayed actions are deadlines the dispatcher sleeps
//! toward with `recv_timeout`. No locks around dispatch state, no
//! re-entrancy.

pub mod device;
pub mod dispatcher;
pub mod feed;
pub mod pending;
pub mod remote;

pub use device::{DeckDevice, DeckLayout, DeviceError};
pub use dispatcher::{Dispatcher, DispatcherOptions};
pub use feed::{Feed, FeedSet, StopSignal};
pub use pending::{ControlId, PendingActions};
pub use remote::{RemoteClient, RemoteError};
