//! `marionette-control` - remote control surface for live object trees.
//!
//! The [`Controller`] interprets the command set (highlights, messages,
//! property access, signals, exports) against a [`marionette_core`]
//! resolver. [`transport`] serves it as a JSON line protocol over TCP or
//! Unix sockets, and [`scene`] builds headless applications to serve.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Host configuration.
pub mod config;
/// Command dispatcher.
pub mod control;
/// JSON line protocol types.
pub mod protocol;
/// Headless scenes from TOML.
pub mod scene;
/// Socket transport.
pub mod transport;

pub use config::HostConfig;
pub use control::{ControlSettings, Controller, SubscriberId};
pub use protocol::{ControlEvent, ControlRequest, ControlResponse};
pub use scene::Scene;
pub use transport::{register_control_surface, ControlEndpoint, ControlServer};
