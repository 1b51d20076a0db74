//! `marionette-core` - live object tree access for remote GUI control.
//!
//! The crate resolves dotted object paths against a toolkit's object tree,
//! marshals property values between the toolkit, the control wire format and
//! an embedded scripting context, and synthesizes proxy object types that
//! mirror script values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Control error taxonomy.
pub mod error;
/// Headless toolkit used by the host binary and tests.
pub mod headless;
/// Cooperative single-threaded main loop.
pub mod mainloop;
/// Object model traits implemented by toolkits and proxies.
pub mod object;
/// Dynamic proxy types mirroring script values.
pub mod proxy;
/// Dotted path resolution.
pub mod resolve;
/// Scripting bridge.
pub mod script;
/// Visual feedback collaborator.
pub mod surface;
/// Property values, wire values and codecs.
pub mod value;

pub use error::ControlError;
pub use mainloop::MainLoop;
pub use object::{HostObject, ObjectClass, ObjectRef};
pub use resolve::{ObjectResolver, Resolved, Toplevels, DEFAULT_CONTEXT_MARKER};
pub use surface::{Popover, Surface};
