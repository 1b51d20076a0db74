//! Headless toolkit.
//!
//! In-memory widgets, a display holding the top-level containers, a surface
//! recording highlights and popovers, and a script engine standing in for a
//! web page. The `marionette` binary serves scenes built from these, and the
//! tests drive the control surface through them.

#![allow(missing_docs)]

mod display;
mod script;
mod widget;

pub use display::{Display, HeadlessSurface};
pub use script::{HeadlessScriptEngine, PageObject};
pub use widget::{ClassHandler, Widget, WidgetBuilder};
