//! Visual feedback collaborator: style classes, stylesheet and popovers.

#![allow(missing_docs)]

use smol_str::SmolStr;

use crate::object::ObjectRef;

/// Transient message attached to a widget.
#[derive(Debug, Clone, PartialEq)]
pub struct Popover {
    pub text: SmolStr,
    pub icon_name: SmolStr,
    pub relative_to: ObjectRef,
}

/// Toolkit side of highlights and messages.
pub trait Surface {
    fn add_style_class(&self, widget: &ObjectRef, class: &str);

    fn remove_style_class(&self, widget: &ObjectRef, class: &str);

    /// Show the popover `id`, replacing its content if it is already shown.
    fn show_popover(&self, id: &str, popover: &Popover);

    fn hide_popover(&self, id: &str);

    /// Replace the application stylesheet.
    fn set_css(&self, css: &str);
}
