use std::cell::RefCell;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::object::ObjectRef;
use crate::resolve::Toplevels;
use crate::surface::{Popover, Surface};

/// Top-level containers of the headless application.
#[derive(Debug, Default)]
pub struct Display {
    toplevels: RefCell<Vec<ObjectRef>>,
}

impl Display {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_toplevel(&self, toplevel: impl Into<ObjectRef>) {
        self.toplevels.borrow_mut().push(toplevel.into());
    }

    pub fn remove_toplevel(&self, toplevel: &ObjectRef) -> bool {
        let mut toplevels = self.toplevels.borrow_mut();
        let before = toplevels.len();
        toplevels.retain(|existing| existing != toplevel);
        toplevels.len() != before
    }
}

impl Toplevels for Display {
    fn toplevels(&self) -> Vec<ObjectRef> {
        self.toplevels.borrow().clone()
    }
}

/// Surface that records what a real toolkit would draw.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    styled: RefCell<Vec<(ObjectRef, SmolStr)>>,
    popovers: RefCell<IndexMap<SmolStr, Popover>>,
    css: RefCell<String>,
}

impl HeadlessSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_style_class(&self, widget: &ObjectRef, class: &str) -> bool {
        self.styled
            .borrow()
            .iter()
            .any(|(styled, name)| styled == widget && name == class)
    }

    #[must_use]
    pub fn popover(&self, id: &str) -> Option<Popover> {
        self.popovers.borrow().get(id).cloned()
    }

    #[must_use]
    pub fn popover_ids(&self) -> Vec<SmolStr> {
        self.popovers.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn css(&self) -> String {
        self.css.borrow().clone()
    }
}

impl Surface for HeadlessSurface {
    fn add_style_class(&self, widget: &ObjectRef, class: &str) {
        if !self.has_style_class(widget, class) {
            self.styled
                .borrow_mut()
                .push((widget.clone(), SmolStr::new(class)));
        }
    }

    fn remove_style_class(&self, widget: &ObjectRef, class: &str) {
        self.styled
            .borrow_mut()
            .retain(|(styled, name)| !(styled == widget && name == class));
    }

    fn show_popover(&self, id: &str, popover: &Popover) {
        self.popovers
            .borrow_mut()
            .insert(SmolStr::new(id), popover.clone());
    }

    fn hide_popover(&self, id: &str) {
        self.popovers.borrow_mut().shift_remove(id);
    }

    fn set_css(&self, css: &str) {
        css.clone_into(&mut self.css.borrow_mut());
    }
}
