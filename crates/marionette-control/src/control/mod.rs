//! Control surface: the command set remote controllers drive the live
//! object tree with.
//!
//! A [`Controller`] lives on the main loop thread. Requests arrive as JSON
//! lines (see [`crate::protocol`]) or through the typed methods; broadcast
//! events go to every subscriber.

#![allow(missing_docs)]

mod commands;
mod export;
mod handlers;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use marionette_core::mainloop::SourceId;
use marionette_core::object::{HandlerId, WeakObjectRef};
use marionette_core::{MainLoop, ObjectRef, ObjectResolver, Popover, Surface};
use smol_str::SmolStr;
use tracing::debug;

use crate::config::{HostConfig, DEFAULT_CSS, DEFAULT_OBJECT_PATH, DEFAULT_STYLE_CLASS};
use crate::protocol::{ControlEvent, ControlRequest, ControlResponse};

pub use export::{export_path, interface_name, introspection_xml};

/// Controller settings taken from the host configuration.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub object_path: SmolStr,
    pub style_class: SmolStr,
    pub css: SmolStr,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            object_path: SmolStr::new(DEFAULT_OBJECT_PATH),
            style_class: SmolStr::new(DEFAULT_STYLE_CLASS),
            css: SmolStr::new(DEFAULT_CSS),
        }
    }
}

impl From<&HostConfig> for ControlSettings {
    fn from(config: &HostConfig) -> Self {
        Self {
            object_path: config.object_path.clone(),
            style_class: config.style_class.clone(),
            css: config.css.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Receives broadcast events. Returning `false` unsubscribes.
pub type EventSink = Rc<dyn Fn(&ControlEvent) -> bool>;

struct Highlight {
    object: ObjectRef,
    expiry: Option<SourceId>,
}

struct Message {
    popover: Popover,
    expiry: Option<SourceId>,
}

struct Connection {
    object: WeakObjectRef,
    handler: HandlerId,
}

pub(crate) struct ExportedObject {
    object: ObjectRef,
    notify: HandlerId,
}

struct Inner {
    this: Weak<Inner>,
    resolver: ObjectResolver,
    surface: Rc<dyn Surface>,
    main_loop: MainLoop,
    settings: ControlSettings,
    interface: SmolStr,
    css: RefCell<SmolStr>,
    highlights: RefCell<Vec<Highlight>>,
    messages: RefCell<IndexMap<SmolStr, Message>>,
    connections: RefCell<Vec<Connection>>,
    exports: RefCell<IndexMap<SmolStr, ExportedObject>>,
    subscribers: RefCell<Vec<(SubscriberId, EventSink)>>,
    next_subscriber: Cell<u64>,
}

/// Command dispatcher bound to one application.
#[derive(Clone)]
pub struct Controller {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("object_path", &self.inner.settings.object_path)
            .field("highlights", &self.inner.highlights.borrow().len())
            .field("messages", &self.inner.messages.borrow().len())
            .field("exports", &self.inner.exports.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create the controller and install its stylesheet.
    pub fn new(
        resolver: ObjectResolver,
        surface: Rc<dyn Surface>,
        main_loop: MainLoop,
        settings: ControlSettings,
    ) -> Self {
        surface.set_css(&settings.css);
        let interface = interface_name(&settings.object_path);
        let inner = Rc::new_cyclic(|this| Inner {
            this: this.clone(),
            resolver,
            surface,
            main_loop,
            css: RefCell::new(settings.css.clone()),
            settings,
            interface,
            highlights: RefCell::new(Vec::new()),
            messages: RefCell::new(IndexMap::new()),
            connections: RefCell::new(Vec::new()),
            exports: RefCell::new(IndexMap::new()),
            subscribers: RefCell::new(Vec::new()),
            next_subscriber: Cell::new(0),
        });
        Self { inner }
    }

    #[must_use]
    pub fn resolver(&self) -> &ObjectResolver {
        &self.inner.resolver
    }

    #[must_use]
    pub fn settings(&self) -> &ControlSettings {
        &self.inner.settings
    }

    /// D-Bus style interface name of exported objects.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.inner.interface
    }

    pub fn subscribe(&self, sink: impl Fn(&ControlEvent) -> bool + 'static) -> SubscriberId {
        let id = SubscriberId(self.inner.next_subscriber.get() + 1);
        self.inner.next_subscriber.set(id.0);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(sink)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Handle one request line, returning the serialized response.
    #[must_use]
    pub fn handle_request_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let response = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => self.handle_request_value(value),
            Err(err) => ControlResponse::invalid(0, format!("invalid request: {err}")),
        };
        serde_json::to_string(&response).ok()
    }

    pub fn handle_request_value(&self, value: serde_json::Value) -> ControlResponse {
        match serde_json::from_value::<ControlRequest>(value) {
            Ok(request) => self.handle_request(&request),
            Err(err) => ControlResponse::invalid(0, format!("invalid request: {err}")),
        }
    }

    pub fn handle_request(&self, request: &ControlRequest) -> ControlResponse {
        debug!(id = request.id, r#type = %request.r#type, "control request");
        handlers::dispatch(self, request).unwrap_or_else(|| {
            ControlResponse::invalid(
                request.id,
                format!("unsupported request '{}'", request.r#type),
            )
        })
    }
}

impl Inner {
    fn broadcast(&self, event: &ControlEvent) {
        let sinks: Vec<(SubscriberId, EventSink)> = self.subscribers.borrow().clone();
        let mut closed = Vec::new();
        for (id, sink) in sinks {
            if !sink(event) {
                closed.push(id);
            }
        }
        if !closed.is_empty() {
            self.subscribers
                .borrow_mut()
                .retain(|(id, _)| !closed.contains(id));
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for connection in self.connections.get_mut().drain(..) {
            if let Some(object) = connection.object.upgrade() {
                object.disconnect(connection.handler);
            }
        }
        for (_, export) in self.exports.get_mut().drain(..) {
            export.object.disconnect(export.notify);
        }
        for highlight in self.highlights.get_mut().drain(..) {
            if let Some(expiry) = highlight.expiry {
                self.main_loop.source_remove(expiry);
            }
        }
        for (_, message) in self.messages.get_mut().drain(..) {
            if let Some(expiry) = message.expiry {
                self.main_loop.source_remove(expiry);
            }
        }
    }
}
