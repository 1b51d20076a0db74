//! Embedded script contexts.
//!
//! A [`ScriptView`] is the script context hosted by one toolkit object. It
//! owns the proxies created for its global variables, so dropping the host
//! object drops the proxies and cancels their in-flight writes.

#![allow(missing_docs)]

mod bridge;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::proxy::ProxyInstance;
use crate::value::ForeignValue;

pub use bridge::{NotificationMessage, ScriptBridge, DEFAULT_MESSAGE_HANDLER};

const OBSERVE_TEMPLATE: &str = include_str!("../../assets/observe.js");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script execution was cancelled")]
    Cancelled,
    #[error("script did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(SmolStr),
    #[error("'{0}' is not an object")]
    NotAnObject(SmolStr),
}

pub type EvalResult = Result<ForeignValue, ScriptError>;
pub type EvalCallback = Box<dyn FnOnce(EvalResult)>;
pub type MessageHandler = Rc<dyn Fn(ForeignValue)>;

/// Script runtime of one view.
pub trait ScriptEngine {
    /// Submit `script` for evaluation. `done` runs later on the main loop;
    /// an engine that skips a cancelled script completes it with
    /// [`ScriptError::Cancelled`].
    fn evaluate(&self, script: &str, cancel: Option<CancelHandle>, done: EvalCallback);

    /// Register a handler for messages posted by scripts under `name`.
    /// Returns `false` when the engine refuses the registration.
    fn register_message_handler(&self, name: &str, handler: MessageHandler) -> bool;

    /// Expression that makes `variable` report property changes to the
    /// `handler` message handler and evaluates to the object.
    fn observe_script(&self, variable: &str, handler: &str) -> String {
        OBSERVE_TEMPLATE
            .replace("{{variable}}", variable)
            .replace("{{handler}}", handler)
    }
}

/// Source of cancellation handles. Cancelling invalidates every handle
/// issued so far.
#[derive(Debug, Clone, Default)]
pub struct Cancellable {
    generation: Rc<Cell<u64>>,
}

impl Cancellable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            generation: Rc::clone(&self.generation),
            issued: self.generation.get(),
        }
    }

    pub fn cancel(&self) {
        self.generation.set(self.generation.get() + 1);
    }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    generation: Rc<Cell<u64>>,
    issued: u64,
}

impl CancelHandle {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.generation.get() != self.issued
    }

    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.generation, &other.generation) && self.issued == other.issued
    }
}

struct ViewInner {
    engine: Rc<dyn ScriptEngine>,
    proxies: RefCell<IndexMap<SmolStr, Rc<ProxyInstance>>>,
    channel_installed: Cell<bool>,
}

/// Script context hosted by a toolkit object.
#[derive(Clone)]
pub struct ScriptView {
    inner: Rc<ViewInner>,
}

impl ScriptView {
    pub fn new(engine: Rc<dyn ScriptEngine>) -> Self {
        Self {
            inner: Rc::new(ViewInner {
                engine,
                proxies: RefCell::new(IndexMap::new()),
                channel_installed: Cell::new(false),
            }),
        }
    }

    #[must_use]
    pub fn engine(&self) -> Rc<dyn ScriptEngine> {
        Rc::clone(&self.inner.engine)
    }

    #[must_use]
    pub fn cached_proxy(&self, variable: &str) -> Option<Rc<ProxyInstance>> {
        self.inner.proxies.borrow().get(variable).cloned()
    }

    pub fn cache_proxy(&self, variable: &str, proxy: Rc<ProxyInstance>) {
        self.inner
            .proxies
            .borrow_mut()
            .insert(SmolStr::new(variable), proxy);
    }

    #[must_use]
    pub fn proxies(&self) -> Vec<Rc<ProxyInstance>> {
        self.inner.proxies.borrow().values().cloned().collect()
    }

    #[must_use]
    pub fn notification_channel_installed(&self) -> bool {
        self.inner.channel_installed.get()
    }

    pub(crate) fn mark_notification_channel_installed(&self) {
        self.inner.channel_installed.set(true);
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakScriptView {
        WeakScriptView(Rc::downgrade(&self.inner))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ScriptView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptView")
            .field(
                "proxies",
                &self.inner.proxies.borrow().keys().collect::<Vec<_>>(),
            )
            .field("channel_installed", &self.inner.channel_installed.get())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct WeakScriptView(Weak<ViewInner>);

impl WeakScriptView {
    #[must_use]
    pub fn upgrade(&self) -> Option<ScriptView> {
        self.0.upgrade().map(|inner| ScriptView { inner })
    }
}

impl fmt::Debug for WeakScriptView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakScriptView")
    }
}
