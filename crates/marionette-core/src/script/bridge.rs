use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::mainloop::MainLoop;
use crate::object::canonical_name;
use crate::proxy::{ProxyInstance, ProxyShape};
use crate::value::{to_foreign, ForeignObject, ForeignValue, PropertyValue};

use super::{CancelHandle, EvalResult, ScriptError, ScriptView};

/// Message handler name scripts post property changes to.
pub const DEFAULT_MESSAGE_HANDLER: &str = "clippy_notify";

/// Property change posted by a script.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// Script variable owning the property, when the script knows it.
    pub object: Option<SmolStr>,
    pub property: SmolStr,
    pub value: ForeignValue,
}

impl NotificationMessage {
    /// Read `{object?, property, value}` from a posted script object.
    #[must_use]
    pub fn parse(message: &ForeignValue) -> Option<Self> {
        let object = message.as_object()?;
        let ForeignValue::String(property) = object.get("property") else {
            return None;
        };
        let target = match object.get("object") {
            ForeignValue::String(name) => Some(name),
            _ => None,
        };
        Some(Self {
            object: target,
            property,
            value: object.get("value"),
        })
    }
}

/// Runs scripts against script views on the main loop.
#[derive(Debug, Clone)]
pub struct ScriptBridge {
    main_loop: MainLoop,
    blocking_timeout: Option<Duration>,
    message_handler: SmolStr,
}

impl ScriptBridge {
    #[must_use]
    pub fn new(main_loop: MainLoop) -> Self {
        Self {
            main_loop,
            blocking_timeout: None,
            message_handler: SmolStr::new(DEFAULT_MESSAGE_HANDLER),
        }
    }

    /// Give up on blocking runs after `timeout`. `None` waits forever.
    #[must_use]
    pub fn with_blocking_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_message_handler(mut self, name: impl Into<SmolStr>) -> Self {
        self.message_handler = name.into();
        self
    }

    #[must_use]
    pub fn main_loop(&self) -> &MainLoop {
        &self.main_loop
    }

    #[must_use]
    pub fn message_handler(&self) -> &str {
        &self.message_handler
    }

    /// Evaluate `script` and pump the main loop until it completes.
    ///
    /// Other sources keep being dispatched while waiting. A cancelled
    /// evaluation is `Ok(None)`.
    pub fn run_blocking(
        &self,
        view: &ScriptView,
        script: &str,
    ) -> Result<Option<ForeignValue>, ScriptError> {
        let result: Rc<RefCell<Option<EvalResult>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&result);
        view.engine().evaluate(
            script,
            None,
            Box::new(move |outcome| {
                *sink.borrow_mut() = Some(outcome);
            }),
        );

        let expired = Rc::new(Cell::new(false));
        let timer = self.blocking_timeout.map(|timeout| {
            let expired = Rc::clone(&expired);
            self.main_loop
                .timeout_add(timeout, move || expired.set(true))
        });

        let outcome = loop {
            let done = result.borrow_mut().take();
            if let Some(outcome) = done {
                break outcome;
            }
            if expired.get() {
                let timeout = self.blocking_timeout.unwrap_or_default();
                warn!(?timeout, "blocking script run timed out");
                return Err(ScriptError::TimedOut(timeout));
            }
            if !self.main_loop.iteration(true) {
                break Err(ScriptError::Failed(SmolStr::new("script never completed")));
            }
        };
        if let Some(timer) = timer {
            self.main_loop.source_remove(timer);
        }
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(ScriptError::Cancelled) => {
                debug!("blocking script run cancelled");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Evaluate `script` in the background. `on_done` is skipped once
    /// `cancel` is invalidated.
    pub fn run_detached(
        &self,
        view: &ScriptView,
        script: &str,
        cancel: CancelHandle,
        on_done: impl FnOnce(EvalResult) + 'static,
    ) {
        let guard = cancel.clone();
        view.engine().evaluate(
            script,
            Some(cancel),
            Box::new(move |outcome| {
                if guard.is_cancelled() {
                    debug!("discarding result of superseded script");
                    return;
                }
                on_done(outcome);
            }),
        );
    }

    /// Evaluate `variable` and infer a proxy shape from the object it holds.
    pub fn discover(
        &self,
        view: &ScriptView,
        variable: &str,
    ) -> Result<(ForeignObject, ProxyShape), ScriptError> {
        match self.run_blocking(view, variable)? {
            Some(ForeignValue::Object(object)) => {
                let shape = ProxyShape::infer(&object);
                Ok((object, shape))
            }
            Some(_) => Err(ScriptError::NotAnObject(SmolStr::new(variable))),
            None => Err(ScriptError::Cancelled),
        }
    }

    /// Make `variable` report its changes and return the live object.
    pub fn bootstrap(&self, view: &ScriptView, variable: &str) -> Result<ForeignObject, ScriptError> {
        let script = view
            .engine()
            .observe_script(variable, &self.message_handler);
        match self.run_blocking(view, &script)? {
            Some(ForeignValue::Object(object)) => Ok(object),
            Some(_) => Err(ScriptError::NotAnObject(SmolStr::new(variable))),
            None => Err(ScriptError::Cancelled),
        }
    }

    /// Copy every property of `object` into the proxy slots.
    pub fn sync(&self, proxy: &ProxyInstance, object: &ForeignObject) {
        for (slot, descriptor) in proxy.proxy_type().shape().descriptors() {
            let value = object.get(&descriptor.name.replace('-', "_"));
            proxy.apply_remote(slot, &value);
        }
    }

    /// Register the change notification handler of `view` once.
    pub fn install_notification_channel(&self, view: &ScriptView) {
        if view.notification_channel_installed() {
            return;
        }
        let weak = view.downgrade();
        let registered = view.engine().register_message_handler(
            &self.message_handler,
            Rc::new(move |message: ForeignValue| {
                if let Some(view) = weak.upgrade() {
                    route_notification(&view, &message);
                }
            }),
        );
        if registered {
            view.mark_notification_channel_installed();
        } else {
            warn!(handler = %self.message_handler, "script engine refused message handler");
        }
    }

    /// Assign `value` to the slot's script property in the background,
    /// superseding any write still in flight for that slot.
    pub fn write_property(&self, proxy: &ProxyInstance, slot: usize, value: &PropertyValue) {
        let Some(descriptor) = proxy.descriptor(slot) else {
            warn!(path = %proxy.path(), slot, "write to invalid proxy slot");
            return;
        };
        let (Some(view), Some(variable)) = (proxy.view(), proxy.variable()) else {
            return;
        };
        let literal = match to_foreign(value).map(|foreign| foreign.to_literal()) {
            Ok(Some(literal)) => literal,
            Ok(None) => {
                warn!(property = %descriptor.name, "value has no script literal");
                return;
            }
            Err(err) => {
                warn!(property = %descriptor.name, %err, "cannot write proxy property");
                return;
            }
        };
        let Some((handle, write)) = proxy.begin_write(slot) else {
            return;
        };
        let script = format!(
            "{variable}.{}={literal};",
            descriptor.name.replace('-', "_")
        );
        debug!(%script, "writing script property");
        let finished = handle.clone();
        self.run_detached(&view, &script, handle, move |outcome| {
            if let Some(write) = write.upgrade() {
                write.finish(&finished);
            }
            if let Err(err) = outcome {
                warn!(%err, "script property write failed");
            }
        });
    }
}

fn route_notification(view: &ScriptView, message: &ForeignValue) {
    let Some(message) = NotificationMessage::parse(message) else {
        warn!(
            message_type = message.type_name(),
            "ignoring malformed script notification"
        );
        return;
    };
    let property = canonical_name(&message.property);
    let targets = match &message.object {
        Some(variable) => view.cached_proxy(variable).into_iter().collect(),
        None => view.proxies(),
    };
    for proxy in targets {
        if let Some(slot) = proxy.slot_of(&property) {
            proxy.apply_remote(slot, &message.value);
        }
    }
}
