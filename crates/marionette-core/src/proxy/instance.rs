use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::ControlError;
use crate::object::{
    Emission, HandlerId, HandlerRegistry, HostObject, ObjectClass, SignalHandler, NOTIFY_SIGNAL,
};
use crate::script::{CancelHandle, Cancellable, ScriptBridge, ScriptView, WeakScriptView};
use crate::value::{from_foreign, ForeignValue, PropertyDescriptor, PropertyValue};

use super::ProxyType;

/// Outcome of the bootstrap of a bound proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Slots reflect the script object.
    Synced,
    /// Bootstrap failed; slots hold defaults.
    DefaultOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Unbound,
    Bootstrapping,
    Live(SyncState),
    Disposed,
}

/// Write bookkeeping of one slot. At most one write is pending.
#[derive(Debug, Default)]
pub(crate) struct SlotWrite {
    cancellable: Cancellable,
    pending: RefCell<Option<CancelHandle>>,
}

impl SlotWrite {
    fn begin(&self) -> CancelHandle {
        self.cancellable.cancel();
        let handle = self.cancellable.handle();
        *self.pending.borrow_mut() = Some(handle.clone());
        handle
    }

    /// Clear the pending handle if it is still `handle`.
    pub(crate) fn finish(&self, handle: &CancelHandle) {
        let mut pending = self.pending.borrow_mut();
        if pending.as_ref().is_some_and(|current| current.same_as(handle)) {
            *pending = None;
        }
    }

    fn cancel(&self) {
        self.cancellable.cancel();
        self.pending.borrow_mut().take();
    }
}

struct Binding {
    view: WeakScriptView,
    variable: SmolStr,
    bridge: ScriptBridge,
}

/// Object mirroring a global script variable through typed slots.
pub struct ProxyInstance {
    proxy_type: Rc<ProxyType>,
    path: SmolStr,
    slots: RefCell<Vec<Option<PropertyValue>>>,
    writes: Vec<Rc<SlotWrite>>,
    binding: RefCell<Option<Binding>>,
    state: Cell<ProxyState>,
    handlers: HandlerRegistry,
}

impl ProxyInstance {
    /// Allocate an unbound instance with every slot at its default.
    #[must_use]
    pub fn instantiate(proxy_type: Rc<ProxyType>, path: impl Into<SmolStr>) -> Rc<Self> {
        let shape = proxy_type.shape();
        let slots = (0..shape.len())
            .map(|slot| shape.descriptor(slot).map(|desc| desc.default.clone()))
            .collect();
        let writes = (0..shape.len()).map(|_| Rc::default()).collect();
        Rc::new(Self {
            proxy_type,
            path: path.into(),
            slots: RefCell::new(slots),
            writes,
            binding: RefCell::new(None),
            state: Cell::new(ProxyState::Unbound),
            handlers: HandlerRegistry::default(),
        })
    }

    /// Attach the instance to `variable` of `view` and bootstrap it.
    ///
    /// A failed bootstrap leaves the defaults in place.
    pub fn bind(&self, bridge: &ScriptBridge, view: &ScriptView, variable: &str) {
        if self.state.get() != ProxyState::Unbound {
            warn!(path = %self.path, state = ?self.state.get(), "proxy is already bound");
            return;
        }
        *self.binding.borrow_mut() = Some(Binding {
            view: view.downgrade(),
            variable: SmolStr::new(variable),
            bridge: bridge.clone(),
        });
        self.state.set(ProxyState::Bootstrapping);
        bridge.install_notification_channel(view);
        let sync = match bridge.bootstrap(view, variable) {
            Ok(object) => {
                bridge.sync(self, &object);
                SyncState::Synced
            }
            Err(err) => {
                warn!(path = %self.path, %err, "script proxy bootstrap failed, keeping defaults");
                SyncState::DefaultOnly
            }
        };
        if self.state.get() == ProxyState::Bootstrapping {
            self.state.set(ProxyState::Live(sync));
        }
    }

    #[must_use]
    pub fn state(&self) -> ProxyState {
        self.state.get()
    }

    #[must_use]
    pub fn proxy_type(&self) -> &Rc<ProxyType> {
        &self.proxy_type
    }

    /// Path the instance was created for.
    #[must_use]
    pub fn path(&self) -> &SmolStr {
        &self.path
    }

    #[must_use]
    pub fn variable(&self) -> Option<SmolStr> {
        self.binding
            .borrow()
            .as_ref()
            .map(|binding| binding.variable.clone())
    }

    #[must_use]
    pub fn view(&self) -> Option<ScriptView> {
        self.binding
            .borrow()
            .as_ref()
            .and_then(|binding| binding.view.upgrade())
    }

    /// Slot count including the reserved slot.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.proxy_type.shape().len()
    }

    #[must_use]
    pub fn descriptor(&self, slot: usize) -> Option<&PropertyDescriptor> {
        self.proxy_type.shape().descriptor(slot)
    }

    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.proxy_type.shape().slot_of(name)
    }

    /// Last known value of a slot. Never touches the script context.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<PropertyValue> {
        let value = self.slots.borrow().get(slot).cloned().flatten();
        if value.is_none() {
            warn!(path = %self.path, slot, "invalid proxy slot");
        }
        value
    }

    /// Store a value and mirror it into the script context.
    ///
    /// Returns `false` when the write was rejected or the value is unchanged.
    pub fn set(&self, slot: usize, value: PropertyValue) -> bool {
        if self.state.get() == ProxyState::Disposed {
            warn!(path = %self.path, slot, "write to disposed proxy");
            return false;
        }
        if !self.store(slot, &value) {
            return false;
        }
        let bridge = self
            .binding
            .borrow()
            .as_ref()
            .filter(|binding| binding.view.upgrade().is_some())
            .map(|binding| binding.bridge.clone());
        if let Some(bridge) = bridge {
            bridge.write_property(self, slot, &value);
        }
        true
    }

    /// Apply a change reported by the script side. Does not write back.
    pub fn apply_remote(&self, slot: usize, value: &ForeignValue) -> bool {
        let Some(descriptor) = self.descriptor(slot) else {
            warn!(path = %self.path, slot, "notification for invalid proxy slot");
            return false;
        };
        match from_foreign(value, descriptor) {
            Ok(value) => self.store(slot, &value),
            Err(err) => {
                warn!(path = %self.path, property = %descriptor.name, %err, "ignoring script value");
                false
            }
        }
    }

    /// Handle of the write currently in flight for `slot`.
    #[must_use]
    pub fn pending_write(&self, slot: usize) -> Option<CancelHandle> {
        self.writes
            .get(slot)
            .and_then(|write| write.pending.borrow().clone())
    }

    /// Cancel every pending write and release the script binding.
    pub fn finalize(&self) {
        if self.state.get() == ProxyState::Disposed {
            return;
        }
        for write in &self.writes {
            write.cancel();
        }
        if let Ok(mut binding) = self.binding.try_borrow_mut() {
            binding.take();
        }
        self.state.set(ProxyState::Disposed);
        debug!(path = %self.path, "proxy disposed");
    }

    /// Start a write on `slot`, superseding the previous one.
    pub(crate) fn begin_write(&self, slot: usize) -> Option<(CancelHandle, Weak<SlotWrite>)> {
        let write = self.writes.get(slot)?;
        Some((write.begin(), Rc::downgrade(write)))
    }

    /// Validate, compare and store. Notifies listeners on change.
    fn store(&self, slot: usize, value: &PropertyValue) -> bool {
        let Some(descriptor) = self.descriptor(slot) else {
            warn!(path = %self.path, slot, "invalid proxy slot");
            return false;
        };
        if !value.fits(&descriptor.kind) {
            warn!(
                path = %self.path,
                property = %descriptor.name,
                kind = %descriptor.kind,
                "value does not match proxy property kind"
            );
            return false;
        }
        {
            let mut slots = self.slots.borrow_mut();
            let Some(current) = slots.get_mut(slot) else {
                return false;
            };
            if current
                .as_ref()
                .is_some_and(|current| descriptor.values_equal(current, value))
            {
                return false;
            }
            *current = Some(value.clone());
        }
        self.handlers.emit(&Emission {
            signal: NOTIFY_SIGNAL.into(),
            detail: Some(descriptor.name.clone()),
            args: vec![value.clone()],
        });
        true
    }
}

impl Drop for ProxyInstance {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl std::fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("type", self.proxy_type.name())
            .field("path", &self.path)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl HostObject for ProxyInstance {
    fn class(&self) -> Rc<ObjectClass> {
        self.proxy_type.class()
    }

    fn name(&self) -> Option<SmolStr> {
        Some(self.path.clone())
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        self.slot_of(name).and_then(|slot| self.get(slot))
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), ControlError> {
        let Some(slot) = self.slot_of(name) else {
            return Err(ControlError::NoProperty {
                object: self.path.clone(),
                property: SmolStr::new(name),
            });
        };
        if let Some(descriptor) = self.descriptor(slot) {
            if !value.fits(&descriptor.kind) {
                return Err(ControlError::InvalidValue(SmolStr::new(format!(
                    "property '{}' expects {}",
                    descriptor.name, descriptor.kind
                ))));
            }
        }
        self.set(slot, value);
        Ok(())
    }

    fn connect(&self, signal: &str, detail: Option<&str>, handler: SignalHandler) -> HandlerId {
        self.handlers.connect(signal, detail, handler)
    }

    fn disconnect(&self, id: HandlerId) -> bool {
        self.handlers.disconnect(id)
    }

    fn emit(
        &self,
        signal: &str,
        detail: Option<&str>,
        args: &[PropertyValue],
    ) -> Option<PropertyValue> {
        self.handlers.emit(&Emission {
            signal: SmolStr::new(signal),
            detail: detail.map(SmolStr::new),
            args: args.to_vec(),
        });
        None
    }
}
