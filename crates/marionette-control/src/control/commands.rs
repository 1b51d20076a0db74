use std::rc::Rc;
use std::time::Duration;

use marionette_core::object::{canonical_name, Emission, NOTIFY_SIGNAL};
use marionette_core::value::{
    from_wire, to_wire, PropertyDescriptor, PropertyFlags, PropertyValue, ValueKind, WireValue,
};
use marionette_core::{ControlError, ObjectRef, Popover};
use smol_str::SmolStr;
use tracing::{debug, warn};

use super::{Connection, Controller, Highlight, Inner, Message};
use crate::protocol::ControlEvent;

impl Controller {
    /// Add the highlight style class to `object`. A non-zero timeout
    /// removes it again after `timeout_ms`.
    pub fn highlight(&self, object: &str, timeout_ms: u32) -> Result<(), ControlError> {
        let widget = self.resolve_widget(object)?;
        let inner = &self.inner;
        inner
            .surface
            .add_style_class(&widget, &inner.settings.style_class);

        let mut highlights = inner.highlights.borrow_mut();
        let index = match highlights
            .iter()
            .position(|entry| entry.object.ptr_eq(&widget))
        {
            Some(index) => index,
            None => {
                highlights.push(Highlight {
                    object: widget.clone(),
                    expiry: None,
                });
                highlights.len() - 1
            }
        };
        if let Some(previous) = highlights[index].expiry.take() {
            inner.main_loop.source_remove(previous);
        }
        if timeout_ms > 0 {
            let weak = inner.this.clone();
            let target = widget.downgrade();
            let expiry = inner
                .main_loop
                .timeout_add(Duration::from_millis(u64::from(timeout_ms)), move || {
                    if let (Some(inner), Some(widget)) = (weak.upgrade(), target.upgrade()) {
                        debug!(object = %widget.display_name(), "highlight expired");
                        inner.clear_highlight(&widget);
                    }
                });
            highlights[index].expiry = Some(expiry);
        }
        Ok(())
    }

    pub fn unhighlight(&self, object: &str) -> Result<(), ControlError> {
        let widget = self.inner.resolver.resolve(object)?;
        self.inner.clear_highlight(&widget);
        Ok(())
    }

    /// Show message `id` next to `relative_to`.
    ///
    /// Re-using a shown id replaces text and icon of the existing popover,
    /// which stays attached to its original widget.
    pub fn message(
        &self,
        id: &str,
        text: &str,
        icon_name: &str,
        relative_to: &str,
        timeout_ms: u32,
    ) -> Result<(), ControlError> {
        let inner = &self.inner;
        let existing = inner
            .messages
            .borrow()
            .get(id)
            .map(|message| message.popover.relative_to.clone());
        let relative_to = match existing {
            Some(widget) => widget,
            None => self.resolve_widget(relative_to)?,
        };
        let popover = Popover {
            text: SmolStr::new(text),
            icon_name: SmolStr::new(icon_name),
            relative_to,
        };
        inner.surface.show_popover(id, &popover);

        let expiry = (timeout_ms > 0).then(|| {
            let weak = inner.this.clone();
            let message_id = SmolStr::new(id);
            inner
                .main_loop
                .timeout_add(Duration::from_millis(u64::from(timeout_ms)), move || {
                    if let Some(inner) = weak.upgrade() {
                        debug!(id = %message_id, "message expired");
                        inner.close_message(&message_id);
                    }
                })
        });
        let previous = inner
            .messages
            .borrow_mut()
            .insert(SmolStr::new(id), Message { popover, expiry });
        if let Some(expiry) = previous.and_then(|message| message.expiry) {
            inner.main_loop.source_remove(expiry);
        }
        Ok(())
    }

    pub fn message_clear(&self, id: &str) -> Result<(), ControlError> {
        if self.inner.close_message(id) {
            Ok(())
        } else {
            Err(ControlError::UnknownMessageId(SmolStr::new(id)))
        }
    }

    /// Report a popover closed by the toolkit itself.
    pub fn message_closed(&self, id: &str) {
        self.inner.close_message(id);
    }

    #[must_use]
    pub fn message_ids(&self) -> Vec<SmolStr> {
        self.inner.messages.borrow().keys().cloned().collect()
    }

    pub fn set(&self, object: &str, property: &str, value: &WireValue) -> Result<(), ControlError> {
        let resolved = self
            .inner
            .resolver
            .resolve_for_command(object, Some(property), None)?;
        let Some(descriptor) = resolved.property else {
            return Err(no_property(object, property));
        };
        if !descriptor.flags.is_settable() {
            return Err(ControlError::NotWritable {
                object: SmolStr::new(object),
                property: descriptor.name,
            });
        }
        let value = from_wire(value, &descriptor, &self.inner.resolver)?;
        resolved.object.set_property(&descriptor.name, value)
    }

    /// Read a property, boxed with its type tag.
    pub fn get(&self, object: &str, property: &str) -> Result<WireValue, ControlError> {
        let resolved = self
            .inner
            .resolver
            .resolve_for_command(object, Some(property), None)?;
        let Some(descriptor) = resolved.property else {
            return Err(no_property(object, property));
        };
        if !descriptor.flags.readable {
            return Err(ControlError::NotReadable {
                object: SmolStr::new(object),
                property: descriptor.name,
            });
        }
        let value = current_value(&resolved.object, &descriptor);
        Ok(to_wire(&value, &descriptor).boxed())
    }

    /// Forward every emission of `signal` on `object` to subscribers.
    ///
    /// `notify` needs the property name as detail and produces
    /// `ObjectNotify` events; every other signal produces `ObjectSignal`.
    pub fn connect(
        &self,
        object: &str,
        signal: &str,
        detail: Option<&str>,
    ) -> Result<(), ControlError> {
        let inner = &self.inner;
        let resolved = inner.resolver.resolve_for_command(object, None, Some(signal))?;
        let Some(signal) = resolved.signal else {
            return Err(ControlError::NoSignal {
                object: SmolStr::new(object),
                signal: SmolStr::new(signal),
            });
        };
        let mut detail = detail
            .filter(|detail| !detail.is_empty())
            .map(canonical_name);
        let target = resolved.object.downgrade();
        let weak = inner.this.clone();

        let handler: Rc<dyn Fn(&Emission)> = if signal.name == NOTIFY_SIGNAL {
            let Some(property) = detail.as_deref() else {
                return Err(ControlError::MissingDetailForNotify(SmolStr::new(object)));
            };
            let Some(descriptor) = resolved.object.class().property(property).cloned() else {
                return Err(no_property(object, property));
            };
            detail = Some(descriptor.name);
            Rc::new(move |emission: &Emission| {
                let (Some(inner), Some(object)) = (weak.upgrade(), target.upgrade()) else {
                    return;
                };
                let Some(name) = emission.detail.as_deref() else {
                    return;
                };
                let class = object.class();
                let Some(descriptor) = class.property(name) else {
                    return;
                };
                let value = emission
                    .args
                    .first()
                    .cloned()
                    .unwrap_or_else(|| current_value(&object, descriptor));
                inner.broadcast(&ControlEvent::object_notify(
                    &object.display_name(),
                    &descriptor.name,
                    to_wire(&value, descriptor),
                ));
            })
        } else {
            let info = signal.clone();
            Rc::new(move |emission: &Emission| {
                let (Some(inner), Some(object)) = (weak.upgrade(), target.upgrade()) else {
                    return;
                };
                let mut params = Vec::with_capacity(emission.args.len() + 1);
                params.push(WireValue::String(
                    object.name().map(|name| name.to_string()).unwrap_or_default(),
                ));
                for (index, arg) in emission.args.iter().enumerate() {
                    match info.params.get(index) {
                        Some(kind) => {
                            let descriptor = signal_param(&info.name, index, kind.clone());
                            params.push(to_wire(arg, &descriptor));
                        }
                        None => warn!(signal = %info.name, index, "unexpected signal argument"),
                    }
                }
                inner.broadcast(&ControlEvent::object_signal(
                    &info.name,
                    emission.detail.as_deref(),
                    params,
                ));
            })
        };

        let handler = resolved
            .object
            .connect(&signal.name, detail.as_deref(), handler);
        inner.connections.borrow_mut().push(Connection {
            object: resolved.object.downgrade(),
            handler,
        });
        debug!(object, signal = %signal.name, detail = detail.as_deref(), "connected signal");
        Ok(())
    }

    /// Emit an action signal. Returns the boxed return value when the signal
    /// declares one.
    pub fn emit(
        &self,
        object: &str,
        signal: &str,
        detail: Option<&str>,
        params: &[WireValue],
    ) -> Result<Option<WireValue>, ControlError> {
        let inner = &self.inner;
        let resolved = inner.resolver.resolve_for_command(object, None, Some(signal))?;
        let Some(signal) = resolved.signal else {
            return Err(ControlError::NoSignal {
                object: SmolStr::new(object),
                signal: SmolStr::new(signal),
            });
        };
        if !signal.action {
            return Err(ControlError::NotAnActionSignal {
                object: SmolStr::new(object),
                signal: signal.name,
            });
        }
        if params.len() != signal.params.len() {
            return Err(ControlError::InvalidValue(SmolStr::new(format!(
                "signal '{}' takes {} parameters, got {}",
                signal.name,
                signal.params.len(),
                params.len()
            ))));
        }
        let args = params
            .iter()
            .zip(&signal.params)
            .enumerate()
            .map(|(index, (wire, kind))| {
                from_wire(wire, &signal_param(&signal.name, index, kind.clone()), &inner.resolver)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let detail = detail.filter(|detail| !detail.is_empty());
        let result = resolved.object.emit(&signal.name, detail, &args);
        Ok(signal.returns.map(|kind| {
            let descriptor = PropertyDescriptor::new(
                format!("{}.return", signal.name),
                kind.clone(),
                PropertyFlags::READABLE,
            );
            let value = result.unwrap_or_else(|| PropertyValue::default_for(&kind));
            to_wire(&value, &descriptor).boxed()
        }))
    }

    /// Replace the application stylesheet.
    pub fn set_css(&self, css: &str) {
        *self.inner.css.borrow_mut() = SmolStr::new(css);
        self.inner.surface.set_css(css);
    }

    #[must_use]
    pub fn css(&self) -> SmolStr {
        self.inner.css.borrow().clone()
    }

    fn resolve_widget(&self, path: &str) -> Result<ObjectRef, ControlError> {
        let object = self.inner.resolver.resolve(path)?;
        if object.is_widget() {
            Ok(object)
        } else {
            Err(ControlError::NotAWidget {
                object: SmolStr::new(path),
                type_name: object.type_name(),
            })
        }
    }
}

impl Inner {
    fn clear_highlight(&self, widget: &ObjectRef) {
        self.surface
            .remove_style_class(widget, &self.settings.style_class);
        let removed = {
            let mut highlights = self.highlights.borrow_mut();
            highlights
                .iter()
                .position(|entry| entry.object.ptr_eq(widget))
                .map(|index| highlights.remove(index))
        };
        if let Some(expiry) = removed.and_then(|entry| entry.expiry) {
            self.main_loop.source_remove(expiry);
        }
    }

    /// Hide and forget message `id`, then announce it. Returns whether the
    /// message was shown.
    fn close_message(&self, id: &str) -> bool {
        let Some(message) = self.messages.borrow_mut().shift_remove(id) else {
            return false;
        };
        if let Some(expiry) = message.expiry {
            self.main_loop.source_remove(expiry);
        }
        self.surface.hide_popover(id);
        self.broadcast(&ControlEvent::message_done(id));
        true
    }
}

pub(super) fn current_value(object: &ObjectRef, descriptor: &PropertyDescriptor) -> PropertyValue {
    object
        .get_property(&descriptor.name)
        .unwrap_or_else(|| descriptor.default.clone())
}

pub(super) fn no_property(object: &str, property: &str) -> ControlError {
    ControlError::NoProperty {
        object: SmolStr::new(object),
        property: SmolStr::new(property),
    }
}

fn signal_param(signal: &str, index: usize, kind: ValueKind) -> PropertyDescriptor {
    PropertyDescriptor::new(format!("{signal}[{index}]"), kind, PropertyFlags::READWRITE)
}
