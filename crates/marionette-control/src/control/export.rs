//! Exported objects: a stable object path per resolved object, with an
//! introspection document and generic property access.

use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use marionette_core::object::{Emission, NOTIFY_SIGNAL};
use marionette_core::value::{from_wire, to_wire, PropertyDescriptor, WireValue};
use marionette_core::{ControlError, ObjectClass, ObjectRef};
use smol_str::SmolStr;
use tracing::debug;

use super::commands::{current_value, no_property};
use super::{Controller, ExportedObject};
use crate::protocol::ControlEvent;

/// Object path under which `object` is exported.
#[must_use]
pub fn export_path(root: &str, object: &str) -> SmolStr {
    let root = root.trim_end_matches('/');
    SmolStr::new(format!("{root}/objects/{}", object.replace('.', "/")))
}

/// Interface name derived from the root object path.
#[must_use]
pub fn interface_name(root: &str) -> SmolStr {
    let dotted = root.trim_matches('/').replace('/', ".");
    SmolStr::new(format!("{dotted}.Object"))
}

/// Properties that show up on an exported object.
fn is_exported(descriptor: &PropertyDescriptor) -> bool {
    descriptor.flags.readable && descriptor.flags.is_settable()
}

/// Introspection document of one exported class.
#[must_use]
pub fn introspection_xml(interface: &str, class: &ObjectClass) -> String {
    let mut xml = String::from("<node xmlns:doc=\"http://www.freedesktop.org/dbus/1.0/doc.dtd\">\n");
    let _ = writeln!(
        xml,
        "  <interface name=\"{}\">",
        escape_xml_attr(interface)
    );
    for descriptor in class.properties().filter(|descriptor| is_exported(descriptor)) {
        let _ = writeln!(
            xml,
            "    <property type=\"{}\" name=\"{}\" access=\"readwrite\"/>",
            descriptor.kind.signature(),
            escape_xml_attr(&descriptor.name)
        );
    }
    xml.push_str("  </interface>\n</node>\n");
    xml
}

/// Script-side property names may hold any character.
fn escape_xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

impl Controller {
    /// Export `object` and return its object path and introspection XML.
    /// Exporting the same path again replaces the previous export.
    pub fn export(&self, object: &str) -> Result<(SmolStr, String), ControlError> {
        let inner = &self.inner;
        let target = inner.resolver.resolve(object)?;
        let path = export_path(&inner.settings.object_path, object);
        let xml = introspection_xml(&inner.interface, &target.class());

        let weak = inner.this.clone();
        let weak_target = target.downgrade();
        let event_path = path.clone();
        let handler: Rc<dyn Fn(&Emission)> = Rc::new(move |emission: &Emission| {
            let (Some(inner), Some(object)) = (weak.upgrade(), weak_target.upgrade()) else {
                return;
            };
            let Some(name) = emission.detail.as_deref() else {
                return;
            };
            let class = object.class();
            let Some(descriptor) = class.property(name).filter(|d| is_exported(d)) else {
                return;
            };
            let mut changed = IndexMap::new();
            changed.insert(
                descriptor.name.clone(),
                to_wire(&current_value(&object, descriptor), descriptor),
            );
            inner.broadcast(&ControlEvent::properties_changed(
                &event_path,
                &inner.interface,
                changed,
            ));
        });
        let notify = target.connect(NOTIFY_SIGNAL, None, handler);

        let previous = inner.exports.borrow_mut().insert(
            path.clone(),
            ExportedObject {
                object: target,
                notify,
            },
        );
        if let Some(previous) = previous {
            previous.object.disconnect(previous.notify);
        }
        debug!(object, %path, "exported object");
        Ok((path, xml))
    }

    #[must_use]
    pub fn exported_paths(&self) -> Vec<SmolStr> {
        self.inner.exports.borrow().keys().cloned().collect()
    }

    pub fn properties_get(&self, path: &str, property: &str) -> Result<WireValue, ControlError> {
        let (object, descriptor) = self.exported_property(path, property)?;
        Ok(to_wire(&current_value(&object, &descriptor), &descriptor).boxed())
    }

    pub fn properties_set(
        &self,
        path: &str,
        property: &str,
        value: &WireValue,
    ) -> Result<(), ControlError> {
        let (object, descriptor) = self.exported_property(path, property)?;
        let value = from_wire(value, &descriptor, &self.inner.resolver)?;
        object.set_property(&descriptor.name, value)
    }

    pub fn properties_get_all(
        &self,
        path: &str,
    ) -> Result<IndexMap<SmolStr, WireValue>, ControlError> {
        let object = self.exported_object(path)?;
        let class = object.class();
        Ok(class
            .properties()
            .filter(|descriptor| is_exported(descriptor))
            .map(|descriptor| {
                (
                    descriptor.name.clone(),
                    to_wire(&current_value(&object, descriptor), descriptor),
                )
            })
            .collect())
    }

    fn exported_object(&self, path: &str) -> Result<ObjectRef, ControlError> {
        self.inner
            .exports
            .borrow()
            .get(path)
            .map(|export| export.object.clone())
            .ok_or_else(|| ControlError::NotFound(SmolStr::new(path)))
    }

    fn exported_property(
        &self,
        path: &str,
        property: &str,
    ) -> Result<(ObjectRef, PropertyDescriptor), ControlError> {
        let object = self.exported_object(path)?;
        let descriptor = object
            .class()
            .property(property)
            .filter(|descriptor| is_exported(descriptor))
            .cloned()
            .ok_or_else(|| no_property(path, property))?;
        Ok((object, descriptor))
    }
}
