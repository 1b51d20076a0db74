//! Object model shared by toolkit objects and script proxies.

#![allow(missing_docs)]

mod signals;

use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::ControlError;
use crate::script::ScriptView;
use crate::value::{PropertyDescriptor, PropertyValue, ValueKind};

pub use signals::{Emission, HandlerId, HandlerRegistry, SignalHandler};

/// Name of the detailed property change signal every class exposes.
pub const NOTIFY_SIGNAL: &str = "notify";

/// Prefix of builder ids generated for anonymous objects.
const ANONYMOUS_ID_PREFIX: &str = "___object_";

/// A live object of the host application.
pub trait HostObject {
    fn class(&self) -> Rc<ObjectClass>;

    /// Name used to address the object in paths.
    fn name(&self) -> Option<SmolStr>;

    /// Whether the object is a visual element.
    fn is_widget(&self) -> bool {
        false
    }

    fn is_visible(&self) -> bool {
        true
    }

    fn children(&self) -> Vec<ObjectRef> {
        Vec::new()
    }

    /// Script context hosted by this object, if any.
    fn script_view(&self) -> Option<ScriptView> {
        None
    }

    /// Current value of a property, `None` if the class has no such property.
    fn get_property(&self, name: &str) -> Option<PropertyValue>;

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), ControlError>;

    fn connect(&self, signal: &str, detail: Option<&str>, handler: SignalHandler) -> HandlerId;

    fn disconnect(&self, id: HandlerId) -> bool;

    /// Emit a signal. Returns the class handler's return value.
    fn emit(
        &self,
        signal: &str,
        detail: Option<&str>,
        args: &[PropertyValue],
    ) -> Option<PropertyValue>;
}

/// Shared handle to a live object, compared by identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<dyn HostObject>);

impl ObjectRef {
    pub fn new(object: Rc<dyn HostObject>) -> Self {
        Self(object)
    }

    #[must_use]
    pub fn type_name(&self) -> SmolStr {
        self.0.class().type_name.clone()
    }

    /// Name for diagnostics, falling back to the type name.
    #[must_use]
    pub fn display_name(&self) -> SmolStr {
        self.0.name().unwrap_or_else(|| self.type_name())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0).cast::<()>(),
            Rc::as_ptr(&other.0).cast::<()>(),
        )
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }
}

impl<T: HostObject + 'static> From<Rc<T>> for ObjectRef {
    fn from(value: Rc<T>) -> Self {
        Self(value)
    }
}

impl Deref for ObjectRef {
    type Target = dyn HostObject;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type", &self.type_name())
            .field("name", &self.0.name())
            .finish()
    }
}

#[derive(Clone)]
pub struct WeakObjectRef(Weak<dyn HostObject>);

impl WeakObjectRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakObjectRef")
    }
}

/// Signal metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalInfo {
    pub name: SmolStr,
    /// May be emitted by controllers.
    pub action: bool,
    /// Accepts a `::detail` qualifier.
    pub detailed: bool,
    pub params: Vec<ValueKind>,
    pub returns: Option<ValueKind>,
}

impl SignalInfo {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            action: false,
            detailed: false,
            params: Vec::new(),
            returns: None,
        }
    }

    #[must_use]
    pub fn action(mut self) -> Self {
        self.action = true;
        self
    }

    #[must_use]
    pub fn detailed(mut self) -> Self {
        self.detailed = true;
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = ValueKind>) -> Self {
        self.params = params.into_iter().collect();
        self
    }

    #[must_use]
    pub fn returns(mut self, kind: ValueKind) -> Self {
        self.returns = Some(kind);
        self
    }
}

/// Property and signal table of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectClass {
    pub type_name: SmolStr,
    properties: IndexMap<SmolStr, PropertyDescriptor>,
    signals: IndexMap<SmolStr, SignalInfo>,
}

impl ObjectClass {
    pub fn builder(type_name: impl Into<SmolStr>) -> ObjectClassBuilder {
        ObjectClassBuilder {
            class: ObjectClass {
                type_name: type_name.into(),
                properties: IndexMap::new(),
                signals: IndexMap::new(),
            },
        }
    }

    /// Look up a property; `_` and `-` are interchangeable in names.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(canonical_name(name).as_str())
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&SignalInfo> {
        self.signals.get(canonical_name(name).as_str())
    }

    pub fn signals(&self) -> impl Iterator<Item = &SignalInfo> {
        self.signals.values()
    }
}

pub struct ObjectClassBuilder {
    class: ObjectClass,
}

impl ObjectClassBuilder {
    #[must_use]
    pub fn property(mut self, mut descriptor: PropertyDescriptor) -> Self {
        descriptor.name = canonical_name(&descriptor.name);
        self.class
            .properties
            .insert(descriptor.name.clone(), descriptor);
        self
    }

    #[must_use]
    pub fn signal(mut self, mut signal: SignalInfo) -> Self {
        signal.name = canonical_name(&signal.name);
        self.class.signals.insert(signal.name.clone(), signal);
        self
    }

    #[must_use]
    pub fn build(mut self) -> ObjectClass {
        if !self.class.signals.contains_key(NOTIFY_SIGNAL) {
            self.class
                .signals
                .insert(NOTIFY_SIGNAL.into(), SignalInfo::new(NOTIFY_SIGNAL).detailed());
        }
        self.class
    }
}

/// Canonical member name: `_` is written as `-`.
#[must_use]
pub fn canonical_name(name: &str) -> SmolStr {
    if name.contains('_') {
        SmolStr::new(name.replace('_', "-"))
    } else {
        SmolStr::new(name)
    }
}

/// Addressable name of a toolkit object.
///
/// The widget name wins unless the toolkit left it at the type name; then
/// the builder id is used unless it was generated for an anonymous object.
#[must_use]
pub fn effective_name(
    widget_name: Option<&str>,
    type_name: &str,
    buildable_id: Option<&str>,
) -> Option<SmolStr> {
    match widget_name {
        Some(name) if !name.is_empty() && name != type_name => Some(SmolStr::new(name)),
        _ => buildable_id
            .filter(|id| !id.starts_with(ANONYMOUS_ID_PREFIX))
            .map(SmolStr::new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyFlags;

    #[test]
    fn class_always_has_notify() {
        let class = ObjectClass::builder("Plain").build();
        let notify = class.signal("notify").unwrap();
        assert!(notify.detailed);
        assert!(!notify.action);
    }

    #[test]
    fn property_lookup_accepts_underscores() {
        let class = ObjectClass::builder("Label")
            .property(PropertyDescriptor::new(
                "use_markup",
                ValueKind::Bool,
                PropertyFlags::READWRITE,
            ))
            .build();
        assert_eq!(class.property("use-markup").unwrap().name, "use-markup");
        assert!(class.property("use_markup").is_some());
    }

    #[test]
    fn effective_name_rules() {
        assert_eq!(
            effective_name(Some("main_window"), "Window", None).as_deref(),
            Some("main_window")
        );
        assert_eq!(
            effective_name(Some("Window"), "Window", Some("win1")).as_deref(),
            Some("win1")
        );
        assert_eq!(
            effective_name(Some("Window"), "Window", Some("___object_3")),
            None
        );
        assert_eq!(effective_name(None, "Box", None), None);
    }
}
