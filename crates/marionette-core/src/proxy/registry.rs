use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::object::{canonical_name, ObjectClass};
use crate::value::{ForeignObject, PropertyDescriptor, PropertyFlags};

/// Slot layout of a proxy type. Slot 0 is reserved and never addressable.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyShape {
    slots: Vec<Option<PropertyDescriptor>>,
}

impl ProxyShape {
    /// Lay out `descriptors` from slot 1 on.
    pub fn new(descriptors: impl IntoIterator<Item = PropertyDescriptor>) -> Self {
        let mut slots = vec![None];
        for mut descriptor in descriptors {
            descriptor.name = canonical_name(&descriptor.name);
            slots.push(Some(descriptor));
        }
        Self { slots }
    }

    /// Infer a shape from the own properties of a script object.
    ///
    /// Names starting with `_` are private and skipped, as are values that
    /// are not booleans, numbers or strings.
    #[must_use]
    pub fn infer(object: &ForeignObject) -> Self {
        let descriptors = object
            .property_names()
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .filter_map(|name| {
                let value = object.get(&name);
                match value.inferred_kind() {
                    Some(kind) => Some(PropertyDescriptor::new(name, kind, PropertyFlags::READWRITE)),
                    None => {
                        warn!(
                            property = %name,
                            value_type = value.type_name(),
                            "skipping script property of unsupported type"
                        );
                        None
                    }
                }
            });
        Self::new(descriptors)
    }

    /// Slot count including the reserved slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.len() <= 1
    }

    #[must_use]
    pub fn descriptor(&self, slot: usize) -> Option<&PropertyDescriptor> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        let name = canonical_name(name);
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|desc| desc.name == name))
    }

    /// Addressable slots with their descriptors.
    pub fn descriptors(&self) -> impl Iterator<Item = (usize, &PropertyDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, desc)| desc.as_ref().map(|desc| (slot, desc)))
    }
}

/// A synthesized proxy type.
#[derive(Debug)]
pub struct ProxyType {
    name: SmolStr,
    shape: ProxyShape,
    class: Rc<ObjectClass>,
}

impl ProxyType {
    fn new(name: SmolStr, shape: ProxyShape) -> Self {
        let class = shape
            .descriptors()
            .fold(ObjectClass::builder(name.clone()), |builder, (_, desc)| {
                builder.property(desc.clone())
            })
            .build();
        Self {
            name,
            shape,
            class: Rc::new(class),
        }
    }

    #[must_use]
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    #[must_use]
    pub fn shape(&self) -> &ProxyShape {
        &self.shape
    }

    #[must_use]
    pub fn class(&self) -> Rc<ObjectClass> {
        Rc::clone(&self.class)
    }
}

/// Proxy types by shape key.
#[derive(Debug, Default)]
pub struct ProxyTypeRegistry {
    types: RefCell<IndexMap<SmolStr, Rc<ProxyType>>>,
}

impl ProxyTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the type registered under `shape_key`, defining it from
    /// `shape` on first use. Later shapes for an existing key are ignored.
    pub fn define_type(&self, shape_key: &str, shape: ProxyShape) -> Rc<ProxyType> {
        if let Some(existing) = self.types.borrow().get(shape_key) {
            if existing.shape != shape {
                debug!(shape_key, "reusing proxy type with a different discovered shape");
            }
            return Rc::clone(existing);
        }
        debug!(shape_key, slots = shape.len(), "defining proxy type");
        let proxy_type = Rc::new(ProxyType::new(SmolStr::new(shape_key), shape));
        self.types
            .borrow_mut()
            .insert(SmolStr::new(shape_key), Rc::clone(&proxy_type));
        proxy_type
    }

    #[must_use]
    pub fn lookup(&self, shape_key: &str) -> Option<Rc<ProxyType>> {
        self.types.borrow().get(shape_key).cloned()
    }

    #[must_use]
    pub fn type_names(&self) -> Vec<SmolStr> {
        self.types.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn shape() -> ProxyShape {
        ProxyShape::new([
            PropertyDescriptor::new("a_boolean", ValueKind::Bool, PropertyFlags::READWRITE),
            PropertyDescriptor::new("a_string", ValueKind::String, PropertyFlags::READWRITE),
        ])
    }

    #[test]
    fn slot_zero_is_reserved() {
        let shape = shape();
        assert_eq!(shape.len(), 3);
        assert!(shape.descriptor(0).is_none());
        assert_eq!(shape.descriptor(1).unwrap().name, "a-boolean");
        assert_eq!(shape.slot_of("a_string"), Some(2));
        assert!(shape.descriptor(3).is_none());
    }

    #[test]
    fn proxy_class_lists_slots_and_notify() {
        let registry = ProxyTypeRegistry::new();
        let proxy_type = registry.define_type("ScriptProxyThing", shape());
        let class = proxy_type.class();
        assert_eq!(class.type_name, "ScriptProxyThing");
        assert_eq!(class.properties().count(), 2);
        assert!(class.signal("notify").is_some());
    }
}
