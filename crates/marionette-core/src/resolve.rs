//! Dotted path resolution over the live object tree.
//!
//! The first segment names an object, found by a pre-order search of the
//! visible top-level containers; the first match wins, so objects sharing a
//! name shadow each other in traversal order. Each further segment follows
//! a readable object-valued property, except that the script context marker
//! switches to the script proxy for exactly one following variable name.

#![allow(missing_docs)]

use std::rc::Rc;

use smol_str::SmolStr;
use tracing::debug;

use crate::error::ControlError;
use crate::object::{ObjectRef, SignalInfo};
use crate::proxy::ProxyFactory;
use crate::value::{ObjectLookup, PropertyDescriptor, PropertyValue, TypeName, ValueKind};

/// Path segment that enters a host's script context.
pub const DEFAULT_CONTEXT_MARKER: &str = "JSContext";

/// The application's top-level containers.
pub trait Toplevels {
    fn toplevels(&self) -> Vec<ObjectRef>;
}

/// Result of resolving a command target.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub object: ObjectRef,
    pub property: Option<PropertyDescriptor>,
    pub signal: Option<SignalInfo>,
}

#[derive(Clone)]
pub struct ObjectResolver {
    toplevels: Rc<dyn Toplevels>,
    factory: ProxyFactory,
    marker: SmolStr,
}

impl std::fmt::Debug for ObjectResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectResolver")
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

impl ObjectResolver {
    pub fn new(toplevels: Rc<dyn Toplevels>, factory: ProxyFactory) -> Self {
        Self {
            toplevels,
            factory,
            marker: SmolStr::new(DEFAULT_CONTEXT_MARKER),
        }
    }

    #[must_use]
    pub fn with_context_marker(mut self, marker: impl Into<SmolStr>) -> Self {
        self.marker = marker.into();
        self
    }

    #[must_use]
    pub fn factory(&self) -> &ProxyFactory {
        &self.factory
    }

    #[must_use]
    pub fn context_marker(&self) -> &str {
        &self.marker
    }

    /// First visible object named `name`, in pre-order.
    #[must_use]
    pub fn find_object(&self, name: &str) -> Option<ObjectRef> {
        self.toplevels
            .toplevels()
            .into_iter()
            .find_map(|toplevel| find_visible(&toplevel, name))
    }

    pub fn resolve(&self, path: &str) -> Result<ObjectRef, ControlError> {
        let segments: Vec<&str> = path.split('.').collect();
        let first = segments[0];
        let mut object = self
            .find_object(first)
            .ok_or_else(|| ControlError::NotFound(SmolStr::new(first)))?;

        let mut index = 1;
        while index < segments.len() {
            let segment = segments[index];
            if segment == self.marker {
                if let Some(view) = object.script_view() {
                    let variable = match segments.get(index + 1) {
                        Some(variable) if !variable.is_empty() => *variable,
                        _ => return Err(ControlError::NeedsContextName(SmolStr::new(path))),
                    };
                    if index + 2 < segments.len() {
                        return Err(ControlError::TooDeepIndirection(SmolStr::new(path)));
                    }
                    let proxy = self.factory.proxy_for(&view, variable, path)?;
                    return Ok(ObjectRef::from(proxy));
                }
            }
            object = follow_property(&object, segment, &segments[..=index])?;
            index += 1;
        }
        debug!(path, "resolved object");
        Ok(object)
    }

    /// Resolve `path` and check that the named property and signal exist.
    pub fn resolve_for_command(
        &self,
        path: &str,
        property: Option<&str>,
        signal: Option<&str>,
    ) -> Result<Resolved, ControlError> {
        let object = self.resolve(path)?;
        let class = object.class();
        let property = property
            .map(|name| {
                class
                    .property(name)
                    .cloned()
                    .ok_or_else(|| ControlError::NoProperty {
                        object: SmolStr::new(path),
                        property: SmolStr::new(name),
                    })
            })
            .transpose()?;
        let signal = signal
            .map(|name| {
                class
                    .signal(name)
                    .cloned()
                    .ok_or_else(|| ControlError::NoSignal {
                        object: SmolStr::new(path),
                        signal: SmolStr::new(name),
                    })
            })
            .transpose()?;
        Ok(Resolved {
            object,
            property,
            signal,
        })
    }

    fn type_in_tree(&self, name: &str) -> bool {
        fn walk(object: &ObjectRef, name: &str) -> bool {
            object.class().type_name == name
                || object.children().iter().any(|child| walk(child, name))
        }
        self.toplevels
            .toplevels()
            .iter()
            .any(|toplevel| walk(toplevel, name))
    }
}

impl ObjectLookup for ObjectResolver {
    fn lookup_object(&self, name: &str) -> Option<ObjectRef> {
        self.resolve(name).ok()
    }

    fn lookup_type(&self, name: &str) -> Option<TypeName> {
        let known = self.factory.registry().lookup(name).is_some() || self.type_in_tree(name);
        known.then(|| TypeName::new(name))
    }
}

fn find_visible(object: &ObjectRef, name: &str) -> Option<ObjectRef> {
    if !object.is_visible() {
        return None;
    }
    if object.name().as_deref() == Some(name) {
        return Some(object.clone());
    }
    object
        .children()
        .iter()
        .find_map(|child| find_visible(child, name))
}

fn follow_property(
    object: &ObjectRef,
    segment: &str,
    prefix: &[&str],
) -> Result<ObjectRef, ControlError> {
    let class = object.class();
    let Some(descriptor) = class.property(segment) else {
        return Err(ControlError::NoProperty {
            object: object.display_name(),
            property: SmolStr::new(segment),
        });
    };
    if !descriptor.flags.readable {
        return Err(ControlError::NotReadable {
            object: object.display_name(),
            property: descriptor.name.clone(),
        });
    }
    if descriptor.kind != ValueKind::Object {
        return Err(ControlError::NotObjectType {
            object: object.display_name(),
            property: descriptor.name.clone(),
        });
    }
    match object.get_property(segment) {
        Some(PropertyValue::Object(Some(next))) => Ok(next),
        _ => Err(ControlError::NotFound(SmolStr::new(prefix.join(".")))),
    }
}
