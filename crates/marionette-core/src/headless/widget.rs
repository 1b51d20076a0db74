use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::ControlError;
use crate::object::{
    canonical_name, effective_name, Emission, HandlerId, HandlerRegistry, HostObject,
    ObjectClass, ObjectClassBuilder, ObjectRef, SignalHandler, SignalInfo, NOTIFY_SIGNAL,
};
use crate::script::ScriptView;
use crate::value::{PropertyDescriptor, PropertyFlags, PropertyValue, ValueKind};

/// Default handler of a signal, run before connected handlers.
pub type ClassHandler = Rc<dyn Fn(&[PropertyValue]) -> Option<PropertyValue>>;

/// In-memory toolkit object.
pub struct Widget {
    class: Rc<ObjectClass>,
    is_widget: bool,
    buildable_id: Option<SmolStr>,
    values: RefCell<IndexMap<SmolStr, PropertyValue>>,
    children: RefCell<Vec<ObjectRef>>,
    handlers: HandlerRegistry,
    class_handlers: IndexMap<SmolStr, ClassHandler>,
    emissions: RefCell<Vec<Emission>>,
    script_view: Option<ScriptView>,
}

impl Widget {
    /// Visual element with `name` and `visible` properties.
    pub fn builder(type_name: impl Into<SmolStr>) -> WidgetBuilder {
        WidgetBuilder::new(type_name.into(), true)
            .property(PropertyDescriptor::new(
                "name",
                ValueKind::String,
                PropertyFlags::READWRITE,
            ))
            .property(
                PropertyDescriptor::new("visible", ValueKind::Bool, PropertyFlags::READWRITE)
                    .with_default(PropertyValue::Bool(true)),
            )
    }

    /// Non-visual object, addressable by its builder id only.
    pub fn object_builder(type_name: impl Into<SmolStr>) -> WidgetBuilder {
        WidgetBuilder::new(type_name.into(), false)
    }

    pub fn set_visible(&self, visible: bool) {
        self.store("visible", PropertyValue::Bool(visible));
    }

    pub fn add_child(&self, child: ObjectRef) {
        self.children.borrow_mut().push(child);
    }

    pub fn remove_child(&self, child: &ObjectRef) -> bool {
        let mut children = self.children.borrow_mut();
        let before = children.len();
        children.retain(|existing| existing != child);
        children.len() != before
    }

    /// Every emission so far, including ones without handlers.
    #[must_use]
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.borrow().clone()
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn store(&self, name: &str, value: PropertyValue) {
        let Some(descriptor) = self.class.property(name) else {
            return;
        };
        let changed = {
            let mut values = self.values.borrow_mut();
            let current = values.get(&descriptor.name).unwrap_or(&descriptor.default);
            if descriptor.values_equal(current, &value) {
                false
            } else {
                values.insert(descriptor.name.clone(), value.clone());
                true
            }
        };
        if changed {
            self.handlers.emit(&Emission {
                signal: NOTIFY_SIGNAL.into(),
                detail: Some(descriptor.name.clone()),
                args: vec![value],
            });
        }
    }
}

impl HostObject for Widget {
    fn class(&self) -> Rc<ObjectClass> {
        Rc::clone(&self.class)
    }

    fn name(&self) -> Option<SmolStr> {
        let widget_name = if self.is_widget {
            self.get_property("name")
        } else {
            None
        };
        effective_name(
            widget_name.as_ref().and_then(PropertyValue::as_str),
            &self.class.type_name,
            self.buildable_id.as_deref(),
        )
    }

    fn is_widget(&self) -> bool {
        self.is_widget
    }

    fn is_visible(&self) -> bool {
        !self.is_widget
            || self
                .get_property("visible")
                .and_then(|value| value.as_bool())
                .unwrap_or(true)
    }

    fn children(&self) -> Vec<ObjectRef> {
        self.children.borrow().clone()
    }

    fn script_view(&self) -> Option<ScriptView> {
        self.script_view.clone()
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        let descriptor = self.class.property(name)?;
        Some(
            self.values
                .borrow()
                .get(&descriptor.name)
                .cloned()
                .unwrap_or_else(|| descriptor.default.clone()),
        )
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), ControlError> {
        let object = self.name().unwrap_or_else(|| self.class.type_name.clone());
        let Some(descriptor) = self.class.property(name) else {
            return Err(ControlError::NoProperty {
                object,
                property: SmolStr::new(name),
            });
        };
        if !descriptor.flags.is_settable() {
            return Err(ControlError::NotWritable {
                object,
                property: descriptor.name.clone(),
            });
        }
        if !value.fits(&descriptor.kind) {
            return Err(ControlError::InvalidValue(SmolStr::new(format!(
                "property '{}' expects {}",
                descriptor.name, descriptor.kind
            ))));
        }
        self.store(name, value);
        Ok(())
    }

    fn connect(&self, signal: &str, detail: Option<&str>, handler: SignalHandler) -> HandlerId {
        let detail = detail.map(canonical_name);
        self.handlers
            .connect(&canonical_name(signal), detail.as_deref(), handler)
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
        let emission = Emission {
            signal: canonical_name(signal),
            detail: detail.map(canonical_name),
            args: args.to_vec(),
        };
        self.emissions.borrow_mut().push(emission.clone());
        let result = self
            .class_handlers
            .get(&emission.signal)
            .and_then(|handler| handler(args));
        self.handlers.emit(&emission);
        result
    }
}

impl std::fmt::Debug for Widget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Widget")
            .field("type", &self.class.type_name)
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

pub struct WidgetBuilder {
    class: ObjectClassBuilder,
    is_widget: bool,
    buildable_id: Option<SmolStr>,
    values: IndexMap<SmolStr, PropertyValue>,
    children: Vec<ObjectRef>,
    class_handlers: IndexMap<SmolStr, ClassHandler>,
    script_view: Option<ScriptView>,
}

impl WidgetBuilder {
    fn new(type_name: SmolStr, is_widget: bool) -> Self {
        Self {
            class: ObjectClass::builder(type_name),
            is_widget,
            buildable_id: None,
            values: IndexMap::new(),
            children: Vec::new(),
            class_handlers: IndexMap::new(),
            script_view: None,
        }
    }

    #[must_use]
    pub fn name(self, name: &str) -> Self {
        self.value("name", PropertyValue::from(name))
    }

    /// Builder id, used as the name when no widget name is set.
    #[must_use]
    pub fn id(mut self, id: &str) -> Self {
        self.buildable_id = Some(SmolStr::new(id));
        self
    }

    #[must_use]
    pub fn visible(self, visible: bool) -> Self {
        self.value("visible", PropertyValue::Bool(visible))
    }

    #[must_use]
    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.class = self.class.property(descriptor);
        self
    }

    /// Initial value of a declared property.
    #[must_use]
    pub fn value(mut self, name: &str, value: PropertyValue) -> Self {
        self.values.insert(canonical_name(name), value);
        self
    }

    #[must_use]
    pub fn signal(mut self, signal: SignalInfo) -> Self {
        self.class = self.class.signal(signal);
        self
    }

    #[must_use]
    pub fn signal_with_handler(
        mut self,
        signal: SignalInfo,
        handler: impl Fn(&[PropertyValue]) -> Option<PropertyValue> + 'static,
    ) -> Self {
        self.class_handlers
            .insert(canonical_name(&signal.name), Rc::new(handler));
        self.signal(signal)
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<ObjectRef>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn script_view(mut self, view: ScriptView) -> Self {
        self.script_view = Some(view);
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<Widget> {
        let class = self.class.build();
        let values = self
            .values
            .into_iter()
            .filter(|(name, value)| {
                class
                    .property(name)
                    .is_some_and(|descriptor| value.fits(&descriptor.kind))
            })
            .collect();
        Rc::new(Widget {
            class: Rc::new(class),
            is_widget: self.is_widget,
            buildable_id: self.buildable_id,
            values: RefCell::new(values),
            children: RefCell::new(self.children),
            handlers: HandlerRegistry::default(),
            class_handlers: self.class_handlers,
            emissions: RefCell::new(Vec::new()),
            script_view: self.script_view,
        })
    }
}
