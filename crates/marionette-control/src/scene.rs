//! Headless scenes described in TOML.
//!
//! ```toml
//! [[toplevel]]
//! type = "GtkWindow"
//! name = "main_window"
//! properties = { title = "Demo" }
//! references = { child = "content_box" }
//! signals = [{ name = "activate-default", action = true }]
//!
//! [[toplevel.children]]
//! type = "GtkBox"
//! name = "content_box"
//!
//! [[toplevel.children.children]]
//! type = "WebKitWebView"
//! name = "webview"
//! script = { answer = 42, state = { label = "ready" } }
//! ```
//!
//! Property kinds follow the TOML value types. Children are built before
//! their parent, so `references` may point at descendants and at nodes of
//! earlier top-levels.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use marionette_core::headless::{Display, HeadlessScriptEngine, Widget};
use marionette_core::object::SignalInfo;
use marionette_core::script::{ScriptEngine, ScriptView};
use marionette_core::value::{
    ForeignValue, PropertyDescriptor, PropertyFlags, PropertyValue, ValueKind,
};
use marionette_core::{ControlError, MainLoop, ObjectRef};
use serde::Deserialize;
use smol_str::SmolStr;
use tracing::debug;

/// Widgets and script engines built from a scene file.
pub struct Scene {
    pub display: Rc<Display>,
    pub toplevels: Vec<Rc<Widget>>,
    /// Script engines by the name of the widget hosting them.
    pub engines: IndexMap<SmolStr, Rc<HeadlessScriptEngine>>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("toplevels", &self.toplevels.len())
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Scene {
    pub fn load(path: impl AsRef<Path>, main_loop: &MainLoop) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ControlError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        Self::parse(&text, main_loop)
    }

    pub fn parse(text: &str, main_loop: &MainLoop) -> Result<Self, ControlError> {
        let raw: SceneToml = toml::from_str(text)
            .map_err(|err| ControlError::InvalidConfig(format!("scene: {err}").into()))?;
        if raw.toplevel.is_empty() {
            return Err(ControlError::InvalidConfig(
                "scene has no [[toplevel]] entries".into(),
            ));
        }
        let mut builder = SceneBuilder {
            main_loop,
            named: IndexMap::new(),
            engines: IndexMap::new(),
        };
        let display = Rc::new(Display::new());
        let mut toplevels = Vec::with_capacity(raw.toplevel.len());
        for node in &raw.toplevel {
            let widget = builder.build(node)?;
            display.add_toplevel(Rc::clone(&widget));
            toplevels.push(widget);
        }
        debug!(
            toplevels = toplevels.len(),
            named = builder.named.len(),
            "scene built"
        );
        Ok(Self {
            display,
            toplevels,
            engines: builder.engines,
        })
    }

    #[must_use]
    pub fn engine(&self, host: &str) -> Option<&Rc<HeadlessScriptEngine>> {
        self.engines.get(host)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SceneToml {
    #[serde(default)]
    toplevel: Vec<NodeToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeToml {
    r#type: String,
    name: Option<String>,
    id: Option<String>,
    #[serde(default = "default_true")]
    widget: bool,
    visible: Option<bool>,
    #[serde(default)]
    properties: toml::Table,
    #[serde(default)]
    references: BTreeMap<String, String>,
    #[serde(default)]
    signals: Vec<SignalToml>,
    #[serde(default)]
    children: Vec<NodeToml>,
    script: Option<toml::Table>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignalToml {
    name: String,
    #[serde(default)]
    action: bool,
    #[serde(default)]
    detailed: bool,
    #[serde(default)]
    params: Vec<String>,
    returns: Option<String>,
}

fn default_true() -> bool {
    true
}

struct SceneBuilder<'a> {
    main_loop: &'a MainLoop,
    named: IndexMap<SmolStr, ObjectRef>,
    engines: IndexMap<SmolStr, Rc<HeadlessScriptEngine>>,
}

impl SceneBuilder<'_> {
    fn build(&mut self, node: &NodeToml) -> Result<Rc<Widget>, ControlError> {
        let children = node
            .children
            .iter()
            .map(|child| self.build(child))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = if node.widget {
            Widget::builder(node.r#type.as_str())
        } else {
            Widget::object_builder(node.r#type.as_str())
        };
        if let Some(name) = &node.name {
            if node.widget {
                builder = builder.name(name);
            }
        }
        if let Some(id) = &node.id {
            builder = builder.id(id);
        }
        if let Some(visible) = node.visible {
            builder = builder.visible(visible);
        }
        for (name, value) in &node.properties {
            let (kind, value) = property_value(name, value)?;
            builder = builder
                .property(PropertyDescriptor::new(
                    name.as_str(),
                    kind,
                    PropertyFlags::READWRITE,
                ))
                .value(name, value);
        }
        for (name, target) in &node.references {
            let Some(object) = self.named.get(target.as_str()).cloned() else {
                return Err(ControlError::InvalidConfig(
                    format!("reference '{name}' points at unknown node '{target}'").into(),
                ));
            };
            builder = builder
                .property(PropertyDescriptor::new(
                    name.as_str(),
                    ValueKind::Object,
                    PropertyFlags::READWRITE,
                ))
                .value(name, PropertyValue::from(object));
        }
        for signal in &node.signals {
            builder = builder.signal(signal_info(signal)?);
        }
        for child in children {
            builder = builder.child(child);
        }
        let host = node
            .name
            .as_deref()
            .or(node.id.as_deref())
            .unwrap_or(node.r#type.as_str());
        if let Some(globals) = &node.script {
            let engine = HeadlessScriptEngine::new(self.main_loop.clone());
            define_globals(&engine, globals)?;
            builder = builder.script_view(ScriptView::new(
                Rc::clone(&engine) as Rc<dyn ScriptEngine>
            ));
            self.engines.insert(SmolStr::new(host), engine);
        }

        let widget = builder.build();
        if node.name.is_some() || node.id.is_some() {
            self.named
                .insert(SmolStr::new(host), ObjectRef::from(Rc::clone(&widget)));
        }
        Ok(widget)
    }
}

fn property_value(name: &str, value: &toml::Value) -> Result<(ValueKind, PropertyValue), ControlError> {
    let typed = match value {
        toml::Value::Boolean(v) => (ValueKind::Bool, PropertyValue::Bool(*v)),
        toml::Value::Integer(v) => (ValueKind::Int64, PropertyValue::Int64(*v)),
        toml::Value::Float(v) => (ValueKind::Double, PropertyValue::Double(*v)),
        toml::Value::String(v) => (ValueKind::String, PropertyValue::from(v.as_str())),
        toml::Value::Array(items) => {
            let strings = items
                .iter()
                .map(|item| item.as_str().map(SmolStr::new))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    ControlError::InvalidConfig(
                        format!("property '{name}' must be an array of strings").into(),
                    )
                })?;
            (ValueKind::StringList, PropertyValue::StringList(strings))
        }
        other => {
            return Err(ControlError::InvalidConfig(
                format!("property '{name}' has unsupported type {}", other.type_str()).into(),
            ))
        }
    };
    Ok(typed)
}

fn parse_kind(name: &str) -> Result<ValueKind, ControlError> {
    let kind = match name {
        "bool" => ValueKind::Bool,
        "int" => ValueKind::Int,
        "uint" => ValueKind::UInt,
        "int64" => ValueKind::Int64,
        "uint64" => ValueKind::UInt64,
        "double" => ValueKind::Double,
        "string" => ValueKind::String,
        "strv" => ValueKind::StringList,
        "object" => ValueKind::Object,
        other => {
            return Err(ControlError::InvalidConfig(
                format!("unknown value kind '{other}'").into(),
            ))
        }
    };
    Ok(kind)
}

fn signal_info(raw: &SignalToml) -> Result<SignalInfo, ControlError> {
    let mut signal = SignalInfo::new(raw.name.as_str()).params(
        raw.params
            .iter()
            .map(|name| parse_kind(name))
            .collect::<Result<Vec<_>, _>>()?,
    );
    if raw.action {
        signal = signal.action();
    }
    if raw.detailed {
        signal = signal.detailed();
    }
    if let Some(returns) = &raw.returns {
        signal = signal.returns(parse_kind(returns)?);
    }
    Ok(signal)
}

fn define_globals(engine: &HeadlessScriptEngine, globals: &toml::Table) -> Result<(), ControlError> {
    for (name, value) in globals {
        match value {
            toml::Value::Table(fields) => {
                let fields = fields
                    .iter()
                    .map(|(field, value)| Ok((field.as_str(), foreign_value(field, value)?)))
                    .collect::<Result<Vec<_>, ControlError>>()?;
                engine.define_object(name, fields);
            }
            other => engine.define_value(name, foreign_value(name, other)?),
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn foreign_value(name: &str, value: &toml::Value) -> Result<ForeignValue, ControlError> {
    match value {
        toml::Value::Boolean(v) => Ok(ForeignValue::Bool(*v)),
        toml::Value::Integer(v) => Ok(ForeignValue::Number(*v as f64)),
        toml::Value::Float(v) => Ok(ForeignValue::Number(*v)),
        toml::Value::String(v) => Ok(ForeignValue::String(SmolStr::new(v))),
        other => Err(ControlError::InvalidConfig(
            format!("script value '{name}' has unsupported type {}", other.type_str()).into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"
[[toplevel]]
type = "GtkWindow"
name = "main_window"
properties = { title = "Demo", opacity = 0.5, tags = ["a", "b"] }
references = { child = "content_box" }
signals = [
    { name = "activate-default", action = true },
    { name = "close-request", returns = "bool" },
]

[[toplevel.children]]
type = "GtkBox"
name = "content_box"

[[toplevel.children.children]]
type = "WebKitWebView"
name = "webview"
script = { answer = 42, state = { label = "ready", count = 2 } }

[[toplevel]]
type = "GtkAdjustment"
id = "volume"
widget = false
properties = { value = 3 }
"#;

    #[test]
    fn builds_tree_with_typed_properties() {
        let main_loop = MainLoop::new();
        let scene = Scene::parse(SCENE, &main_loop).unwrap();
        assert_eq!(scene.toplevels.len(), 2);

        let window = ObjectRef::from(Rc::clone(&scene.toplevels[0]));
        let class = window.class();
        assert_eq!(class.property("title").unwrap().kind, ValueKind::String);
        assert_eq!(class.property("opacity").unwrap().kind, ValueKind::Double);
        assert_eq!(class.property("tags").unwrap().kind, ValueKind::StringList);
        assert!(class.signal("activate-default").unwrap().action);
        assert_eq!(
            class.signal("close-request").unwrap().returns,
            Some(ValueKind::Bool)
        );
        let child = window.get_property("child").unwrap();
        assert_eq!(child.as_object().unwrap().display_name(), "content_box");

        let adjustment = ObjectRef::from(Rc::clone(&scene.toplevels[1]));
        assert!(!adjustment.is_widget());
        assert_eq!(adjustment.get_property("value"), Some(PropertyValue::Int64(3)));
    }

    #[test]
    fn script_tables_become_page_globals() {
        let main_loop = MainLoop::new();
        let scene = Scene::parse(SCENE, &main_loop).unwrap();
        let engine = scene.engine("webview").unwrap();
        assert_eq!(
            engine.page_property("state", "label"),
            ForeignValue::String("ready".into())
        );
        assert_eq!(engine.page_property("state", "count"), ForeignValue::Number(2.0));
    }

    #[test]
    fn rejects_bad_scenes() {
        let main_loop = MainLoop::new();
        for text in [
            "",
            "[[toplevel]]\ntype = \"GtkWindow\"\nreferences = { child = \"missing\" }",
            "[[toplevel]]\ntype = \"GtkWindow\"\nproperties = { when = 1979-05-27 }",
            "[[toplevel]]\ntype = \"GtkWindow\"\nsignals = [{ name = \"x\", params = [\"blob\"] }]",
            "[[toplevel]]\ntype = \"GtkWindow\"\ncolour = \"red\"",
        ] {
            let err = Scene::parse(text, &main_loop).unwrap_err();
            assert_eq!(err.kind(), "InvalidConfig", "{text}");
        }
    }
}
