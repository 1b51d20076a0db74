#![allow(dead_code)]

use std::rc::Rc;

use marionette_core::headless::{Display, HeadlessScriptEngine, Widget};
use marionette_core::object::SignalInfo;
use marionette_core::proxy::{ProxyFactory, ProxyTypeRegistry};
use marionette_core::script::{ScriptBridge, ScriptEngine, ScriptView};
use marionette_core::value::{
    ForeignValue, PropertyDescriptor, PropertyFlags, PropertyValue, ValueKind,
};
use marionette_core::{MainLoop, ObjectRef, ObjectResolver};

pub struct Scene {
    pub main_loop: MainLoop,
    pub display: Rc<Display>,
    pub engine: Rc<HeadlessScriptEngine>,
    pub view: ScriptView,
    pub registry: Rc<ProxyTypeRegistry>,
    pub resolver: ObjectResolver,
    pub window: Rc<Widget>,
    pub content: Rc<Widget>,
    pub title: Rc<Widget>,
    pub webview: Rc<Widget>,
}

impl Scene {
    pub fn window_ref(&self) -> ObjectRef {
        ObjectRef::from(Rc::clone(&self.window))
    }
}

/// `main_window` > `content_box` > (`title_label`, `webview`), plus a
/// second `title_label` in a later top-level.
pub fn scene() -> Scene {
    scene_with_loop(MainLoop::new())
}

pub fn scene_with_loop(main_loop: MainLoop) -> Scene {
    let engine = HeadlessScriptEngine::new(main_loop.clone());
    engine.define_object(
        "testobject",
        [
            ("a_boolean", ForeignValue::Bool(true)),
            ("a_string", ForeignValue::String("A string".into())),
            ("a_double", ForeignValue::Number(1.2345)),
        ],
    );
    engine.define_value("answer", ForeignValue::Number(42.0));
    let view = ScriptView::new(Rc::clone(&engine) as Rc<dyn ScriptEngine>);

    let title = Widget::builder("GtkLabel")
        .name("title_label")
        .property(PropertyDescriptor::new(
            "label",
            ValueKind::String,
            PropertyFlags::READWRITE,
        ))
        .value("label", PropertyValue::from("Hello"))
        .build();
    let webview = Widget::builder("WebKitWebView")
        .name("webview")
        .script_view(view.clone())
        .build();
    let content = Widget::builder("GtkBox")
        .name("content_box")
        .child(Rc::clone(&title))
        .child(Rc::clone(&webview))
        .build();
    let window = Widget::builder("GtkWindow")
        .name("main_window")
        .property(PropertyDescriptor::new(
            "child",
            ValueKind::Object,
            PropertyFlags::READABLE,
        ))
        .property(PropertyDescriptor::new(
            "focus-widget",
            ValueKind::Object,
            PropertyFlags::READWRITE,
        ))
        .property(PropertyDescriptor::new(
            "secret",
            ValueKind::Object,
            PropertyFlags::WRITABLE,
        ))
        .property(PropertyDescriptor::new(
            "title",
            ValueKind::String,
            PropertyFlags::READWRITE,
        ))
        .signal(SignalInfo::new("activate-default").action())
        .signal(SignalInfo::new("close-request").returns(ValueKind::Bool))
        .value("child", PropertyValue::from(ObjectRef::from(Rc::clone(&content))))
        .child(Rc::clone(&content))
        .build();
    let other_title = Widget::builder("GtkLabel").name("title_label").build();
    let dialog = Widget::builder("GtkDialog")
        .name("about_dialog")
        .child(other_title)
        .build();

    let display = Rc::new(Display::new());
    display.add_toplevel(Rc::clone(&window));
    display.add_toplevel(dialog);

    let registry = Rc::new(ProxyTypeRegistry::new());
    let bridge = ScriptBridge::new(main_loop.clone());
    let factory = ProxyFactory::new(bridge, Rc::clone(&registry));
    let resolver = ObjectResolver::new(Rc::clone(&display) as _, factory);

    Scene {
        main_loop,
        display,
        engine,
        view,
        registry,
        resolver,
        window,
        content,
        title,
        webview,
    }
}
