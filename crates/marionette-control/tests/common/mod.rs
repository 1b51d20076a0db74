#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use marionette_control::{ControlEvent, ControlSettings, Controller};
use marionette_core::headless::{Display, HeadlessScriptEngine, HeadlessSurface, Widget};
use marionette_core::mainloop::ManualClock;
use marionette_core::object::SignalInfo;
use marionette_core::proxy::{ProxyFactory, ProxyTypeRegistry};
use marionette_core::script::{ScriptBridge, ScriptEngine, ScriptView};
use marionette_core::value::{
    ForeignValue, PropertyDescriptor, PropertyFlags, PropertyValue, ValueKind,
};
use marionette_core::{MainLoop, ObjectRef, ObjectResolver};
use serde_json::{json, Value};

pub struct Harness {
    pub main_loop: MainLoop,
    pub clock: ManualClock,
    pub display: Rc<Display>,
    pub surface: Rc<HeadlessSurface>,
    pub engine: Rc<HeadlessScriptEngine>,
    pub controller: Controller,
    pub window: Rc<Widget>,
    pub button: Rc<Widget>,
    pub status: Rc<Widget>,
    pub adjustment: Rc<Widget>,
    pub webview: Rc<Widget>,
    events: Rc<RefCell<Vec<ControlEvent>>>,
    next_id: RefCell<u64>,
}

impl Harness {
    pub fn object(widget: &Rc<Widget>) -> ObjectRef {
        ObjectRef::from(Rc::clone(widget))
    }

    /// Send one request through the JSON line entry point.
    pub fn request(&self, kind: &str, params: Value) -> Value {
        let id = {
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            *next
        };
        let line = json!({ "id": id, "type": kind, "params": params }).to_string();
        let response = self.controller.handle_request_line(&line).unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["id"], id);
        response
    }

    /// Result of a request expected to succeed.
    pub fn ok(&self, kind: &str, params: Value) -> Value {
        let response = self.request(kind, params);
        assert_eq!(response["ok"], true, "{kind} failed: {response}");
        response["result"].clone()
    }

    /// Error kind of a request expected to fail.
    pub fn error_kind(&self, kind: &str, params: Value) -> String {
        let response = self.request(kind, params);
        assert_eq!(response["ok"], false, "{kind} succeeded: {response}");
        response["kind"].as_str().unwrap().to_owned()
    }

    /// Advance the clock and run whatever became due.
    pub fn advance(&self, millis: u64) {
        self.clock.advance(Duration::from_millis(millis));
        self.main_loop.run_until_idle();
    }

    pub fn take_events(&self) -> Vec<Value> {
        self.events
            .borrow_mut()
            .drain(..)
            .map(|event| serde_json::to_value(&event).unwrap())
            .collect()
    }
}

/// `main_window` > `content_box` > (`ok_button`, `status_label`, `volume`,
/// `webview`), with `testobject` defined in the webview's page.
pub fn harness() -> Harness {
    harness_with(ControlSettings::default())
}

pub fn harness_with(settings: ControlSettings) -> Harness {
    let clock = ManualClock::new();
    let main_loop = MainLoop::with_clock(clock.clone());

    let engine = HeadlessScriptEngine::new(main_loop.clone());
    engine.define_object(
        "testobject",
        [
            ("a_boolean", ForeignValue::Bool(true)),
            ("a_string", ForeignValue::String("A string".into())),
            ("a_double", ForeignValue::Number(1.2345)),
        ],
    );
    let view = ScriptView::new(Rc::clone(&engine) as Rc<dyn ScriptEngine>);

    let button = Widget::builder("GtkButton")
        .name("ok_button")
        .property(PropertyDescriptor::new(
            "label",
            ValueKind::String,
            PropertyFlags::READWRITE,
        ))
        .value("label", PropertyValue::from("OK"))
        .signal(SignalInfo::new("clicked").action())
        .signal(SignalInfo::new("pressed").params([ValueKind::Int, ValueKind::String]))
        .build();
    let status = Widget::builder("GtkLabel")
        .name("status_label")
        .property(PropertyDescriptor::new(
            "label",
            ValueKind::String,
            PropertyFlags::READWRITE,
        ))
        .build();
    let adjustment = Widget::object_builder("GtkAdjustment")
        .id("volume")
        .property(PropertyDescriptor::new(
            "value",
            ValueKind::Double,
            PropertyFlags::READWRITE,
        ))
        .signal_with_handler(
            SignalInfo::new("scale")
                .action()
                .params([ValueKind::Int, ValueKind::Int])
                .returns(ValueKind::Int),
            |args: &[PropertyValue]| match args {
                [PropertyValue::Int(a), PropertyValue::Int(b)] => Some(PropertyValue::Int(a * b)),
                _ => None,
            },
        )
        .build();
    let webview = Widget::builder("WebKitWebView")
        .name("webview")
        .script_view(view)
        .build();
    let content = Widget::builder("GtkBox")
        .name("content_box")
        .child(Rc::clone(&button))
        .child(Rc::clone(&status))
        .child(Rc::clone(&adjustment))
        .child(Rc::clone(&webview))
        .build();
    let window = Widget::builder("GtkWindow")
        .name("main_window")
        .property(PropertyDescriptor::new(
            "title",
            ValueKind::String,
            PropertyFlags::READWRITE,
        ))
        .property(PropertyDescriptor::new(
            "default-width",
            ValueKind::Int,
            PropertyFlags::READWRITE,
        ))
        .property(PropertyDescriptor::new(
            "is-active",
            ValueKind::Bool,
            PropertyFlags::READABLE,
        ))
        .property(PropertyDescriptor::new(
            "application-id",
            ValueKind::String,
            PropertyFlags::READWRITE.construct_only(),
        ))
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
        .value("title", PropertyValue::from("Marionette"))
        .value("default-width", PropertyValue::Int(640))
        .value("child", PropertyValue::from(ObjectRef::from(Rc::clone(&content))))
        .signal(SignalInfo::new("activate-default").action())
        .signal(SignalInfo::new("close-request").returns(ValueKind::Bool))
        .child(Rc::clone(&content))
        .build();

    let display = Rc::new(Display::new());
    display.add_toplevel(Rc::clone(&window));

    let bridge = ScriptBridge::new(main_loop.clone());
    let factory = ProxyFactory::new(bridge, Rc::new(ProxyTypeRegistry::new()));
    let resolver = ObjectResolver::new(Rc::clone(&display) as _, factory);
    let surface = Rc::new(HeadlessSurface::new());
    let controller = Controller::new(
        resolver,
        Rc::clone(&surface) as _,
        main_loop.clone(),
        settings,
    );

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    controller.subscribe(move |event: &ControlEvent| {
        sink.borrow_mut().push(event.clone());
        true
    });

    Harness {
        main_loop,
        clock,
        display,
        surface,
        engine,
        controller,
        window,
        button,
        status,
        adjustment,
        webview,
        events,
        next_id: RefCell::new(0),
    }
}
