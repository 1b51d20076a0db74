mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::Harness;
use marionette_control::config::DEFAULT_CSS;
use marionette_control::{ControlEvent, ControlSettings, Controller};
use marionette_core::value::{ForeignValue, PropertyValue};
use marionette_core::HostObject;
use serde_json::json;

#[test]
fn get_returns_boxed_current_visibility() {
    let h = common::harness();
    assert_eq!(
        h.ok("Get", json!({ "object": "main_window", "property": "visible" })),
        json!({ "type": "boxed", "value": { "type": "bool", "value": true } })
    );

    h.button.set_visible(false);
    assert_eq!(
        h.error_kind("Get", json!({ "object": "ok_button", "property": "visible" })),
        "NotFound"
    );
}

#[test]
fn emit_on_signal_without_action_flag_emits_nothing() {
    let h = common::harness();
    assert_eq!(
        h.error_kind(
            "Emit",
            json!({ "object": "main_window", "signal": "close-request" })
        ),
        "NotAnActionSignal"
    );
    assert!(h.window.emissions().is_empty());
}

#[test]
fn emit_returns_boxed_class_handler_value() {
    let h = common::harness();
    let result = h.ok(
        "Emit",
        json!({
            "object": "volume",
            "signal": "scale",
            "params": [
                { "type": "int64", "value": 6 },
                { "type": "int64", "value": 7 },
            ],
        }),
    );
    assert_eq!(
        result,
        json!({ "type": "boxed", "value": { "type": "int64", "value": 42 } })
    );
    let emissions = h.adjustment.emissions();
    assert_eq!(emissions.len(), 1);
    assert_eq!(
        emissions[0].args,
        vec![PropertyValue::Int(6), PropertyValue::Int(7)]
    );
}

#[test]
fn emit_without_return_value_yields_null() {
    let h = common::harness();
    let result = h.ok("Emit", json!({ "object": "ok_button", "signal": "clicked" }));
    assert_eq!(result, json!(null));
    assert_eq!(h.button.emissions().len(), 1);
}

#[test]
fn emit_checks_signal_and_parameters() {
    let h = common::harness();
    assert_eq!(
        h.error_kind("Emit", json!({ "object": "ok_button", "signal": "explode" })),
        "NoSignal"
    );
    assert_eq!(
        h.error_kind(
            "Emit",
            json!({ "object": "volume", "signal": "scale", "params": [{ "type": "int64", "value": 1 }] })
        ),
        "InvalidValue"
    );
    assert_eq!(
        h.error_kind(
            "Emit",
            json!({
                "object": "volume",
                "signal": "scale",
                "params": [
                    { "type": "string", "value": "six" },
                    { "type": "int64", "value": 7 },
                ],
            })
        ),
        "InvalidValue"
    );
    assert!(h.adjustment.emissions().is_empty());
}

#[test]
fn highlight_expires_after_timeout() {
    let h = common::harness();
    let button = Harness::object(&h.button);
    h.ok("Highlight", json!({ "object": "ok_button", "timeout_ms": 1000 }));
    assert!(h.surface.has_style_class(&button, "highlight"));

    h.advance(999);
    assert!(h.surface.has_style_class(&button, "highlight"));
    h.advance(1);
    assert!(!h.surface.has_style_class(&button, "highlight"));
}

#[test]
fn rehighlight_restarts_expiry() {
    let h = common::harness();
    let button = Harness::object(&h.button);
    h.ok("Highlight", json!({ "object": "ok_button", "timeout_ms": 1000 }));
    h.advance(600);
    h.ok("Highlight", json!({ "object": "ok_button", "timeout_ms": 1000 }));
    h.advance(600);
    assert!(h.surface.has_style_class(&button, "highlight"));
    h.advance(400);
    assert!(!h.surface.has_style_class(&button, "highlight"));
}

#[test]
fn zero_timeout_highlight_stays_until_unhighlight() {
    let h = common::harness();
    let button = Harness::object(&h.button);
    h.ok("Highlight", json!({ "object": "ok_button", "timeout_ms": 0 }));
    h.advance(3_600_000);
    assert!(h.surface.has_style_class(&button, "highlight"));

    h.ok("Unhighlight", json!({ "object": "ok_button" }));
    assert!(!h.surface.has_style_class(&button, "highlight"));
}

#[test]
fn highlight_uses_configured_style_class() {
    let h = common::harness_with(ControlSettings {
        style_class: "flash".into(),
        ..ControlSettings::default()
    });
    let label = Harness::object(&h.status);
    h.ok("Highlight", json!({ "object": "status_label" }));
    assert!(h.surface.has_style_class(&label, "flash"));
    assert!(!h.surface.has_style_class(&label, "highlight"));
}

#[test]
fn highlight_needs_a_live_widget() {
    let h = common::harness();
    assert_eq!(
        h.error_kind("Highlight", json!({ "object": "volume" })),
        "NotAWidget"
    );
    assert_eq!(
        h.error_kind("Highlight", json!({ "object": "ghost" })),
        "NotFound"
    );
    assert_eq!(
        h.error_kind("Unhighlight", json!({ "object": "ghost" })),
        "NotFound"
    );
}

#[test]
fn message_expires_and_announces_done() {
    let h = common::harness();
    h.ok(
        "Message",
        json!({
            "id": "hint",
            "text": "Press here",
            "icon_name": "dialog-information",
            "relative_to": "ok_button",
            "timeout_ms": 500,
        }),
    );
    let popover = h.surface.popover("hint").unwrap();
    assert_eq!(popover.text, "Press here");
    assert_eq!(popover.icon_name, "dialog-information");
    assert_eq!(popover.relative_to, Harness::object(&h.button));
    assert!(h.take_events().is_empty());

    h.advance(500);
    assert!(h.surface.popover("hint").is_none());
    assert_eq!(
        h.take_events(),
        vec![json!({ "event": "MessageDone", "params": { "id": "hint" } })]
    );
    assert!(h.controller.message_ids().is_empty());
}

#[test]
fn reused_message_id_replaces_content_in_place() {
    let h = common::harness();
    h.ok(
        "Message",
        json!({ "id": "hint", "text": "one", "relative_to": "ok_button", "timeout_ms": 500 }),
    );
    h.advance(400);
    h.ok(
        "Message",
        json!({
            "id": "hint",
            "text": "two",
            "icon_name": "emblem-ok",
            "relative_to": "status_label",
            "timeout_ms": 500,
        }),
    );
    let popover = h.surface.popover("hint").unwrap();
    assert_eq!(popover.text, "two");
    assert_eq!(popover.icon_name, "emblem-ok");
    assert_eq!(popover.relative_to, Harness::object(&h.button));
    assert_eq!(h.controller.message_ids().len(), 1);

    // The first timer was replaced.
    h.advance(200);
    assert!(h.surface.popover("hint").is_some());
    h.advance(300);
    assert!(h.surface.popover("hint").is_none());
    assert_eq!(h.take_events().len(), 1);
}

#[test]
fn message_clear_closes_known_messages_only() {
    let h = common::harness();
    assert_eq!(
        h.error_kind("MessageClear", json!({ "id": "nope" })),
        "UnknownMessageId"
    );

    h.ok(
        "Message",
        json!({ "id": "hint", "text": "hi", "relative_to": "ok_button", "timeout_ms": 0 }),
    );
    h.ok("MessageClear", json!({ "id": "hint" }));
    assert!(h.surface.popover("hint").is_none());
    assert_eq!(
        h.take_events(),
        vec![json!({ "event": "MessageDone", "params": { "id": "hint" } })]
    );
    assert_eq!(
        h.error_kind("MessageClear", json!({ "id": "hint" })),
        "UnknownMessageId"
    );
}

#[test]
fn toolkit_closed_message_is_announced() {
    let h = common::harness();
    h.ok(
        "Message",
        json!({ "id": "hint", "relative_to": "status_label", "timeout_ms": 1000 }),
    );
    h.controller.message_closed("hint");
    assert_eq!(h.take_events().len(), 1);
    h.advance(1000);
    assert!(h.take_events().is_empty());
}

#[test]
fn message_needs_a_widget_to_point_at() {
    let h = common::harness();
    assert_eq!(
        h.error_kind("Message", json!({ "id": "a", "relative_to": "volume" })),
        "NotAWidget"
    );
    assert_eq!(
        h.error_kind("Message", json!({ "id": "a", "relative_to": "ghost" })),
        "NotFound"
    );
    assert!(h.surface.popover_ids().is_empty());
}

#[test]
fn set_then_get_round_trips() {
    let h = common::harness();
    h.ok(
        "Set",
        json!({
            "object": "main_window",
            "property": "title",
            "value": { "type": "boxed", "value": { "type": "string", "value": "Renamed" } },
        }),
    );
    assert_eq!(
        h.window.get_property("title"),
        Some(PropertyValue::from("Renamed"))
    );
    assert_eq!(
        h.ok("Get", json!({ "object": "main_window", "property": "title" })),
        json!({ "type": "boxed", "value": { "type": "string", "value": "Renamed" } })
    );

    h.ok(
        "Set",
        json!({
            "object": "main_window",
            "property": "default_width",
            "value": { "type": "uint64", "value": 800 },
        }),
    );
    assert_eq!(
        h.window.get_property("default-width"),
        Some(PropertyValue::Int(800))
    );
}

#[test]
fn set_object_reference_by_name() {
    let h = common::harness();
    h.ok(
        "Set",
        json!({
            "object": "main_window",
            "property": "focus-widget",
            "value": { "type": "string", "value": "ok_button" },
        }),
    );
    assert_eq!(
        h.window.get_property("focus-widget"),
        Some(PropertyValue::from(Harness::object(&h.button)))
    );
    assert_eq!(
        h.ok("Get", json!({ "object": "main_window", "property": "focus-widget" })),
        json!({ "type": "boxed", "value": { "type": "string", "value": "ok_button" } })
    );
    assert_eq!(
        h.ok("Get", json!({ "object": "main_window.focus_widget", "property": "label" })),
        json!({ "type": "boxed", "value": { "type": "string", "value": "OK" } })
    );
}

#[test]
fn set_reports_each_failure_kind() {
    let h = common::harness();
    let string = json!({ "type": "string", "value": "x" });
    for (object, property, kind) in [
        ("ghost", "title", "NotFound"),
        ("main_window", "subtitle", "NoProperty"),
        ("main_window", "is-active", "NotWritable"),
        ("main_window", "application-id", "NotWritable"),
        ("main_window", "default-width", "InvalidValue"),
    ] {
        assert_eq!(
            h.error_kind(
                "Set",
                json!({ "object": object, "property": property, "value": string })
            ),
            kind,
            "{object}.{property}"
        );
    }
    assert_eq!(
        h.error_kind("Get", json!({ "object": "main_window", "property": "subtitle" })),
        "NoProperty"
    );
}

#[test]
fn proxy_properties_are_reachable_through_set_and_get() {
    let h = common::harness();
    let path = "webview.JSContext.testobject";
    assert_eq!(
        h.ok("Get", json!({ "object": path, "property": "a_double" })),
        json!({ "type": "boxed", "value": { "type": "double", "value": 1.2345 } })
    );
    h.ok(
        "Set",
        json!({
            "object": path,
            "property": "a_string",
            "value": { "type": "string", "value": "Juan Pablo" },
        }),
    );
    h.main_loop.run_until_idle();
    assert_eq!(
        h.engine.executed_assignments(),
        vec!["testobject.a_string=\"Juan Pablo\";".to_owned()]
    );
    assert_eq!(
        h.error_kind("Get", json!({ "object": "webview.JSContext", "property": "a_string" })),
        "NeedsContextName"
    );
}

#[test]
fn connect_notify_needs_a_property_detail() {
    let h = common::harness();
    assert_eq!(
        h.error_kind("Connect", json!({ "object": "main_window", "signal": "notify" })),
        "MissingDetailForNotify"
    );
    assert_eq!(
        h.error_kind(
            "Connect",
            json!({ "object": "main_window", "signal": "notify", "detail": "" })
        ),
        "MissingDetailForNotify"
    );
    assert_eq!(
        h.error_kind(
            "Connect",
            json!({ "object": "main_window", "signal": "notify", "detail": "subtitle" })
        ),
        "NoProperty"
    );
    assert_eq!(
        h.error_kind("Connect", json!({ "object": "main_window", "signal": "resized" })),
        "NoSignal"
    );
    assert_eq!(h.window.handler_count(), 0);
}

#[test]
fn connected_notify_broadcasts_object_notify() {
    let h = common::harness();
    h.ok(
        "Connect",
        json!({ "object": "main_window", "signal": "notify", "detail": "title" }),
    );
    h.window
        .set_property("default-width", PropertyValue::Int(10))
        .unwrap();
    h.window
        .set_property("title", PropertyValue::from("Changed"))
        .unwrap();
    assert_eq!(
        h.take_events(),
        vec![json!({
            "event": "ObjectNotify",
            "params": {
                "object": "main_window",
                "property": "title",
                "value": { "type": "string", "value": "Changed" },
            },
        })]
    );
}

#[test]
fn connected_signal_broadcasts_object_signal() {
    let h = common::harness();
    h.ok("Connect", json!({ "object": "ok_button", "signal": "pressed" }));
    Harness::object(&h.button).emit(
        "pressed",
        None,
        &[PropertyValue::Int(3), PropertyValue::from("left")],
    );
    assert_eq!(
        h.take_events(),
        vec![json!({
            "event": "ObjectSignal",
            "params": {
                "signal": "pressed",
                "detail": "",
                "params": [
                    { "type": "string", "value": "ok_button" },
                    { "type": "int64", "value": 3 },
                    { "type": "string", "value": "left" },
                ],
            },
        })]
    );
}

#[test]
fn page_changes_reach_connected_proxy_subscribers() {
    let h = common::harness();
    h.ok(
        "Connect",
        json!({ "object": "webview.JSContext.testobject", "signal": "notify", "detail": "a_string" }),
    );
    assert!(h
        .engine
        .set_page_property("testobject", "a_string", ForeignValue::String("from page".into())));
    h.main_loop.run_until_idle();
    assert_eq!(
        h.take_events(),
        vec![json!({
            "event": "ObjectNotify",
            "params": {
                "object": "webview.JSContext.testobject",
                "property": "a-string",
                "value": { "type": "string", "value": "from page" },
            },
        })]
    );
    assert!(h.engine.executed_assignments().is_empty());
}

#[test]
fn dropping_the_controller_disconnects_handlers() {
    let h = common::harness();
    let controller = Controller::new(
        h.controller.resolver().clone(),
        Rc::clone(&h.surface) as _,
        h.main_loop.clone(),
        ControlSettings::default(),
    );
    controller.connect("ok_button", "clicked", None).unwrap();
    controller.connect("ok_button", "notify", Some("label")).unwrap();
    assert_eq!(h.button.handler_count(), 2);
    drop(controller);
    assert_eq!(h.button.handler_count(), 0);
}

#[test]
fn css_is_installed_and_replaceable() {
    let h = common::harness();
    assert_eq!(h.surface.css(), DEFAULT_CSS);
    assert_eq!(h.ok("GetCss", json!({})), json!({ "css": DEFAULT_CSS }));

    let css = ".highlight { background: red; }";
    assert_eq!(h.ok("SetCss", json!({ "css": css })), json!(null));
    assert_eq!(h.surface.css(), css);
    assert_eq!(h.controller.css(), css);
}

#[test]
fn subscriber_returning_false_is_dropped() {
    let h = common::harness();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    h.controller.subscribe(move |_event: &ControlEvent| {
        seen.set(seen.get() + 1);
        false
    });
    assert_eq!(h.controller.subscriber_count(), 2);

    for id in ["a", "b"] {
        h.ok(
            "Message",
            json!({ "id": id, "relative_to": "ok_button" }),
        );
        h.ok("MessageClear", json!({ "id": id }));
    }
    assert_eq!(calls.get(), 1);
    assert_eq!(h.controller.subscriber_count(), 1);
    assert_eq!(h.take_events().len(), 2);
}

#[test]
fn malformed_requests_are_answered_not_dropped() {
    let h = common::harness();
    assert_eq!(h.controller.handle_request_line("   "), None);

    let response: serde_json::Value =
        serde_json::from_str(&h.controller.handle_request_line("{oops").unwrap()).unwrap();
    assert_eq!(response["id"], 0);
    assert_eq!(response["kind"], "InvalidRequest");

    assert_eq!(h.error_kind("Teleport", json!({})), "InvalidRequest");
    let response: serde_json::Value = serde_json::from_str(
        &h.controller
            .handle_request_line(r#"{"id":9,"type":"Get"}"#)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(response["id"], 9);
    assert_eq!(response["error"], "missing params");
    assert_eq!(
        h.error_kind("Get", json!({ "object": "main_window" })),
        "InvalidRequest"
    );
}
