mod common;

use std::cell::RefCell;
use std::rc::Rc;

use marionette_core::object::Emission;
use marionette_core::proxy::{
    shape_key, ProxyInstance, ProxyShape, ProxyState, ProxyTypeRegistry, SyncState,
};
use marionette_core::value::{
    ForeignValue, PropertyDescriptor, PropertyFlags, PropertyValue, ValueKind,
};
use marionette_core::HostObject;

const PATH: &str = "webview.JSContext.testobject";

fn proxy(scene: &common::Scene) -> Rc<ProxyInstance> {
    scene.resolver.resolve(PATH).unwrap();
    scene.view.cached_proxy("testobject").unwrap()
}

fn notifications(proxy: &ProxyInstance) -> Rc<RefCell<Vec<Emission>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    proxy.connect(
        "notify",
        None,
        Rc::new(move |emission: &Emission| sink.borrow_mut().push(emission.clone())),
    );
    seen
}

#[test]
fn discovered_object_becomes_synced_proxy() {
    let scene = common::scene();
    let proxy = proxy(&scene);

    assert_eq!(proxy.state(), ProxyState::Live(SyncState::Synced));
    assert_eq!(proxy.slot_count(), 4);
    assert_eq!(proxy.proxy_type().name(), "ScriptProxyTestobject");
    assert_eq!(proxy.name().as_deref(), Some(PATH));
    assert_eq!(proxy.get(1), Some(PropertyValue::Bool(true)));
    assert_eq!(proxy.get(2), Some(PropertyValue::from("A string")));
    assert_eq!(proxy.get(3), Some(PropertyValue::Double(1.2345)));
    assert_eq!(proxy.get_property("a_string"), Some(PropertyValue::from("A string")));
    assert!(scene.engine.is_observed("testobject"));
}

#[test]
fn setting_a_slot_writes_once_to_the_script() {
    let scene = common::scene();
    let proxy = proxy(&scene);
    let seen = notifications(&proxy);

    assert!(proxy.set(2, PropertyValue::from("Juan Pablo")));
    assert_eq!(proxy.get(2), Some(PropertyValue::from("Juan Pablo")));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].detail.as_deref(), Some("a-string"));
    assert!(scene.engine.executed_assignments().is_empty());

    scene.main_loop.run_until_idle();
    assert_eq!(
        scene.engine.executed_assignments(),
        vec![r#"testobject.a_string="Juan Pablo";"#.to_owned()]
    );
    assert_eq!(
        scene.engine.page_property("testobject", "a_string"),
        ForeignValue::String("Juan Pablo".into())
    );
    // The page echoes the change back; it matches the slot and is dropped.
    assert_eq!(seen.borrow().len(), 1);
    assert!(proxy.pending_write(2).is_none());
}

#[test]
fn setting_the_current_value_is_a_no_op() {
    let scene = common::scene();
    let proxy = proxy(&scene);
    let seen = notifications(&proxy);

    assert!(!proxy.set(1, PropertyValue::Bool(true)));
    assert!(!proxy.set(3, PropertyValue::Double(1.2345)));
    scene.main_loop.run_until_idle();

    assert!(seen.borrow().is_empty());
    assert!(scene.engine.executed_assignments().is_empty());
    assert!(proxy.pending_write(1).is_none());
}

#[test]
fn newer_write_supersedes_pending_one() {
    let scene = common::scene();
    let proxy = proxy(&scene);

    proxy.set(3, PropertyValue::Double(2.0));
    let first = proxy.pending_write(3).unwrap();
    proxy.set(3, PropertyValue::Double(3.5));
    let second = proxy.pending_write(3).unwrap();
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());

    scene.main_loop.run_until_idle();
    assert_eq!(
        scene.engine.executed_assignments(),
        vec!["testobject.a_double=3.5;".to_owned()]
    );
    assert_eq!(proxy.get(3), Some(PropertyValue::Double(3.5)));
}

#[test]
fn writes_to_different_slots_are_independent() {
    let scene = common::scene();
    let proxy = proxy(&scene);

    proxy.set(1, PropertyValue::Bool(false));
    proxy.set(2, PropertyValue::from("B"));
    scene.main_loop.run_until_idle();
    assert_eq!(scene.engine.executed_assignments().len(), 2);
}

#[test]
fn page_changes_flow_back_into_the_proxy() {
    let scene = common::scene();
    let proxy = proxy(&scene);
    let seen = notifications(&proxy);

    scene
        .engine
        .set_page_property("testobject", "a_boolean", ForeignValue::Bool(false));
    scene.main_loop.run_until_idle();

    assert_eq!(proxy.get(1), Some(PropertyValue::Bool(false)));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].args, vec![PropertyValue::Bool(false)]);
    assert!(scene.engine.executed_assignments().is_empty());
}

#[test]
fn mistyped_page_change_is_absorbed() {
    let scene = common::scene();
    let proxy = proxy(&scene);

    scene.engine.set_page_property(
        "testobject",
        "a_double",
        ForeignValue::String("not a number".into()),
    );
    scene.main_loop.run_until_idle();
    assert_eq!(proxy.get(3), Some(PropertyValue::Double(1.2345)));
    assert_eq!(proxy.state(), ProxyState::Live(SyncState::Synced));
}

#[test]
fn repeated_resolution_returns_cached_instance() {
    let scene = common::scene();
    let first = scene.resolver.resolve(PATH).unwrap();
    let second = scene.resolver.resolve(PATH).unwrap();
    assert_eq!(first, second);
    assert_eq!(scene.registry.type_names().len(), 1);
    assert_eq!(scene.engine.handler_names(), vec!["clippy_notify"]);
}

#[test]
fn define_type_is_idempotent() {
    let registry = ProxyTypeRegistry::new();
    let shape = ProxyShape::new([PropertyDescriptor::new(
        "count",
        ValueKind::Double,
        PropertyFlags::READWRITE,
    )]);
    let first = registry.define_type("ScriptProxyCounter", shape.clone());
    let second = registry.define_type("ScriptProxyCounter", ProxyShape::new([]));
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(second.shape(), &shape);

    let a = ProxyInstance::instantiate(Rc::clone(&first), "a");
    let b = ProxyInstance::instantiate(second, "b");
    assert_eq!(a.slot_count(), b.slot_count());
    assert_eq!(a.descriptor(1), b.descriptor(1));
    assert_eq!(shape_key("counter"), "ScriptProxyCounter");
}

#[test]
fn dropping_the_host_cancels_pending_writes() {
    let common::Scene {
        main_loop,
        display,
        engine,
        view,
        resolver,
        window,
        content,
        webview,
        ..
    } = common::scene();
    let proxy = resolver.resolve(PATH).unwrap();
    let instance = view.cached_proxy("testobject").unwrap();
    instance.set(2, PropertyValue::from("late"));
    let pending = instance.pending_write(2).unwrap();
    drop(instance);
    drop(proxy);

    display.remove_toplevel(&window.clone().into());
    drop((resolver, window, content, webview, view));
    assert!(pending.is_cancelled());

    main_loop.run_until_idle();
    assert!(engine.executed_assignments().is_empty());
}
