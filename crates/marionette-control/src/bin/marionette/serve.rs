//! `marionette serve`: headless host for a scene file.

use std::path::PathBuf;
use std::rc::Rc;

use marionette_control::{
    register_control_surface, ControlEndpoint, ControlSettings, Controller, HostConfig, Scene,
};
use marionette_core::headless::HeadlessSurface;
use marionette_core::proxy::{ProxyFactory, ProxyTypeRegistry};
use marionette_core::resolve::Toplevels;
use marionette_core::script::ScriptBridge;
use marionette_core::{MainLoop, ObjectResolver, Surface};
use tracing::info;

pub fn run_serve(
    config: Option<PathBuf>,
    scene: PathBuf,
    endpoint: Option<String>,
    verbose: bool,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(endpoint) = endpoint {
        config.endpoint = ControlEndpoint::parse(&endpoint)?;
    }
    crate::init_tracing(&config.log_level, verbose);

    let main_loop = MainLoop::new();
    let scene = Scene::load(&scene, &main_loop)?;
    let bridge = ScriptBridge::new(main_loop.clone())
        .with_blocking_timeout(config.blocking_timeout)
        .with_message_handler(config.message_handler.clone());
    let factory = ProxyFactory::new(bridge, Rc::new(ProxyTypeRegistry::new()));
    let resolver = ObjectResolver::new(Rc::clone(&scene.display) as Rc<dyn Toplevels>, factory)
        .with_context_marker(config.context_marker.clone());
    let surface: Rc<dyn Surface> = Rc::new(HeadlessSurface::new());
    let controller = Controller::new(
        resolver,
        surface,
        main_loop.clone(),
        ControlSettings::from(&config),
    );

    let Some(server) = register_control_surface(&config.endpoint, &controller, &main_loop) else {
        anyhow::bail!("control surface not registered on {}", config.endpoint);
    };
    info!(
        endpoint = %server.endpoint(),
        toplevels = scene.toplevels.len(),
        script_hosts = scene.engines.len(),
        "serving scene"
    );
    main_loop.run();
    Ok(())
}
