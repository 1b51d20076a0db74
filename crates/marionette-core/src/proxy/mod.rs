//! Proxy types synthesized from script objects.
//!
//! A proxy type is a fixed slot layout plus the class describing it; each
//! distinct script variable gets one type, registered under its shape key.
//! Instances serve reads from their slots and push writes into the script
//! context in the background, one write in flight per slot.

#![allow(missing_docs)]

mod instance;
mod registry;

use std::rc::Rc;

use smol_str::SmolStr;
use tracing::debug;

use crate::error::ControlError;
use crate::script::{ScriptBridge, ScriptView};

pub use instance::{ProxyInstance, ProxyState, SyncState};
pub use registry::{ProxyShape, ProxyType, ProxyTypeRegistry};

/// Prefix of every synthesized proxy type name.
pub const PROXY_TYPE_PREFIX: &str = "ScriptProxy";

/// Shape key for a script variable: `my_object` gives `ScriptProxyMyObject`.
#[must_use]
pub fn shape_key(variable: &str) -> SmolStr {
    let mut key = String::from(PROXY_TYPE_PREFIX);
    for part in variable.split('_').filter(|part| !part.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_uppercase());
            key.push_str(chars.as_str());
        }
    }
    SmolStr::new(key)
}

/// Creates and caches proxies for script variables.
#[derive(Debug, Clone)]
pub struct ProxyFactory {
    bridge: ScriptBridge,
    registry: Rc<ProxyTypeRegistry>,
}

impl ProxyFactory {
    #[must_use]
    pub fn new(bridge: ScriptBridge, registry: Rc<ProxyTypeRegistry>) -> Self {
        Self { bridge, registry }
    }

    #[must_use]
    pub fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<ProxyTypeRegistry> {
        &self.registry
    }

    /// Proxy for `variable` in `view`, created on first use.
    ///
    /// The instance is cached in the view before bootstrapping so reentrant
    /// lookups during the bootstrap see the same instance.
    pub fn proxy_for(
        &self,
        view: &ScriptView,
        variable: &str,
        path: &str,
    ) -> Result<Rc<ProxyInstance>, ControlError> {
        if let Some(proxy) = view.cached_proxy(variable) {
            return Ok(proxy);
        }
        let (_, shape) = self.bridge.discover(view, variable)?;
        let proxy_type = self.registry.define_type(&shape_key(variable), shape);
        let proxy = ProxyInstance::instantiate(proxy_type, path);
        view.cache_proxy(variable, Rc::clone(&proxy));
        proxy.bind(&self.bridge, view, variable);
        debug!(path, state = ?proxy.state(), "created script proxy");
        Ok(proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_key_is_camel_case() {
        assert_eq!(shape_key("my_object"), "ScriptProxyMyObject");
        assert_eq!(shape_key("testobject"), "ScriptProxyTestobject");
        assert_eq!(shape_key("__a__b"), "ScriptProxyAB");
    }
}
