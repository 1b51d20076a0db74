//! Host configuration loading.

#![allow(missing_docs)]

use std::path::Path;
use std::time::Duration;

use marionette_core::script::DEFAULT_MESSAGE_HANDLER;
use marionette_core::{ControlError, DEFAULT_CONTEXT_MARKER};
use serde::Deserialize;
use smol_str::SmolStr;

use crate::transport::ControlEndpoint;

pub const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:7700";
pub const DEFAULT_OBJECT_PATH: &str = "/com/hack_computer/Clippy";
pub const DEFAULT_STYLE_CLASS: &str = "highlight";
pub const DEFAULT_BLOCKING_TIMEOUT_MS: u64 = 5000;

/// Stylesheet giving highlighted widgets a visible outline.
pub const DEFAULT_CSS: &str = ".highlight { outline: 2px solid #f5c211; outline-offset: 2px; }";

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub endpoint: ControlEndpoint,
    /// Root of the exported object paths.
    pub object_path: SmolStr,
    pub log_level: SmolStr,
    pub style_class: SmolStr,
    pub css: SmolStr,
    pub context_marker: SmolStr,
    pub message_handler: SmolStr,
    /// `None` waits forever.
    pub blocking_timeout: Option<Duration>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            endpoint: ControlEndpoint::default(),
            object_path: SmolStr::new(DEFAULT_OBJECT_PATH),
            log_level: SmolStr::new("info"),
            style_class: SmolStr::new(DEFAULT_STYLE_CLASS),
            css: SmolStr::new(DEFAULT_CSS),
            context_marker: SmolStr::new(DEFAULT_CONTEXT_MARKER),
            message_handler: SmolStr::new(DEFAULT_MESSAGE_HANDLER),
            blocking_timeout: Some(Duration::from_millis(DEFAULT_BLOCKING_TIMEOUT_MS)),
        }
    }
}

impl HostConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ControlError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let raw: HostToml = toml::from_str(text)
            .map_err(|err| ControlError::InvalidConfig(format!("host config: {err}").into()))?;
        raw.into_config()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostToml {
    control: Option<ControlSection>,
    log: Option<LogSection>,
    highlight: Option<HighlightSection>,
    script: Option<ScriptSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControlSection {
    endpoint: Option<String>,
    object_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HighlightSection {
    style_class: Option<String>,
    css: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptSection {
    context_marker: Option<String>,
    message_handler: Option<String>,
    blocking_timeout_ms: Option<u64>,
}

impl HostToml {
    fn into_config(self) -> Result<HostConfig, ControlError> {
        let mut config = HostConfig::default();

        if let Some(control) = self.control {
            if let Some(endpoint) = control.endpoint {
                config.endpoint = ControlEndpoint::parse(&endpoint)?;
            }
            if let Some(path) = control.object_path {
                validate_object_path(&path)?;
                config.object_path = SmolStr::new(path);
            }
        }
        if let Some(level) = self.log.and_then(|log| log.level) {
            config.log_level = parse_log_level(&level)?;
        }
        if let Some(highlight) = self.highlight {
            if let Some(class) = highlight.style_class {
                if !is_identifier(&class, &['-', '_']) {
                    return Err(ControlError::InvalidConfig(
                        format!("invalid highlight.style_class '{class}'").into(),
                    ));
                }
                config.style_class = SmolStr::new(class);
            }
            if let Some(css) = highlight.css {
                config.css = SmolStr::new(css);
            }
        }
        if let Some(script) = self.script {
            if let Some(marker) = script.context_marker {
                if marker.is_empty() || marker.contains('.') {
                    return Err(ControlError::InvalidConfig(
                        format!("invalid script.context_marker '{marker}'").into(),
                    ));
                }
                config.context_marker = SmolStr::new(marker);
            }
            if let Some(handler) = script.message_handler {
                if !is_identifier(&handler, &['_']) {
                    return Err(ControlError::InvalidConfig(
                        format!("invalid script.message_handler '{handler}'").into(),
                    ));
                }
                config.message_handler = SmolStr::new(handler);
            }
            if let Some(timeout) = script.blocking_timeout_ms {
                config.blocking_timeout = (timeout > 0).then(|| Duration::from_millis(timeout));
            }
        }
        Ok(config)
    }
}

fn parse_log_level(text: &str) -> Result<SmolStr, ControlError> {
    let level = text.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(SmolStr::new(level)),
        _ => Err(ControlError::InvalidConfig(
            format!("invalid log.level '{text}'").into(),
        )),
    }
}

fn validate_object_path(path: &str) -> Result<(), ControlError> {
    let valid = path.starts_with('/')
        && path.len() > 1
        && path[1..]
            .split('/')
            .all(|segment| is_identifier(segment, &['_']));
    if valid {
        Ok(())
    } else {
        Err(ControlError::InvalidConfig(
            format!("invalid control.object_path '{path}'").into(),
        ))
    }
}

fn is_identifier(text: &str, extra: &[char]) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || extra.contains(&c))
}
