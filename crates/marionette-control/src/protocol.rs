//! JSON line protocol spoken on the control endpoint.
//!
//! Every line is one JSON object: requests carry `{id, type, params}`,
//! responses `{id, ok, result | error, kind}`, and broadcast events
//! `{event, params}`.

#![allow(missing_docs)]

use indexmap::IndexMap;
use marionette_core::value::WireValue;
use marionette_core::ControlError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;

pub const EVENT_MESSAGE_DONE: &str = "MessageDone";
pub const EVENT_OBJECT_SIGNAL: &str = "ObjectSignal";
pub const EVENT_OBJECT_NOTIFY: &str = "ObjectNotify";
pub const EVENT_PROPERTIES_CHANGED: &str = "PropertiesChanged";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: u64,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl ControlRequest {
    pub fn new(id: u64, r#type: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id,
            r#type: r#type.into(),
            params: Some(params),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine name of the error, see [`ControlError::kind`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl ControlResponse {
    pub fn ok(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
            kind: None,
        }
    }

    /// Success without a return value.
    pub fn done(id: u64) -> Self {
        Self::ok(id, json!(null))
    }

    pub fn error(id: u64, error: &ControlError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
        }
    }

    /// Malformed request, not attributable to a control operation.
    pub fn invalid(id: u64, error: String) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
            kind: Some("InvalidRequest"),
        }
    }
}

/// Asynchronous notification broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlEvent {
    pub event: &'static str,
    pub params: serde_json::Value,
}

impl ControlEvent {
    pub fn message_done(id: &str) -> Self {
        Self {
            event: EVENT_MESSAGE_DONE,
            params: json!({ "id": id }),
        }
    }

    /// `params` starts with the emitting object's name.
    pub fn object_signal(signal: &str, detail: Option<&str>, params: Vec<WireValue>) -> Self {
        Self {
            event: EVENT_OBJECT_SIGNAL,
            params: json!({
                "signal": signal,
                "detail": detail.unwrap_or_default(),
                "params": params,
            }),
        }
    }

    pub fn object_notify(object: &str, property: &str, value: WireValue) -> Self {
        Self {
            event: EVENT_OBJECT_NOTIFY,
            params: json!({
                "object": object,
                "property": property,
                "value": value,
            }),
        }
    }

    pub fn properties_changed(
        path: &str,
        interface: &str,
        changed: IndexMap<SmolStr, WireValue>,
    ) -> Self {
        let invalidated: Vec<&str> = changed.keys().map(SmolStr::as_str).collect();
        let changed: serde_json::Map<String, serde_json::Value> = changed
            .iter()
            .map(|(name, value)| (name.to_string(), json!(value)))
            .collect();
        Self {
            event: EVENT_PROPERTIES_CHANGED,
            params: json!({
                "path": path,
                "interface": interface,
                "changed": changed,
                "invalidated": invalidated,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HighlightParams {
    pub object: String,
    #[serde(default)]
    pub timeout_ms: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectParams {
    pub object: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageParams {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub icon_name: String,
    pub relative_to: String,
    #[serde(default)]
    pub timeout_ms: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageIdParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetParams {
    pub object: String,
    pub property: String,
    pub value: WireValue,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetParams {
    pub object: String,
    pub property: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectParams {
    pub object: String,
    pub signal: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmitParams {
    pub object: String,
    pub signal: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub params: Vec<WireValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CssParams {
    pub css: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathParams {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathPropertyParams {
    pub path: String,
    pub property: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathSetParams {
    pub path: String,
    pub property: String,
    pub value: WireValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_kind() {
        let response = ControlResponse::error(7, &ControlError::NotFound("ghost".into()));
        let text = serde_json::to_string(&response).unwrap();
        assert_eq!(
            text,
            r#"{"id":7,"ok":false,"error":"object 'ghost' not found","kind":"NotFound"}"#
        );
    }

    #[test]
    fn request_params_are_optional() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"id":1,"type":"GetCss"}"#).unwrap();
        assert_eq!(request.r#type, "GetCss");
        assert!(request.params.is_none());
    }

    #[test]
    fn signal_event_shape() {
        let event = ControlEvent::object_signal("clicked", None, vec![WireValue::from("button")]);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "ObjectSignal",
                "params": {
                    "signal": "clicked",
                    "detail": "",
                    "params": [{"type": "string", "value": "button"}],
                }
            })
        );
    }

    #[test]
    fn set_params_take_tagged_values() {
        let params: SetParams = serde_json::from_value(json!({
            "object": "main_window",
            "property": "title",
            "value": {"type": "boxed", "value": {"type": "string", "value": "Hi"}},
        }))
        .unwrap();
        assert_eq!(params.value, WireValue::from("Hi").boxed());
    }
}
