use serde::de::DeserializeOwned;
use serde_json::json;

use marionette_core::ControlError;

use super::Controller;
use crate::protocol::{
    ConnectParams, ControlRequest, ControlResponse, CssParams, EmitParams, GetParams,
    HighlightParams, MessageIdParams, MessageParams, ObjectParams, PathParams, PathPropertyParams,
    PathSetParams, SetParams,
};

pub(super) fn dispatch(controller: &Controller, request: &ControlRequest) -> Option<ControlResponse> {
    let id = request.id;
    let params = request.params.clone();
    let response = match request.r#type.as_str() {
        "Highlight" => handle_highlight(id, params, controller),
        "Unhighlight" => handle_unhighlight(id, params, controller),
        "Message" => handle_message(id, params, controller),
        "MessageClear" => handle_message_clear(id, params, controller),
        "Set" => handle_set(id, params, controller),
        "Get" => handle_get(id, params, controller),
        "Connect" => handle_connect(id, params, controller),
        "Emit" => handle_emit(id, params, controller),
        "Export" => handle_export(id, params, controller),
        "SetCss" => handle_set_css(id, params, controller),
        "GetCss" => ControlResponse::ok(id, json!({ "css": controller.css().as_str() })),
        "Properties.Get" => handle_properties_get(id, params, controller),
        "Properties.Set" => handle_properties_set(id, params, controller),
        "Properties.GetAll" => handle_properties_get_all(id, params, controller),
        _ => return None,
    };
    Some(response)
}

fn parse_params<T: DeserializeOwned>(
    id: u64,
    params: Option<serde_json::Value>,
) -> Result<T, ControlResponse> {
    match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|err| ControlResponse::invalid(id, format!("invalid params: {err}"))),
        None => Err(ControlResponse::invalid(id, "missing params".into())),
    }
}

fn respond(id: u64, outcome: Result<serde_json::Value, ControlError>) -> ControlResponse {
    match outcome {
        Ok(result) => ControlResponse::ok(id, result),
        Err(err) => ControlResponse::error(id, &err),
    }
}

fn done(id: u64, outcome: Result<(), ControlError>) -> ControlResponse {
    respond(id, outcome.map(|()| serde_json::Value::Null))
}

fn handle_highlight(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: HighlightParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(id, controller.highlight(&params.object, params.timeout_ms))
}

fn handle_unhighlight(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: ObjectParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(id, controller.unhighlight(&params.object))
}

fn handle_message(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: MessageParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(
        id,
        controller.message(
            &params.id,
            &params.text,
            &params.icon_name,
            &params.relative_to,
            params.timeout_ms,
        ),
    )
}

fn handle_message_clear(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: MessageIdParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(id, controller.message_clear(&params.id))
}

fn handle_set(id: u64, params: Option<serde_json::Value>, controller: &Controller) -> ControlResponse {
    let params: SetParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(
        id,
        controller.set(&params.object, &params.property, &params.value),
    )
}

fn handle_get(id: u64, params: Option<serde_json::Value>, controller: &Controller) -> ControlResponse {
    let params: GetParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    respond(
        id,
        controller
            .get(&params.object, &params.property)
            .map(|value| json!(value)),
    )
}

fn handle_connect(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: ConnectParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(
        id,
        controller.connect(&params.object, &params.signal, params.detail.as_deref()),
    )
}

fn handle_emit(id: u64, params: Option<serde_json::Value>, controller: &Controller) -> ControlResponse {
    let params: EmitParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    respond(
        id,
        controller
            .emit(
                &params.object,
                &params.signal,
                params.detail.as_deref(),
                &params.params,
            )
            .map(|value| json!(value)),
    )
}

fn handle_export(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: ObjectParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    respond(
        id,
        controller
            .export(&params.object)
            .map(|(path, xml)| json!({ "path": path.as_str(), "xml": xml })),
    )
}

fn handle_set_css(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: CssParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    controller.set_css(&params.css);
    ControlResponse::done(id)
}

fn handle_properties_get(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: PathPropertyParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    respond(
        id,
        controller
            .properties_get(&params.path, &params.property)
            .map(|value| json!(value)),
    )
}

fn handle_properties_set(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: PathSetParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    done(
        id,
        controller.properties_set(&params.path, &params.property, &params.value),
    )
}

fn handle_properties_get_all(
    id: u64,
    params: Option<serde_json::Value>,
    controller: &Controller,
) -> ControlResponse {
    let params: PathParams = match parse_params(id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    respond(
        id,
        controller.properties_get_all(&params.path).map(|values| {
            let values: serde_json::Map<String, serde_json::Value> = values
                .into_iter()
                .map(|(name, value)| (name.to_string(), json!(value)))
                .collect();
            serde_json::Value::Object(values)
        }),
    )
}
