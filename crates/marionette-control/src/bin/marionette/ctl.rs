//! Control CLI helpers.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use marionette_control::{ControlEndpoint, ControlRequest, HostConfig};
use serde_json::json;

use crate::cli::ControlAction;

const REQUEST_ID: u64 = 1;

pub fn run_control(
    endpoint: Option<String>,
    config: Option<PathBuf>,
    action: ControlAction,
) -> anyhow::Result<()> {
    let endpoint = match (endpoint, config) {
        (Some(endpoint), _) => ControlEndpoint::parse(&endpoint)?,
        (None, Some(path)) => HostConfig::load(path)?.endpoint,
        (None, None) => ControlEndpoint::default(),
    };
    match endpoint {
        ControlEndpoint::Tcp(addr) => {
            let mut stream = std::net::TcpStream::connect(addr)?;
            let mut reader = BufReader::new(stream.try_clone()?);
            send_control_request(&mut stream, &mut reader, &action)
        }
        #[cfg(unix)]
        ControlEndpoint::Unix(path) => {
            let mut stream = std::os::unix::net::UnixStream::connect(path)?;
            let mut reader = BufReader::new(stream.try_clone()?);
            send_control_request(&mut stream, &mut reader, &action)
        }
    }
}

fn send_control_request<S: Write, R: BufRead>(
    stream: &mut S,
    reader: &mut R,
    action: &ControlAction,
) -> anyhow::Result<()> {
    let Some(request) = build_request(action)? else {
        return print_events(reader);
    };
    let line = serde_json::to_string(&request)?;
    writeln!(stream, "{line}")?;
    stream.flush()?;

    let mut response = String::new();
    loop {
        response.clear();
        if reader.read_line(&mut response)? == 0 {
            anyhow::bail!("connection closed before a response arrived");
        }
        let value: serde_json::Value = serde_json::from_str(response.trim_end())?;
        if value.get("id").and_then(serde_json::Value::as_u64) == Some(REQUEST_ID) {
            print_control_response(action, &value);
            if value.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
                anyhow::bail!("request failed");
            }
            break;
        }
    }
    if matches!(action, ControlAction::Connect { follow: true, .. }) {
        return print_events(reader);
    }
    Ok(())
}

fn print_events<R: BufRead>(reader: &mut R) -> anyhow::Result<()> {
    for line in reader.lines() {
        println!("{}", line?);
    }
    Ok(())
}

fn print_control_response(action: &ControlAction, response: &serde_json::Value) {
    let result = response.get("result");
    match action {
        ControlAction::Export { .. } => {
            if let Some(result) = result {
                let path = result.get("path").and_then(|v| v.as_str()).unwrap_or_default();
                let xml = result.get("xml").and_then(|v| v.as_str()).unwrap_or_default();
                println!("{path}");
                print!("{xml}");
                return;
            }
        }
        ControlAction::GetCss => {
            if let Some(css) = result.and_then(|r| r.get("css")).and_then(|v| v.as_str()) {
                println!("{css}");
                return;
            }
        }
        _ => {}
    }
    println!("{response}");
}

fn build_request(action: &ControlAction) -> anyhow::Result<Option<ControlRequest>> {
    let (kind, params) = match action {
        ControlAction::Highlight { object, timeout_ms } => (
            "Highlight",
            json!({ "object": object, "timeout_ms": timeout_ms }),
        ),
        ControlAction::Unhighlight { object } => ("Unhighlight", json!({ "object": object })),
        ControlAction::Message {
            id,
            relative_to,
            text,
            icon_name,
            timeout_ms,
        } => (
            "Message",
            json!({
                "id": id,
                "text": text,
                "icon_name": icon_name,
                "relative_to": relative_to,
                "timeout_ms": timeout_ms,
            }),
        ),
        ControlAction::MessageClear { id } => ("MessageClear", json!({ "id": id })),
        ControlAction::Set {
            object,
            property,
            value,
        } => {
            let value: serde_json::Value = serde_json::from_str(value)?;
            (
                "Set",
                json!({ "object": object, "property": property, "value": value }),
            )
        }
        ControlAction::Get { object, property } => {
            ("Get", json!({ "object": object, "property": property }))
        }
        ControlAction::Connect {
            object,
            signal,
            detail,
            ..
        } => (
            "Connect",
            json!({ "object": object, "signal": signal, "detail": detail }),
        ),
        ControlAction::Emit {
            object,
            signal,
            detail,
            params,
        } => {
            let params: serde_json::Value = serde_json::from_str(params)?;
            (
                "Emit",
                json!({ "object": object, "signal": signal, "detail": detail, "params": params }),
            )
        }
        ControlAction::Export { object } => ("Export", json!({ "object": object })),
        ControlAction::SetCss { css } => ("SetCss", json!({ "css": css })),
        ControlAction::GetCss => ("GetCss", json!({})),
        ControlAction::Watch => return Ok(None),
    };
    Ok(Some(ControlRequest::new(REQUEST_ID, kind, params)))
}
