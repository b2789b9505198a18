//! Fault classification for non-2xx responses.
//!
//! OpenStack services report failures as a JSON object whose single key names
//! the fault (`{"itemNotFound": {"message": "...", "code": 404}}`). The key is
//! mapped through a static table onto [`FaultKind`]; anything unknown becomes
//! [`FaultKind::Other`].

use crate::error::{ApiError, Error, FaultKind, Result};
use crate::transport::Response;
use serde_json::Value;

/// Classify a status and body.
///
/// Returns `None` for 2xx statuses.
#[must_use]
pub fn classify(status: u16, body: &str) -> Option<ApiError> {
    if (200..300).contains(&status) {
        return None;
    }

    // HEAD responses carry no body.
    if body.is_empty() && status == 404 {
        return Some(not_found(status, body));
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => return Some(classify_unparsable(status, body, &err)),
    };

    let envelope = parsed
        .as_object()
        .and_then(|map| map.iter().next())
        .and_then(|(key, value)| FaultKind::from_key(key).map(|kind| (kind, value)));

    let error = match envelope {
        Some((kind, value)) => ApiError::new(kind, fault_message(value), status, body),
        None => ApiError::new(
            FaultKind::Other,
            format!("The server returned status {status}"),
            status,
            body,
        ),
    };
    Some(error)
}

/// Classify a response.
#[must_use]
pub fn classify_response(response: &Response) -> Option<ApiError> {
    classify(response.status(), &response.text())
}

/// Pass a 2xx response through, turn anything else into [`Error::Api`].
///
/// # Errors
///
/// Returns the classified fault for non-2xx responses.
pub fn check(response: Response) -> Result<Response> {
    match classify_response(&response) {
        Some(fault) => Err(Error::Api(fault)),
        None => Ok(response),
    }
}

fn fault_message(value: &Value) -> String {
    match value {
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        Value::String(message) => message.clone(),
        other => other.to_string(),
    }
}

fn not_found(status: u16, body: &str) -> ApiError {
    ApiError::new(
        FaultKind::ItemNotFound,
        "The resource could not be found",
        status,
        body,
    )
}

fn classify_unparsable(status: u16, body: &str, err: &serde_json::Error) -> ApiError {
    match status {
        404 => not_found(status, body),
        409 => ApiError::new(
            FaultKind::ResourceStateConflict,
            "There was a conflict with the state of the resource",
            status,
            body,
        ),
        _ => ApiError::new(
            FaultKind::Other,
            format!("Unable to parse error response: {err}"),
            status,
            body,
        ),
    }
}
