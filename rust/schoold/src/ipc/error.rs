use crate::model::ValidationError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn invalid(id: &str, e: &ValidationError) -> serde_json::Value {
    err(id, "bad_params", e.to_string(), e.details())
}

/// `{:#}` keeps the anyhow context chain in the message.
pub fn db_err(id: &str, code: &str, e: anyhow::Error) -> serde_json::Value {
    err(id, code, format!("{e:#}"), None)
}
