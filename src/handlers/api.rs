//! Handoff API handlers: publish, fetch and clear by code.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::error::RelayError;
use crate::server::AppState;
use crate::store::{HandoffResult, ResultPayload, Task, TaskPayload};

/// Acknowledgement for publish and clear calls
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    const OK: Self = Self { ok: true };
}

/// Task lookup response; `ok` is `false` and `task` is `null` when
/// nothing is pending
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub ok: bool,
    pub task: Option<Task>,
}

/// Result lookup response; `ok` is `false` and `result` is `null` when
/// nothing is pending
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub ok: bool,
    pub result: Option<HandoffResult>,
}

/// Publish a task for a code
pub async fn publish_task(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: Bytes,
) -> Result<Json<Ack>, RelayError> {
    let payload: TaskPayload = decode(&body)?;
    state.store.publish_task(&code, payload)?;
    Ok(Json(Ack::OK))
}

/// Fetch the pending task for a code. Never an error.
pub async fn fetch_task(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Json<TaskResponse> {
    let task = state.store.fetch_task(&code);
    Json(TaskResponse {
        ok: task.is_some(),
        task,
    })
}

/// Publish a result for a code
pub async fn publish_result(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: Bytes,
) -> Result<Json<Ack>, RelayError> {
    let payload: ResultPayload = decode(&body)?;
    state.store.publish_result(&code, payload)?;
    Ok(Json(Ack::OK))
}

/// Fetch the pending result for a code. Never an error.
pub async fn fetch_result(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Json<ResultResponse> {
    let result = state.store.fetch_result(&code);
    Json(ResultResponse {
        ok: result.is_some(),
        result,
    })
}

/// Remove everything held for a code. Clearing an unknown code succeeds.
pub async fn clear(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Json<Ack> {
    state.store.clear(&code);
    Json(Ack::OK)
}

/// Decodes a JSON body leniently.
///
/// The body's content type is not checked. A blank body decodes to the
/// payload's default, which then fails field validation like any other
/// incomplete payload.
fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RelayError::Validation(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_decodes_to_default() {
        let payload: TaskPayload = decode(b"").unwrap();
        assert!(payload.subject_id.is_none());
        let payload: TaskPayload = decode(b" \n").unwrap();
        assert!(payload.transaction_id.is_none());
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        let err = decode::<TaskPayload>(b"{not json").unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[test]
    fn aliases_are_accepted() {
        let payload: TaskPayload =
            decode(br#"{"userId":"u1","transactionId":"t1","pageUrl":"https://a.test"}"#).unwrap();
        assert_eq!(payload.subject_id.as_deref(), Some("u1"));
        assert_eq!(payload.source_url.as_deref(), Some("https://a.test"));
    }

    #[test]
    fn empty_lookup_serializes_null() {
        let body = serde_json::to_value(TaskResponse {
            ok: false,
            task: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"ok": false, "task": null}));
    }
}
