//! Wire payloads for tasks and results.
//!
//! Incoming bodies are decoded into the lenient [`TaskPayload`] /
//! [`ResultPayload`] types (every field optional), then validated into the
//! stored [`Task`] / [`HandoffResult`] records. Validation runs before the
//! store is touched, so a rejected publish leaves no trace.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Status recorded on a result that does not carry one.
pub const DEFAULT_RESULT_STATUS: &str = "completed";

/// A published task, as stored and returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Identifier of the subject the work is performed for.
    pub subject_id: String,
    /// Identifier of the transaction this task belongs to.
    pub transaction_id: String,
    /// Client address recorded for proxy header injection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    /// Producer-supplied timestamp in epoch milliseconds.
    pub timestamp: i64,
}

/// A published result, as stored and returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffResult {
    pub session_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_ip: Option<String>,
    /// Consumer-supplied timestamp in epoch milliseconds.
    pub timestamp: i64,
}

/// Decoded `POST /task/{code}` body.
///
/// Accepts the legacy field names `userId` and `pageUrl`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPayload {
    #[serde(alias = "userId")]
    pub subject_id: Option<String>,
    pub transaction_id: Option<String>,
    pub real_ip: Option<String>,
    pub cookies: Option<String>,
    pub user_agent: Option<String>,
    #[serde(alias = "pageUrl")]
    pub source_url: Option<String>,
    pub verification_token: Option<String>,
    pub timestamp: Option<i64>,
}

impl TaskPayload {
    /// Convenience constructor with only the required fields set.
    pub fn new(subject_id: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            subject_id: Some(subject_id.into()),
            transaction_id: Some(transaction_id.into()),
            ..Self::default()
        }
    }

    /// Sets the identity-bearing `realIp` field.
    pub fn with_real_ip(mut self, real_ip: impl Into<String>) -> Self {
        self.real_ip = Some(real_ip.into());
        self
    }

    /// Validates the payload into a [`Task`].
    ///
    /// `now_ms` fills `timestamp` when the producer did not send one. Empty
    /// optional strings are normalized to absent.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] when `subjectId` or `transactionId` is
    /// missing or empty.
    pub fn into_task(self, now_ms: i64) -> Result<Task, RelayError> {
        let (Some(subject_id), Some(transaction_id)) =
            (non_empty(self.subject_id), non_empty(self.transaction_id))
        else {
            return Err(RelayError::Validation(
                "Missing subjectId or transactionId".to_string(),
            ));
        };

        Ok(Task {
            subject_id,
            transaction_id,
            real_ip: non_empty(self.real_ip),
            cookies: non_empty(self.cookies),
            user_agent: non_empty(self.user_agent),
            source_url: non_empty(self.source_url),
            verification_token: non_empty(self.verification_token),
            timestamp: self.timestamp.unwrap_or(now_ms),
        })
    }
}

/// Decoded `POST /result/{code}` body.
///
/// Accepts the legacy field name `event_session_id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultPayload {
    #[serde(alias = "event_session_id")]
    pub session_id: Option<String>,
    pub status: Option<String>,
    pub real_ip: Option<String>,
    pub timestamp: Option<i64>,
}

impl ResultPayload {
    /// Convenience constructor with only the required field set.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Validates the payload into a [`HandoffResult`].
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] when `sessionId` is missing or empty.
    pub fn into_result(self, now_ms: i64) -> Result<HandoffResult, RelayError> {
        let session_id = non_empty(self.session_id)
            .ok_or_else(|| RelayError::Validation("Missing sessionId".to_string()))?;

        Ok(HandoffResult {
            session_id,
            status: non_empty(self.status).unwrap_or_else(|| DEFAULT_RESULT_STATUS.to_string()),
            real_ip: non_empty(self.real_ip),
            timestamp: self.timestamp.unwrap_or(now_ms),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
