//! SMS delivery provider abstraction layer.
//!
//! Defines the [`SmsProvider`] trait and the shared receipt/error types used
//! by all backend implementations.
//!
//! Two backends are implemented:
//! - [`twilio::TwilioProvider`] — Twilio `2010-04-01` REST API
//! - [`plivo::PlivoProvider`] — Plivo `v1` REST API
//!
//! The [`registry::ProviderRegistry`] maps configured provider names to
//! instances; it is populated at startup and read-only during dispatch.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

pub mod plivo;
pub mod registry;
pub mod twilio;

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// The result of a successful outbound send.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Backend-assigned message identifier, opaque to the rest of the system.
    pub provider_message_id: String,
    /// Raw response payload as returned by the backend.
    pub raw: Value,
}

/// Message-identifier field names tried in priority order when extracting a
/// receipt id from a backend response. Twilio uses `sid`; Plivo returns
/// `message_uuid` (an array with one element per destination).
const MESSAGE_ID_FIELDS: &[&str] = &["sid", "message_uuid"];

/// Extract the backend message identifier from a raw send response.
///
/// Tries [`MESSAGE_ID_FIELDS`] in order. A string value is taken as-is; an
/// array value yields its first string element.
pub fn extract_message_id(raw: &Value) -> Option<String> {
    for field in MESSAGE_ID_FIELDS {
        match raw.get(field) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Array(items)) => {
                if let Some(Value::String(s)) = items.first() {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a decimal field from a backend response.
///
/// Backends disagree on whether numeric amounts are JSON numbers or strings,
/// so both are accepted.
pub fn decimal_field(raw: &Value, field: &str) -> Option<f64> {
    match raw.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by delivery providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Backend responded with a status other than the one the operation expects.
    #[error("provider returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body (sanitised and truncated).
        body: String,
    },
    /// Response did not match the expected shape.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Send was accepted but the response carried no recognisable message id.
    #[error("provider response contained no message identifier")]
    MissingMessageId,
}

// ---------------------------------------------------------------------------
// HTTP helpers (shared by all backends)
// ---------------------------------------------------------------------------

/// Check that a response carries the operation's accepted status code and
/// return the body text, or a structured error otherwise.
///
/// Each backend encodes its own accepted code per operation (Twilio send is
/// 201, Plivo send is 202, reads are 200 on both).
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure,
/// `ProviderError::UnexpectedStatus` when the code does not match.
pub async fn expect_status(
    response: reqwest::Response,
    accepted: u16,
) -> Result<String, ProviderError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    if status != accepted {
        return Err(ProviderError::UnexpectedStatus {
            status,
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Parse a JSON response body.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the body is not valid JSON.
pub fn parse_json_body(body: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"AC[0-9a-fA-F]{32}",
        r"SK[0-9a-fA-F]{32}",
        r"MA[A-Z0-9]{30,}",
        r"Basic [A-Za-z0-9+/=]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core delivery provider interface.
///
/// Implementations perform a single outbound request per call: no retries and
/// no timeouts live here — dispatch policy belongs to the lifecycle engine.
/// Transport failures must propagate, never be swallowed.
///
/// All implementations must be `Send + Sync` so the engine and scheduler can
/// share them across async task boundaries.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Send one message to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the backend does not accept the message
    /// or the response cannot be interpreted.
    async fn send(&self, recipient: &str, body: &str) -> Result<DeliveryReceipt, ProviderError>;

    /// Query the account credit balance.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on non-success response or a missing balance
    /// field.
    async fn balance(&self) -> Result<f64, ProviderError>;

    /// Query delivery status for a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on non-success response or unknown identifier.
    async fn delivery_status(&self, provider_message_id: &str) -> Result<Value, ProviderError>;

    /// The backend name this instance was constructed for.
    fn name(&self) -> &str;
}
