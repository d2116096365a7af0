//! Error types for the verification client.
//!
//! Every failure to obtain a decision surfaces as one [`AportError`] shape,
//! distinguished by `status` and the first reason `code`. A decision with
//! `allow == false` is never an error.

use crate::types::Reason;

/// Reason codes synthesized by the client.
pub mod codes {
    /// Deadline exceeded before a response arrived (status 408).
    pub const TIMEOUT: &str = "TIMEOUT";
    /// The exchange could not be completed at all (status 0).
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    /// The key set could not be fetched (status 500).
    pub const JWKS_FETCH_FAILED: &str = "JWKS_FETCH_FAILED";
    /// A decision token could not be verified locally (status 401).
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    /// A 2xx body that is not JSON or not the expected shape (status 502).
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    /// The request could not be assembled (status 400).
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
}

pub const STATUS_NETWORK: u16 = 0;
pub const STATUS_TIMEOUT: u16 = 408;

/// A failure to obtain a decision.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("aport error (status {status}): {}", summarize(.status, .reasons))]
pub struct AportError {
    /// HTTP status, `0` for network failure, `408` for timeout.
    pub status: u16,

    /// Reasons as reported by the server (unmodified) or synthesized by the client.
    pub reasons: Vec<Reason>,

    pub decision_id: Option<String>,

    /// Raw `Server-Timing` header of the failed response.
    pub server_timing: Option<String>,

    /// Raw response text, for diagnostics.
    pub raw_response: Option<String>,

    synthesized: bool,
}

impl AportError {
    pub fn new(status: u16, reasons: Vec<Reason>) -> Self {
        Self {
            status,
            reasons,
            decision_id: None,
            server_timing: None,
            raw_response: None,
            synthesized: false,
        }
    }

    fn synthesized(status: u16, code: &str, message: impl Into<String>) -> Self {
        let mut err = Self::new(status, vec![Reason::new(code, message)]);
        err.synthesized = true;
        err
    }

    pub fn timeout() -> Self {
        Self::synthesized(STATUS_TIMEOUT, codes::TIMEOUT, "Request timeout")
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::synthesized(STATUS_NETWORK, codes::NETWORK_ERROR, message)
    }

    pub fn jwks_fetch_failed() -> Self {
        Self::synthesized(500, codes::JWKS_FETCH_FAILED, "Failed to fetch JWKS")
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::synthesized(401, codes::INVALID_TOKEN, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::synthesized(400, codes::INVALID_REQUEST, message)
    }

    pub fn invalid_response(message: impl Into<String>, raw: Option<String>) -> Self {
        let mut err = Self::synthesized(502, codes::INVALID_RESPONSE, message);
        err.raw_response = raw;
        err
    }

    /// Code of the first reason, if any.
    pub fn code(&self) -> Option<&str> {
        self.reasons.first().map(|r| r.code.as_str())
    }

    /// Message of the first reason, or a status-derived fallback.
    pub fn message(&self) -> String {
        summarize(&self.status, &self.reasons)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.reasons.iter().any(|r| r.code == code)
    }

    pub fn is_timeout(&self) -> bool {
        self.status == STATUS_TIMEOUT && self.has_code(codes::TIMEOUT)
    }

    pub fn is_network(&self) -> bool {
        self.status == STATUS_NETWORK
    }

    /// Whether the failure was produced by this client rather than reported by the server.
    pub fn is_client_side(&self) -> bool {
        self.synthesized || self.is_timeout() || self.is_network()
    }

    /// Whether the caller may reasonably retry (with the same idempotency key).
    ///
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        self.is_timeout() || self.is_network() || self.status == 429 || self.status >= 500
    }

    pub(crate) fn with_decision_id(mut self, decision_id: Option<String>) -> Self {
        self.decision_id = decision_id;
        self
    }

    pub(crate) fn with_server_timing(mut self, server_timing: Option<String>) -> Self {
        self.server_timing = server_timing;
        self
    }

    pub(crate) fn with_raw_response(mut self, raw: Option<String>) -> Self {
        self.raw_response = raw;
        self
    }
}

fn summarize(status: &u16, reasons: &[Reason]) -> String {
    match reasons.first() {
        Some(r) if !r.message.is_empty() => r.message.clone(),
        Some(r) if !r.code.is_empty() => r.code.clone(),
        _ => format!("request failed with status {}", status),
    }
}

impl From<reqwest::Error> for AportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout()
        } else {
            Self::network(err.to_string())
        }
    }
}

/// Result type for client operations.
pub type AportResult<T> = Result<T, AportError>;
