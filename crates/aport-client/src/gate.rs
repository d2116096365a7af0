//! Outcome classification for callers that gate an action on a decision.
//!
//! A failure to obtain a decision and a negative decision are different
//! outcomes and map to different responses.

use serde_json::{json, Map, Value};

use crate::error::{AportError, AportResult};
use crate::types::Decision;

/// Result of gating an action on a verification call.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// The policy allows the action.
    Allowed(Decision),
    /// The policy was evaluated and denies the action.
    PolicyViolation(Decision),
    /// No decision could be obtained.
    Failed(AportError),
}

impl GateOutcome {
    pub fn from_result(result: AportResult<Decision>) -> Self {
        match result {
            Ok(decision) if decision.allow => Self::Allowed(decision),
            Ok(decision) => Self::PolicyViolation(decision),
            Err(e) => Self::Failed(e),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Self::Allowed(d) | Self::PolicyViolation(d) => Some(d),
            Self::Failed(_) => None,
        }
    }

    /// HTTP status a caller should answer with.
    ///
    /// Failures use their own status; a network failure (status 0) becomes 502.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Allowed(_) => 200,
            Self::PolicyViolation(_) => 403,
            Self::Failed(e) if e.status == 0 => 502,
            Self::Failed(e) => e.status,
        }
    }

    /// JSON error body for a denied or failed outcome; `None` when allowed.
    pub fn error_body(&self, agent_id: Option<&str>, policy_id: Option<&str>) -> Option<Value> {
        let mut body = Map::new();
        match self {
            Self::Allowed(_) => return None,
            Self::PolicyViolation(decision) => {
                body.insert("error".into(), json!("policy_violation"));
                body.insert("message".into(), json!("Policy violation"));
                body.insert("decision_id".into(), json!(decision.decision_id));
                body.insert("reasons".into(), json!(decision.reasons));
            }
            Self::Failed(e) => {
                body.insert("error".into(), json!("api_error"));
                body.insert("message".into(), json!(e.message()));
                if let Some(id) = &e.decision_id {
                    body.insert("decision_id".into(), json!(id));
                }
                body.insert("reasons".into(), json!(e.reasons));
            }
        }
        if let Some(agent_id) = agent_id {
            body.insert("agent_id".into(), json!(agent_id));
        }
        if let Some(policy_id) = policy_id {
            body.insert("policy_id".into(), json!(policy_id));
        }
        Some(Value::Object(body))
    }
}

impl From<AportResult<Decision>> for GateOutcome {
    fn from(result: AportResult<Decision>) -> Self {
        Self::from_result(result)
    }
}
