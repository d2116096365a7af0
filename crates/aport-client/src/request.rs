//! Verification request construction.
//!
//! Purely structural: merges identity, policy identity, idempotency key and
//! caller context into one envelope and picks the target path. Field shapes
//! are validated by the server, not here.

use serde::Serialize;
use serde_json::Value;

use crate::error::{AportError, AportResult};
use crate::types::{PassportData, PolicyPack, VerificationContext};

/// Policy id used in the path when the policy pack travels in the body.
pub const IN_BODY_POLICY_ID: &str = "IN_BODY";

pub(crate) const TOKEN_VALIDATE_PATH: &str = "/api/verify/token/validate";
pub(crate) const JWKS_PATH: &str = "/jwks.json";

pub(crate) fn token_path(policy_id: &str) -> String {
    format!("/api/verify/token/{}", policy_id)
}

pub(crate) fn passport_view_path(agent_id: &str) -> String {
    format!("/api/passports/{}/verify_view", agent_id)
}

/// How the requesting agent is identified.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Server resolves the passport from the registry ("cloud mode").
    AgentId(String),
    /// Caller supplies the full passport ("local mode").
    Passport(PassportData),
}

impl Identity {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::AgentId(id) => id,
            Self::Passport(passport) => &passport.agent_id,
        }
    }
}

impl From<&str> for Identity {
    fn from(agent_id: &str) -> Self {
        Self::AgentId(agent_id.to_string())
    }
}

impl From<String> for Identity {
    fn from(agent_id: String) -> Self {
        Self::AgentId(agent_id)
    }
}

impl From<PassportData> for Identity {
    fn from(passport: PassportData) -> Self {
        Self::Passport(passport)
    }
}

/// Which policy a verification request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyTarget {
    /// Server-known policy, named in the path.
    Named(String),
    /// Policy pack supplied in the body; path uses [`IN_BODY_POLICY_ID`].
    InBody,
}

impl PolicyTarget {
    pub fn path(&self) -> String {
        let id = match self {
            Self::Named(id) => id.as_str(),
            Self::InBody => IN_BODY_POLICY_ID,
        };
        format!("/api/verify/policy/{}", id)
    }
}

/// Body of `POST /api/verify/policy/{policy_id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyEnvelope {
    pub context: VerificationContext,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport: Option<PassportData>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyPack>,
}

/// Body of `POST /api/verify/token/{policy_id}`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub agent_id: &'a str,
    pub context: &'a VerificationContext,
}

/// Inputs of a verification request, before envelope assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationRequest {
    agent_id: Option<String>,
    policy_id: Option<String>,
    idempotency_key: Option<String>,
    context: VerificationContext,
    passport: Option<PassportData>,
    policy: Option<PolicyPack>,
}

impl VerificationRequest {
    pub fn new(context: VerificationContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<impl Into<String>>) -> Self {
        self.idempotency_key = key.map(Into::into);
        self
    }

    /// Attach a passport; its `agent_id` becomes the request's agent id
    /// unless one was already set.
    pub fn with_passport(mut self, passport: PassportData) -> Self {
        if self.agent_id.is_none() {
            self.agent_id = Some(passport.agent_id.clone());
        }
        self.passport = Some(passport);
        self
    }

    pub fn with_policy(mut self, policy: PolicyPack) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_identity(self, identity: Identity) -> Self {
        match identity {
            Identity::AgentId(id) => self.with_agent_id(id),
            Identity::Passport(passport) => self.with_passport(passport),
        }
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// A policy pack always wins over a named policy id.
    pub fn target(&self) -> AportResult<PolicyTarget> {
        match (&self.policy, &self.policy_id) {
            (Some(_), _) => Ok(PolicyTarget::InBody),
            (None, Some(id)) => Ok(PolicyTarget::Named(id.clone())),
            (None, None) => Err(AportError::invalid_request(
                "verification request names no policy",
            )),
        }
    }

    /// Assemble the envelope.
    ///
    /// `context` is `{agent_id, policy_id, idempotency_key, ...caller context}`;
    /// identity fields that were not supplied are omitted, never null.
    pub fn envelope(&self) -> VerifyEnvelope {
        let mut context = VerificationContext::new();
        let identity_fields = [
            ("agent_id", &self.agent_id),
            ("policy_id", &self.policy_id),
            ("idempotency_key", &self.idempotency_key),
        ];
        for (key, value) in identity_fields {
            if let Some(value) = value {
                context.insert(key, Value::String(value.clone()));
            }
        }
        context.merge(self.context.clone());

        VerifyEnvelope {
            context,
            passport: self.passport.clone(),
            policy: self.policy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> VerificationContext {
        VerificationContext::new()
            .with("amount", 500)
            .with("currency", "USD")
    }

    #[test]
    fn test_envelope_omits_missing_identity_fields() {
        let request = VerificationRequest::new(ctx()).with_policy_id("finance.payment.refund.v1");
        let body = serde_json::to_value(request.envelope()).unwrap();

        assert_eq!(
            body,
            json!({
                "context": {
                    "policy_id": "finance.payment.refund.v1",
                    "amount": 500,
                    "currency": "USD"
                }
            })
        );
        assert!(body["context"].get("agent_id").is_none());
        assert!(body["context"].get("idempotency_key").is_none());
        assert!(body.get("passport").is_none());
        assert!(body.get("policy").is_none());
    }

    #[test]
    fn test_envelope_full() {
        let request = VerificationRequest::new(ctx())
            .with_agent_id("ap_1")
            .with_policy_id("finance.payment.refund.v1")
            .with_idempotency_key(Some("idem-1"));
        let body = serde_json::to_value(request.envelope()).unwrap();

        assert_eq!(body["context"]["agent_id"], "ap_1");
        assert_eq!(body["context"]["policy_id"], "finance.payment.refund.v1");
        assert_eq!(body["context"]["idempotency_key"], "idem-1");
        assert_eq!(body["context"]["amount"], 500);
    }

    #[test]
    fn test_caller_context_wins_on_conflict() {
        let request = VerificationRequest::new(VerificationContext::new().with("policy_id", "custom"))
            .with_policy_id("finance.payment.refund.v1");

        let envelope = request.envelope();
        assert_eq!(envelope.context.get("policy_id"), Some(&json!("custom")));
    }

    #[test]
    fn test_passport_sets_agent_id_for_cross_check() {
        let passport = PassportData::new("ap_local").with_attribute("status", "active");
        let request = VerificationRequest::new(ctx())
            .with_policy_id("data.export.create.v1")
            .with_passport(passport.clone());

        let envelope = request.envelope();
        assert_eq!(envelope.context.get("agent_id"), Some(&json!("ap_local")));
        assert_eq!(envelope.passport, Some(passport));
    }

    #[test]
    fn test_explicit_agent_id_kept_with_passport() {
        let request = VerificationRequest::new(ctx())
            .with_agent_id("ap_explicit")
            .with_passport(PassportData::new("ap_other"));
        assert_eq!(
            request.envelope().context.get("agent_id"),
            Some(&json!("ap_explicit"))
        );
    }

    #[test]
    fn test_policy_pack_routes_to_in_body() {
        let request = VerificationRequest::new(ctx())
            .with_policy_id("finance.payment.refund.v1")
            .with_policy(PolicyPack::new("custom.policy.v1"));

        let target = request.target().unwrap();
        assert_eq!(target, PolicyTarget::InBody);
        assert_eq!(target.path(), "/api/verify/policy/IN_BODY");
    }

    #[test]
    fn test_named_target_path() {
        let request = VerificationRequest::new(ctx()).with_policy_id("code.release.publish.v1");
        assert_eq!(
            request.target().unwrap().path(),
            "/api/verify/policy/code.release.publish.v1"
        );
    }

    #[test]
    fn test_no_policy_is_invalid_request() {
        let err = VerificationRequest::new(ctx()).target().unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.code(), Some("INVALID_REQUEST"));
    }

    #[test]
    fn test_identity_dispatch() {
        let by_id = VerificationRequest::new(ctx()).with_identity(Identity::from("ap_1"));
        assert!(by_id.envelope().passport.is_none());

        let by_passport = VerificationRequest::new(ctx())
            .with_identity(Identity::from(PassportData::new("ap_2")));
        let envelope = by_passport.envelope();
        assert_eq!(envelope.context.get("agent_id"), Some(&json!("ap_2")));
        assert!(envelope.passport.is_some());
    }

    #[test]
    fn test_paths() {
        assert_eq!(token_path("p.v1"), "/api/verify/token/p.v1");
        assert_eq!(passport_view_path("ap_1"), "/api/passports/ap_1/verify_view");
    }
}
