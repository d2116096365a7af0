//! Wire types shared between the client and the verification API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{AportError, AportResult};

/// Severity attached to a decision or failure reason.
///
/// Values this client does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "info" => Self::Info,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Other(raw),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// A machine-readable reason, as reported by the server or synthesized by the client.
///
/// Deserialization never fails: `code`, `message` and `severity` are lifted
/// out only when they are non-empty strings, and any other value (including
/// `null`) stays in `extra` under its own key, so a server reason
/// serializes back to what was received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reason {
    /// Stable reason code (e.g. `INSUFFICIENT_CAPABILITIES`, `TIMEOUT`).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,

    /// Human-readable message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Severity, when the server supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Any additional fields the server attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity: None,
            extra: Map::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Lift a raw reason entry. A non-object entry is kept under `extra["value"]`.
    pub fn from_value(value: Value) -> Self {
        let mut extra = match value {
            Value::Object(map) => map,
            other => {
                let mut reason = Self::new("", "");
                reason.extra.insert("value".to_string(), other);
                return reason;
            }
        };

        let code = take_string(&mut extra, "code").unwrap_or_default();
        let message = take_string(&mut extra, "message").unwrap_or_default();
        let severity = take_string(&mut extra, "severity").map(Severity::from);

        Self {
            code,
            message,
            severity,
            extra,
        }
    }

    /// Lift every entry of a `reasons` array; anything else yields no reasons.
    pub(crate) fn list_from_value(value: Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

impl<'de> Deserialize<'de> for Reason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

/// Tiered trust rating (`L0` through `L4`, possibly with a suffix such as `L4KYC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssuranceLevel(pub String);

impl AssuranceLevel {
    /// Numeric tier parsed from the `L<n>` prefix, if the value has one.
    pub fn tier(&self) -> Option<u8> {
        let rest = self.0.strip_prefix('L')?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Diagnostic metadata attached to a response by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Raw `Server-Timing` response header.
    #[serde(
        rename = "serverTiming",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_timing: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The authoritative outcome of a policy evaluation.
///
/// `allow == false` is a successful evaluation with a negative outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Opaque identifier, unique per evaluation.
    pub decision_id: String,

    /// Whether the action is permitted.
    pub allow: bool,

    /// Ordered reasons supporting the outcome.
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasons: Vec<Reason>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assurance_level: Option<AssuranceLevel>,

    /// Lifetime in seconds (decision token mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport_digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl Decision {
    /// Build a decision from a response payload.
    ///
    /// Unwraps `{"decision": {...}}` when present and carries an outer `_meta`
    /// onto the inner object if it has none of its own.
    pub(crate) fn from_payload(payload: Value) -> AportResult<Self> {
        let mut payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(AportError::invalid_response(
                    "decision payload is not an object",
                    Some(other.to_string()),
                ))
            }
        };

        let decision = match payload.remove("decision") {
            Some(Value::Object(mut inner)) => {
                if let Some(meta) = payload.remove("_meta") {
                    inner.entry("_meta").or_insert(meta);
                }
                inner
            }
            Some(other) => {
                payload.insert("decision".to_string(), other);
                payload
            }
            None => payload,
        };

        let raw = Value::Object(decision);
        serde_json::from_value(raw.clone()).map_err(|e| {
            AportError::invalid_response(
                format!("failed to parse decision: {}", e),
                Some(raw.to_string()),
            )
        })
    }

    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    /// `Server-Timing` diagnostic captured from the response, if any.
    pub fn server_timing(&self) -> Option<&str> {
        self.meta.as_ref()?.server_timing.as_deref()
    }

    /// `created_at` parsed as an RFC 3339 timestamp.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A full credential record supplied by the caller ("local mode").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportData {
    /// The agent this passport describes.
    pub agent_id: String,

    /// Capabilities, limits, assurance and any other passport attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl PassportData {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn assurance_level(&self) -> Option<AssuranceLevel> {
        self.attributes
            .get("assurance_level")
            .and_then(|v| v.as_str())
            .map(|s| AssuranceLevel(s.to_string()))
    }
}

/// A policy definition supplied in the request body instead of a server-known id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPack {
    pub id: String,

    #[serde(default)]
    pub requires_capabilities: Vec<String>,

    /// Free-form policy fields (limits, required fields, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PolicyPack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            requires_capabilities: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_required_capability(mut self, capability: impl Into<String>) -> Self {
        self.requires_capabilities.push(capability.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Caller-supplied data describing the action being authorized.
///
/// An open string-keyed map; merging is last-writer-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationContext(Map<String, Value>);

impl VerificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: VerificationContext) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for VerificationContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for VerificationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl TryFrom<Value> for VerificationContext {
    type Error = AportError;

    fn try_from(value: Value) -> AportResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(AportError::invalid_request(format!(
                "context must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Display-safe summary of an agent's passport (non-authoritative).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportView {
    #[serde(default)]
    pub agent_id: Option<String>,

    /// Passport status (e.g. `active`, `suspended`, `revoked`).
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub assurance_level: Option<AssuranceLevel>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub limits: Map<String, Value>,

    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,

    /// Remaining view fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_unwraps_nested_decision() {
        let payload = json!({
            "decision": {"decision_id": "dec_1", "allow": true, "reasons": []},
            "_meta": {"serverTiming": "db;dur=3"}
        });

        let decision = Decision::from_payload(payload).unwrap();
        assert_eq!(decision.decision_id, "dec_1");
        assert!(decision.allow);
        assert_eq!(decision.server_timing(), Some("db;dur=3"));
    }

    #[test]
    fn test_decision_inner_meta_wins() {
        let payload = json!({
            "decision": {"decision_id": "dec_1", "allow": false, "_meta": {"serverTiming": "inner"}},
            "_meta": {"serverTiming": "outer"}
        });

        let decision = Decision::from_payload(payload).unwrap();
        assert_eq!(decision.server_timing(), Some("inner"));
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_decision_null_reasons() {
        let decision =
            Decision::from_payload(json!({"decision_id": "d", "allow": true, "reasons": null}))
                .unwrap();
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn test_decision_missing_fields_is_invalid_response() {
        let err = Decision::from_payload(json!({"allow": true})).unwrap_err();
        assert_eq!(err.status, 502);
        assert_eq!(err.code(), Some("INVALID_RESPONSE"));
    }

    #[test]
    fn test_reason_keeps_unknown_fields_and_severity() {
        let reason: Reason = serde_json::from_value(json!({
            "code": "LIMIT_EXCEEDED",
            "message": "amount over limit",
            "severity": "critical",
            "field": "amount"
        }))
        .unwrap();

        assert_eq!(reason.severity, Some(Severity::Other("critical".into())));
        assert_eq!(reason.extra.get("field"), Some(&json!("amount")));
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            json!({
                "code": "LIMIT_EXCEEDED",
                "message": "amount over limit",
                "severity": "critical",
                "field": "amount"
            })
        );
    }

    #[test]
    fn test_reason_null_and_missing_fields_round_trip() {
        let raw = json!([
            {"code": "INSUFFICIENT_CAPABILITIES", "message": null, "severity": "error"},
            {"message": "no code"},
            {"code": 7, "severity": null},
            "bare string"
        ]);

        let reasons: Vec<Reason> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(reasons.len(), 4);
        assert_eq!(reasons[0].code, "INSUFFICIENT_CAPABILITIES");
        assert_eq!(reasons[0].message, "");
        assert_eq!(reasons[0].severity, Some(Severity::Error));
        assert_eq!(reasons[1].code, "");
        assert_eq!(reasons[1].message, "no code");
        assert_eq!(reasons[2].extra.get("code"), Some(&json!(7)));
        assert_eq!(reasons[3].extra.get("value"), Some(&json!("bare string")));

        let mut echoed = serde_json::to_value(&reasons).unwrap();
        let bare = echoed[3]["value"].take();
        echoed[3] = bare;
        assert_eq!(echoed, raw);
    }

    #[test]
    fn test_decision_with_loose_reasons_is_a_decision() {
        let decision = Decision::from_payload(json!({
            "decision_id": "dec_9",
            "allow": false,
            "reasons": [
                {"code": "LIMIT_EXCEEDED", "message": null, "severity": "critical"},
                {"message": "no code"}
            ]
        }))
        .unwrap();

        assert!(!decision.allow);
        assert_eq!(decision.reasons.len(), 2);
        assert_eq!(decision.reasons[0].severity.as_ref().map(Severity::as_str), Some("critical"));
        assert_eq!(decision.reasons[1].message, "no code");
    }

    #[test]
    fn test_assurance_tier() {
        assert_eq!(AssuranceLevel("L2".into()).tier(), Some(2));
        assert_eq!(AssuranceLevel("L4KYC".into()).tier(), Some(4));
        assert_eq!(AssuranceLevel("gold".into()).tier(), None);
    }

    #[test]
    fn test_context_merge_later_wins() {
        let mut ctx = VerificationContext::new().with("amount", 100).with("currency", "USD");
        ctx.merge(VerificationContext::new().with("amount", 500));

        assert_eq!(ctx.get("amount"), Some(&json!(500)));
        assert_eq!(ctx.get("currency"), Some(&json!("USD")));
    }

    #[test]
    fn test_context_try_from_value() {
        assert!(VerificationContext::try_from(json!(null)).unwrap().is_empty());
        assert_eq!(
            VerificationContext::try_from(json!({"a": 1})).unwrap().len(),
            1
        );
        let err = VerificationContext::try_from(json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), Some("INVALID_REQUEST"));
    }

    #[test]
    fn test_passport_flattens_attributes() {
        let passport = PassportData::new("ap_1")
            .with_attribute("assurance_level", "L3")
            .with_attribute("capabilities", json!([{"id": "finance.payment.refund"}]));

        let value = serde_json::to_value(&passport).unwrap();
        assert_eq!(value["agent_id"], "ap_1");
        assert_eq!(value["assurance_level"], "L3");
        assert_eq!(passport.assurance_level().and_then(|l| l.tier()), Some(3));
    }
}
