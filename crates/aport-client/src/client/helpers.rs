//! Pure helpers: URL joining, response body handling (no HTTP, no status logic).

use serde_json::{Map, Value};

use crate::types::Reason;

/// Strip trailing slashes from the configured base URL.
pub(crate) fn normalize_base_url(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

/// Join a normalized base and a path with exactly one slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Parse a 2xx body; an empty body is an empty object.
pub(crate) fn parse_success_body(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(text)
}

/// Attach `Server-Timing` as `_meta.serverTiming`, leaving every other field intact.
pub(crate) fn attach_server_timing(payload: &mut Value, server_timing: Option<&str>) {
    let (Some(timing), Value::Object(map)) = (server_timing, payload) else {
        return;
    };

    let meta = map
        .entry("_meta")
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Value::Object(meta) = meta {
        meta.insert("serverTiming".to_string(), Value::String(timing.to_string()));
    }
}

/// Best-effort parse of a non-2xx body into `(reasons, decision_id)`.
pub(crate) fn parse_failure_body(text: &str) -> (Vec<Reason>, Option<String>) {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return (Vec::new(), None);
    };

    let reasons = json
        .get("reasons")
        .cloned()
        .map(Reason::list_from_value)
        .unwrap_or_default();

    let decision_id = json
        .get("decision_id")
        .and_then(|v| v.as_str())
        .map(String::from);

    (reasons, decision_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slashes() {
        let a = normalize_base_url("https://api.aport.io/");
        let b = normalize_base_url("https://api.aport.io");
        assert_eq!(join_url(&a, "/jwks.json"), join_url(&b, "/jwks.json"));
        assert_eq!(join_url(&a, "/jwks.json"), "https://api.aport.io/jwks.json");
        assert_eq!(
            join_url(&normalize_base_url("https://api.aport.io///"), "jwks.json"),
            "https://api.aport.io/jwks.json"
        );
    }

    #[test]
    fn test_base_url_with_prefix() {
        let base = normalize_base_url("https://gw.example.com/aport/");
        assert_eq!(
            join_url(&base, "/api/verify/policy/p"),
            "https://gw.example.com/aport/api/verify/policy/p"
        );
    }

    #[test]
    fn test_empty_success_body() {
        assert_eq!(parse_success_body("").unwrap(), json!({}));
        assert!(parse_success_body("<html>").is_err());
    }

    #[test]
    fn test_attach_server_timing() {
        let mut payload = json!({"decision_id": "d", "allow": true});
        attach_server_timing(&mut payload, Some("total;dur=12"));
        assert_eq!(
            payload,
            json!({"decision_id": "d", "allow": true, "_meta": {"serverTiming": "total;dur=12"}})
        );

        let mut untouched = json!({"a": 1});
        attach_server_timing(&mut untouched, None);
        assert_eq!(untouched, json!({"a": 1}));
    }

    #[test]
    fn test_attach_server_timing_keeps_existing_meta() {
        let mut payload = json!({"_meta": {"region": "eu"}});
        attach_server_timing(&mut payload, Some("db;dur=1"));
        assert_eq!(payload["_meta"]["region"], "eu");
        assert_eq!(payload["_meta"]["serverTiming"], "db;dur=1");
    }

    #[test]
    fn test_parse_failure_body() {
        let (reasons, decision_id) = parse_failure_body(
            r#"{"reasons":[{"code":"INSUFFICIENT_CAPABILITIES","message":"m","severity":"error"}],"decision_id":"dec_2"}"#,
        );
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].code, "INSUFFICIENT_CAPABILITIES");
        assert_eq!(decision_id.as_deref(), Some("dec_2"));

        let (reasons, _) = parse_failure_body(
            r#"{"reasons":[{"code":"A","message":"first","severity":"error"},{"message":"no code"}]}"#,
        );
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[1].message, "no code");

        let (reasons, decision_id) = parse_failure_body("Bad Gateway");
        assert!(reasons.is_empty());
        assert!(decision_id.is_none());
    }
}
