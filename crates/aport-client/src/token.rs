//! Local verification of decision tokens against a key set.

use std::time::Duration;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::error::{AportError, AportResult};
use crate::jwks::{Jwk, KeySet};

/// Options applied to every local verification.
#[derive(Debug, Clone)]
pub(crate) struct TokenRules {
    pub leeway: Duration,
    pub issuer: Option<String>,
}

/// Verify `token` against `keys` and return its claims.
///
/// Only asymmetric algorithms are accepted. `exp` is mandatory. With a `kid`
/// the key is looked up directly; without one every key of the matching family
/// is tried.
pub(crate) fn verify_decision_token(
    token: &str,
    keys: &KeySet,
    rules: &TokenRules,
) -> AportResult<Value> {
    let header = decode_header(token)
        .map_err(|e| AportError::invalid_token(format!("malformed token header: {}", e)))?;

    if !matches!(
        header.alg,
        Algorithm::RS256 | Algorithm::ES256 | Algorithm::EdDSA
    ) {
        return Err(AportError::invalid_token(format!(
            "algorithm {:?} not allowed",
            header.alg
        )));
    }

    let candidates: Vec<&Jwk> = match &header.kid {
        Some(kid) => keys.find(kid).into_iter().collect(),
        None => keys
            .keys
            .iter()
            .filter(|k| key_family(header.alg) == k.kty)
            .collect(),
    };
    if candidates.is_empty() {
        return Err(AportError::invalid_token(match &header.kid {
            Some(kid) => format!("no verification key for kid {}", kid),
            None => "no verification key for token algorithm".to_string(),
        }));
    }

    let mut validation = Validation::new(header.alg);
    validation.leeway = rules.leeway.as_secs();
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    if let Some(iss) = &rules.issuer {
        validation.set_issuer(&[iss]);
    }

    let mut last_error = None;
    for jwk in candidates {
        let Some(key) = jwk.decoding_key() else {
            continue;
        };
        match decode_with(token, &key, &validation) {
            Ok(claims) => {
                debug!(kid = ?jwk.kid, "decision token verified locally");
                return Ok(claims);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(AportError::invalid_token(match last_error {
        Some(e) => format!("token validation failed: {}", e),
        None => "no usable verification key".to_string(),
    }))
}

fn decode_with(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<Value, jsonwebtoken::errors::Error> {
    decode::<Value>(token, key, validation).map(|data| data.claims)
}

fn key_family(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::ES256 | Algorithm::ES384 => "EC",
        Algorithm::EdDSA => "OKP",
        _ => "RSA",
    }
}
