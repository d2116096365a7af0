//! Decision client: one operation per evaluation mode.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{AportError, AportResult};
use crate::jwks::{JwksResponse, KeySet, KeySetCache};
use crate::request::{
    passport_view_path, token_path, Identity, TokenRequest, VerificationRequest, JWKS_PATH,
    TOKEN_VALIDATE_PATH,
};
use crate::token::{verify_decision_token, TokenRules};
use crate::types::{Decision, PassportData, PassportView, PolicyPack, VerificationContext};

mod helpers;
mod http;

use helpers::normalize_base_url;
use http::HttpBackend;

/// Client identifier sent with every request.
pub const CLIENT_USER_AGENT: &str = concat!("aport-sdk-rust/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Verification client.
///
/// Cheap to clone; clones share the HTTP connection pool and the key set cache.
/// Every operation is a future: dropping it aborts the in-flight exchange.
#[derive(Debug, Clone)]
pub struct AportClient {
    http: HttpBackend,
    jwks: Arc<KeySetCache>,
    token_rules: TokenRules,
    remote_token_fallback: bool,
}

impl AportClient {
    pub fn new(config: ClientConfig) -> AportResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| {
                AportError::invalid_request(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http: HttpBackend {
                client,
                base_url: normalize_base_url(&config.base_url),
                api_key: config.api_key.clone().filter(|k| !k.is_empty()),
                timeout: config.timeout(),
            },
            jwks: Arc::new(KeySetCache::new(config.jwks_ttl())),
            token_rules: TokenRules {
                leeway: config.token_leeway(),
                issuer: config.token_issuer.clone(),
            },
            remote_token_fallback: config.remote_token_fallback,
        })
    }

    pub fn from_env() -> AportResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// Verify `policy_id` for `agent_id` (cloud mode: the server resolves the passport).
    ///
    /// Attaching `passport` and/or `policy` in `attachments` switches those parts of
    /// the evaluation to caller-supplied data; a policy pack routes to `IN_BODY`.
    pub async fn verify_policy(
        &self,
        agent_id: &str,
        policy_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
        attachments: Attachments,
    ) -> AportResult<Decision> {
        let mut request = VerificationRequest::new(context)
            .with_agent_id(agent_id)
            .with_policy_id(policy_id)
            .with_idempotency_key(idempotency_key);
        if let Some(passport) = attachments.passport {
            request = request.with_passport(passport);
        }
        if let Some(policy) = attachments.policy {
            request = request.with_policy(policy);
        }

        self.send_verification(&request).await
    }

    /// Verify `policy_id` using a caller-supplied passport (local mode, no registry fetch).
    pub async fn verify_with_passport(
        &self,
        passport: PassportData,
        policy_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        let request = VerificationRequest::new(context)
            .with_passport(passport)
            .with_policy_id(policy_id)
            .with_idempotency_key(idempotency_key);

        self.send_verification(&request).await
    }

    /// Verify against a policy pack supplied in the body.
    ///
    /// The agent is identified either by id (cloud) or by a full passport (local).
    pub async fn verify_with_policy_in_body(
        &self,
        identity: impl Into<Identity>,
        policy: PolicyPack,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        let request = VerificationRequest::new(context)
            .with_identity(identity.into())
            .with_policy_id(policy.id.clone())
            .with_policy(policy)
            .with_idempotency_key(idempotency_key);

        self.send_verification(&request).await
    }

    /// Send an already assembled request.
    pub async fn send_verification(&self, request: &VerificationRequest) -> AportResult<Decision> {
        let target = request.target()?;
        let envelope = request.envelope();
        debug!(path = %target.path(), "verifying policy");

        let payload = self
            .http
            .post(&target.path(), &envelope, request.idempotency_key())
            .await?;
        Decision::from_payload(payload)
    }

    /// Request a short-lived signed decision token instead of an inline decision.
    pub async fn get_decision_token(
        &self,
        agent_id: &str,
        policy_id: &str,
        context: &VerificationContext,
    ) -> AportResult<String> {
        let body = TokenRequest { agent_id, context };
        let payload = self.http.post(&token_path(policy_id), &body, None).await?;

        serde_json::from_value::<TokenResponse>(payload.clone())
            .map(|r| r.token)
            .map_err(|e| {
                AportError::invalid_response(
                    format!("failed to parse token response: {}", e),
                    Some(payload.to_string()),
                )
            })
    }

    /// Validate a decision token on the server (debugging / audit).
    pub async fn validate_decision_token(&self, token: &str) -> AportResult<Decision> {
        let payload = self
            .http
            .post(TOKEN_VALIDATE_PATH, &json!({ "token": token }), None)
            .await?;
        Decision::from_payload(payload)
    }

    /// Validate a decision token locally against the cached key set.
    ///
    /// Performs a network exchange only when the key set must be (re)fetched.
    /// If the key set cannot be obtained the result is `INVALID_TOKEN`, unless
    /// remote fallback is configured.
    pub async fn validate_decision_token_local(&self, token: &str) -> AportResult<Decision> {
        let keys = match self.get_jwks().await {
            Ok(keys) => keys,
            Err(e) if self.remote_token_fallback => {
                warn!(error = %e, "key set unavailable, validating token remotely");
                return self.validate_decision_token(token).await;
            }
            Err(e) => {
                return Err(AportError::invalid_token("Token validation failed")
                    .with_server_timing(e.server_timing))
            }
        };

        let claims = verify_decision_token(token, &keys, &self.token_rules)?;
        Decision::from_payload(claims).map_err(|e| {
            AportError::invalid_token(format!("token does not carry a decision: {}", e.message()))
        })
    }

    /// Fetch the display-safe passport summary (non-authoritative).
    pub async fn get_passport_view(&self, agent_id: &str) -> AportResult<PassportView> {
        let payload = self.http.get(&passport_view_path(agent_id)).await?;

        serde_json::from_value(payload.clone()).map_err(|e| {
            AportError::invalid_response(
                format!("failed to parse passport view: {}", e),
                Some(payload.to_string()),
            )
        })
    }

    /// Return the key set, refetching when the cache is empty or stale.
    pub async fn get_jwks(&self) -> AportResult<Arc<KeySet>> {
        let http = &self.http;
        self.jwks
            .get_or_fetch(move || async move {
                let payload = http.get(JWKS_PATH).await?;
                let response: JwksResponse =
                    serde_json::from_value(payload.clone()).map_err(|e| {
                        AportError::invalid_response(
                            format!("failed to parse key set: {}", e),
                            Some(payload.to_string()),
                        )
                    })?;
                if response.keys.is_empty() {
                    return Err(AportError::invalid_response(
                        "key set has no keys",
                        Some(payload.to_string()),
                    ));
                }
                Ok(KeySet::new(response.keys))
            })
            .await
    }

    /// Drop the cached key set (e.g. after a key rotation notice).
    pub async fn clear_jwks_cache(&self) {
        self.jwks.invalidate().await;
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.api_key.is_some()
    }
}

/// Optional caller-supplied data for [`AportClient::verify_policy`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    pub passport: Option<PassportData>,
    pub policy: Option<PolicyPack>,
}

impl Attachments {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_passport(mut self, passport: PassportData) -> Self {
        self.passport = Some(passport);
        self
    }

    pub fn with_policy(mut self, policy: PolicyPack) -> Self {
        self.policy = Some(policy);
        self
    }
}
