//! HTTP layer: one exchange per call, deadline, status classification.
//!
//! This is the ONLY place that interprets status codes. client/mod.rs only
//! sees a JSON payload or an [`AportError`].

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AportError, AportResult};

use super::helpers::{attach_server_timing, join_url, parse_failure_body, parse_success_body};

pub(crate) const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub(crate) const SERVER_TIMING: &str = "server-timing";

/// HTTP backend (holds reqwest client, base URL, credentials, deadline).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) timeout: Duration,
}

impl HttpBackend {
    pub(crate) fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// GET `path` and return the JSON payload.
    pub(crate) async fn get(&self, path: &str) -> AportResult<Value> {
        self.execute::<()>(Method::GET, path, None, None).await
    }

    /// POST `body` to `path` and return the JSON payload.
    pub(crate) async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> AportResult<Value> {
        self.execute(Method::POST, path, Some(body), idempotency_key)
            .await
    }

    /// Run one exchange under the deadline.
    ///
    /// Dropping the losing branch of the race drops the in-flight request,
    /// which releases its connection.
    pub(crate) async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> AportResult<Value> {
        let url = self.url(path);
        debug!(
            method = %method,
            url = %url,
            idempotent = idempotency_key.is_some(),
            "sending request"
        );

        let exchange = self.exchange(method.clone(), &url, body, idempotency_key);
        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AportError::timeout()),
        };

        if let Err(e) = &result {
            warn!(
                method = %method,
                url = %url,
                status = e.status,
                code = e.code().unwrap_or("-"),
                "request failed"
            );
        }
        result
    }

    async fn exchange<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> AportResult<Value> {
        let mut request = self.client.request(method, url);

        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY, key);
        }
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                AportError::invalid_request(format!("failed to serialize request body: {}", e))
            })?;
            request = request.body(bytes);
        }

        let response = request.send().await?;
        let status = response.status();
        let server_timing = response
            .headers()
            .get(SERVER_TIMING)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let text = response.text().await?;

        if !status.is_success() {
            let (reasons, decision_id) = parse_failure_body(&text);
            return Err(AportError::new(status.as_u16(), reasons)
                .with_decision_id(decision_id)
                .with_server_timing(server_timing)
                .with_raw_response(Some(text)));
        }

        let mut payload = parse_success_body(&text).map_err(|e| {
            AportError::invalid_response(
                format!("response body is not JSON: {}", e),
                Some(text.clone()),
            )
            .with_server_timing(server_timing.clone())
        })?;
        attach_server_timing(&mut payload, server_timing.as_deref());

        Ok(payload)
    }
}
