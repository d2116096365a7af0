//! Verification key set and its freshness-bounded cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AportError, AportResult};

/// A JSON Web Key as published at `/jwks.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`, `OKP`).
    pub kty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Curve name for EC / OKP keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,
}

impl Jwk {
    /// Build a decoding key from the key's public components.
    ///
    /// Returns `None` for key types this client cannot verify with.
    pub fn decoding_key(&self) -> Option<DecodingKey> {
        let key = match self.kty.as_str() {
            "RSA" => DecodingKey::from_rsa_components(self.n.as_deref()?, self.e.as_deref()?),
            "EC" => DecodingKey::from_ec_components(self.x.as_deref()?, self.y.as_deref()?),
            "OKP" if self.crv.as_deref().unwrap_or("Ed25519") == "Ed25519" => {
                DecodingKey::from_ed_components(self.x.as_deref()?)
            }
            _ => return None,
        };

        match key {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(kid = ?self.kid, error = %e, "failed to decode key");
                None
            }
        }
    }
}

/// Body of `/jwks.json`; `keys` is mandatory.
#[derive(Debug, Deserialize)]
pub(crate) struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Verification keys plus the time they were fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
    pub fetched_at: DateTime<Utc>,
}

impl KeySet {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self {
            keys,
            fetched_at: Utc::now(),
        }
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug)]
struct CachedKeySet {
    keys: Arc<KeySet>,
    expires_at: Instant,
}

/// Process-wide key set cache owned by one client instance.
///
/// The lock is held across the refetch, so concurrent callers see either the
/// previous set or the new one in full, and a stampede triggers one fetch.
#[derive(Debug)]
pub(crate) struct KeySetCache {
    ttl: Duration,
    slot: Mutex<Option<CachedKeySet>>,
}

impl KeySetCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached set while fresh, otherwise refetch with `fetch`.
    ///
    /// A failed fetch yields `JWKS_FETCH_FAILED` and leaves the slot as it was;
    /// an expired entry is never served.
    pub(crate) async fn get_or_fetch<F, Fut>(&self, fetch: F) -> AportResult<Arc<KeySet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AportResult<KeySet>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                debug!("key set cache hit");
                return Ok(cached.keys.clone());
            }
            debug!("key set cache expired");
        }

        let keys = match fetch().await {
            Ok(keys) => Arc::new(keys),
            Err(e) => {
                warn!(status = e.status, error = %e, "key set fetch failed");
                return Err(AportError::jwks_fetch_failed()
                    .with_server_timing(e.server_timing)
                    .with_raw_response(e.raw_response));
            }
        };

        info!(keys = keys.keys.len(), ttl_secs = self.ttl.as_secs(), "key set refreshed");
        *slot = Some(CachedKeySet {
            keys: keys.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(keys)
    }

    /// Drop the cached set; the next call refetches.
    pub(crate) async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
