//! Verification client for APort agent passports and policy decisions.
//!
//! Given an agent and a named policy, asks the verification API whether the
//! agent may perform an action and returns the signed decision:
//!
//! - Three evaluation modes: registry-resolved passport, caller-supplied
//!   passport, caller-supplied policy pack
//! - Idempotency keys (header and body)
//! - Per-exchange deadline with typed failures
//! - Decision tokens, validated remotely or locally against a cached key set
//!
//! # Quick Start
//!
//! ```no_run
//! use aport_client::{AportClient, Attachments, ClientConfig, VerificationContext};
//!
//! # async fn example() -> Result<(), aport_client::AportError> {
//! let client = AportClient::new(ClientConfig::default().with_api_key("ak_live_..."))?;
//!
//! let context = VerificationContext::new()
//!     .with("amount", 500)
//!     .with("currency", "USD");
//!
//! let decision = client
//!     .verify_policy("ap_1", "finance.payment.refund.v1", context, Some("refund-42"), Attachments::none())
//!     .await?;
//!
//! if !decision.allow {
//!     println!("denied: {:?}", decision.reasons);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Failures
//!
//! A decision with `allow == false` is a successful evaluation. Anything that
//! prevents obtaining a decision (bad input, server error, network problem,
//! timeout) is an [`AportError`] carrying `status` and reason codes. The
//! client never retries.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `AGENT_PASSPORT_BASE_URL` | API base URL (default: `https://api.aport.io`) |
//! | `AGENT_PASSPORT_API_KEY` | API key (bearer token) |
//! | `AGENT_PASSPORT_TIMEOUT_MS` | Per-request deadline in milliseconds (default: 800) |

pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod jwks;
pub mod policies;
pub mod request;
mod token;
pub mod types;

// Re-export main types
pub use client::{AportClient, Attachments, CLIENT_USER_AGENT};
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::{codes, AportError, AportResult};
pub use gate::GateOutcome;
pub use jwks::{Jwk, KeySet};
pub use policies::PolicyVerifier;
pub use request::{
    Identity, PolicyTarget, VerificationRequest, VerifyEnvelope, IN_BODY_POLICY_ID,
};
pub use types::{
    AssuranceLevel, Decision, PassportData, PassportView, PolicyPack, Reason, ResponseMeta,
    Severity, VerificationContext,
};
