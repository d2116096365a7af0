//! Well-known policy ids and a convenience facade over [`AportClient::verify_policy`].

use crate::client::{AportClient, Attachments};
use crate::error::AportResult;
use crate::types::{Decision, VerificationContext};

pub const REFUND: &str = "finance.payment.refund.v1";
pub const RELEASE: &str = "code.release.publish.v1";
pub const DATA_EXPORT: &str = "data.export.create.v1";
pub const MESSAGING: &str = "messaging.message.send.v1";
pub const REPOSITORY: &str = "code.repository.merge.v1";

/// Policy-specific verification methods (cloud mode).
#[derive(Debug, Clone, Copy)]
pub struct PolicyVerifier<'a> {
    client: &'a AportClient,
}

impl<'a> PolicyVerifier<'a> {
    pub fn new(client: &'a AportClient) -> Self {
        Self { client }
    }

    async fn verify(
        &self,
        policy_id: &str,
        agent_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        self.client
            .verify_policy(agent_id, policy_id, context, idempotency_key, Attachments::none())
            .await
    }

    pub async fn verify_refund(
        &self,
        agent_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        self.verify(REFUND, agent_id, context, idempotency_key).await
    }

    pub async fn verify_release(
        &self,
        agent_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        self.verify(RELEASE, agent_id, context, idempotency_key).await
    }

    pub async fn verify_data_export(
        &self,
        agent_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        self.verify(DATA_EXPORT, agent_id, context, idempotency_key)
            .await
    }

    pub async fn verify_messaging(
        &self,
        agent_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        self.verify(MESSAGING, agent_id, context, idempotency_key)
            .await
    }

    pub async fn verify_repository(
        &self,
        agent_id: &str,
        context: VerificationContext,
        idempotency_key: Option<&str>,
    ) -> AportResult<Decision> {
        self.verify(REPOSITORY, agent_id, context, idempotency_key)
            .await
    }
}
