// Demo agent for the loopback simulation
//
// Mints out-of-band invitation URLs against the configured endpoint and
// answers acceptances with synthetic records. No wallet is involved.

use async_trait::async_trait;
use bifold_ble_core::invitation::{invitation_url_for, oob_payload, AgentBridge, InvitationError};
use bifold_ble_core::message::InvitationRecords;
use serde_json::json;
use uuid::Uuid;

pub struct DemoAgent {
    label: String,
    endpoint: String,
}

impl DemoAgent {
    pub fn new(label: &str, endpoint: &str) -> Self {
        Self {
            label: label.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl AgentBridge for DemoAgent {
    async fn create_invitation_url(&self) -> Result<String, InvitationError> {
        let oob = Uuid::new_v4().simple().to_string();
        let url = invitation_url_for(&self.endpoint, &oob);
        tracing::debug!("{} created invitation {}", self.label, url);
        Ok(url)
    }

    async fn receive_invitation_from_url(
        &self,
        url: &str,
    ) -> Result<InvitationRecords, InvitationError> {
        let oob = oob_payload(url).ok_or_else(|| {
            InvitationError::AcceptanceFailed(format!("no oob parameter in {}", url))
        })?;
        tracing::debug!("{} accepted invitation {}", self.label, oob);

        Ok(InvitationRecords {
            out_of_band_record: json!({
                "id": oob,
                "role": "receiver",
                "state": "prepare-response",
            }),
            connection_record: json!({
                "id": Uuid::new_v4().to_string(),
                "theirLabel": self.label,
                "state": "request-sent",
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_url_is_accepted() {
        let agent = DemoAgent::new("demo", "http://localhost:3000/");
        let url = agent.create_invitation_url().await.unwrap();
        assert!(url.starts_with("http://localhost:3000?oob="));

        let records = agent.receive_invitation_from_url(&url).await.unwrap();
        assert_eq!(records.out_of_band_record["id"], oob_payload(&url).unwrap());
    }

    #[tokio::test]
    async fn test_url_without_oob_fails() {
        let agent = DemoAgent::new("demo", "http://localhost:3000");
        assert!(agent
            .receive_invitation_from_url("http://localhost:3000")
            .await
            .is_err());
    }
}
