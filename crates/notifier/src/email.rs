//! Email delivery via the Resend HTTP API.

use async_trait::async_trait;
use serde_json::json;

use herald_common::error::SendError;
use herald_common::types::{ChannelKind, RenderedNotification};
use herald_engine::traits::ChannelTransport;

use crate::{classify_status, classify_transport_error};

pub struct EmailTransport {
    api_url: String,
    api_key: String,
    from_address: String,
    http: reqwest::Client,
}

impl EmailTransport {
    pub fn new(api_url: String, api_key: String, from_address: String) -> Self {
        Self {
            api_url,
            api_key,
            from_address,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(
        &self,
        recipient: &str,
        notification: &RenderedNotification,
    ) -> Result<(), SendError> {
        let payload = json!({
            "from": self.from_address,
            "to": [recipient],
            "subject": notification.title,
            "text": format!("{}\n\n{}", notification.body, notification.link),
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(recipient, status = %status, body = %body, "Email gateway refused send");
            return Err(classify_status(status, &body));
        }

        tracing::debug!(recipient, "Email accepted by gateway");
        Ok(())
    }
}
