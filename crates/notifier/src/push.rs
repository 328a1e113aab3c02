//! Push delivery via a generic JSON gateway webhook.

use async_trait::async_trait;
use serde_json::json;

use herald_common::error::SendError;
use herald_common::types::{ChannelKind, RenderedNotification};
use herald_engine::traits::ChannelTransport;

use crate::{classify_status, classify_transport_error};

pub struct PushTransport {
    gateway_url: String,
    http: reqwest::Client,
}

impl PushTransport {
    pub fn new(gateway_url: String) -> Self {
        Self {
            gateway_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelTransport for PushTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn send(
        &self,
        recipient: &str,
        notification: &RenderedNotification,
    ) -> Result<(), SendError> {
        let payload = json!({
            "user": recipient,
            "title": notification.title,
            "body": notification.body,
            "url": notification.link,
        });

        let response = self
            .http
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(recipient, status = %status, body = %body, "Push gateway refused send");
            return Err(classify_status(status, &body));
        }

        tracing::debug!(recipient, "Push accepted by gateway");
        Ok(())
    }
}
