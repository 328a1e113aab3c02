//! In-app delivery: appends an item to the application's notification feed.

use async_trait::async_trait;
use serde_json::json;

use herald_common::error::SendError;
use herald_common::types::{ChannelKind, RenderedNotification};
use herald_engine::traits::ChannelTransport;

use crate::{classify_status, classify_transport_error};

pub struct InAppTransport {
    feed_url: String,
    http: reqwest::Client,
}

impl InAppTransport {
    pub fn new(feed_url: String) -> Self {
        Self {
            feed_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelTransport for InAppTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn send(
        &self,
        recipient: &str,
        notification: &RenderedNotification,
    ) -> Result<(), SendError> {
        let payload = json!({
            "recipient": recipient,
            "title": notification.title,
            "body": notification.body,
            "link": notification.link,
            "read": false,
        });

        let response = self
            .http
            .post(&self.feed_url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(recipient, status = %status, body = %body, "Feed endpoint refused notification");
            return Err(classify_status(status, &body));
        }

        tracing::debug!(recipient, "In-app notification stored");
        Ok(())
    }
}
