//! Collaborator traits for the dispatch engine.
//!
//! The engine is the sole client of these interfaces; implementations live
//! outside the core (permission/preference services, channel gateways).
//! Concrete HTTP-backed transports ship in the `herald-notifier` crate.

use std::collections::BTreeSet;

use async_trait::async_trait;

use herald_common::error::{SendError, Unavailable};
use herald_common::types::{Application, ChannelKind, RenderedNotification};

/// Answers whether a user's permission group grants read access to a
/// specific application. A workspace member without application-level
/// visibility must not be notified about content they cannot see.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn has_application_access(
        &self,
        user_name: &str,
        application: &Application,
    ) -> Result<bool, Unavailable>;
}

/// Supplies the notification channels a user has enabled.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn channels_for(&self, user_name: &str) -> Result<BTreeSet<ChannelKind>, Unavailable>;
}

/// Delivers a rendered notification to one recipient on one channel.
///
/// Implementations classify failures: transient conditions (timeouts, rate
/// limits, 5xx) return [`SendError::Retryable`], permanent ones (invalid
/// address, unsubscribed) return [`SendError::Terminal`].
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// The channel this transport serves.
    fn kind(&self) -> ChannelKind;

    async fn send(
        &self,
        recipient: &str,
        notification: &RenderedNotification,
    ) -> Result<(), SendError>;
}
