//! Recipient resolver — computes the notification targets for one event.
//!
//! For each incoming payload:
//! 1. Walk the membership snapshot in order
//! 2. Suppress the comment author (unless `notify_self` is enabled)
//! 3. Drop members whose permission group lacks read access to the application
//! 4. Deduplicate by user name, preserving first-seen order
//! 5. Attach each remaining user's enabled channel set
//!
//! An unreachable collaborator fails the whole resolution with
//! `ResolutionUnavailable` rather than silently omitting recipients —
//! under-notification is worse than delayed notification.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use herald_common::error::{AppError, Unavailable};
use herald_common::types::{EventPayload, ResolvedRecipient};

use crate::traits::{PermissionOracle, PreferenceStore};

/// Resolves an event payload into an ordered, deduplicated recipient list.
pub struct RecipientResolver {
    /// When set, the author is notified of their own comment (testing/audit).
    notify_self: bool,
    /// Per-lookup timeout; a timed-out collaborator counts as unavailable.
    lookup_timeout: Duration,
}

impl RecipientResolver {
    pub fn new(notify_self: bool, lookup_timeout: Duration) -> Self {
        Self {
            notify_self,
            lookup_timeout,
        }
    }

    /// Resolve recipients from the payload's membership snapshot.
    ///
    /// The output order is the first-seen order of `workspace_members` —
    /// stable and deterministic, required for reproducible reports and for
    /// rate-limiting logic downstream.
    pub async fn resolve(
        &self,
        payload: &EventPayload,
        permissions: &dyn PermissionOracle,
        preferences: &dyn PreferenceStore,
    ) -> Result<Vec<ResolvedRecipient>, AppError> {
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        for member in payload.workspace_members() {
            if !self.notify_self && member.user_name == payload.author_user_name() {
                tracing::debug!(user = %member.user_name, "Skipping comment author");
                continue;
            }
            if !seen.insert(member.user_name.as_str()) {
                continue;
            }

            let has_access = self
                .lookup("permission", async {
                    permissions
                        .has_application_access(&member.user_name, payload.application())
                        .await
                })
                .await?;
            if !has_access {
                tracing::debug!(
                    user = %member.user_name,
                    application = %payload.application().slug,
                    "Skipping member without application access"
                );
                continue;
            }

            let channels = self
                .lookup("preference", preferences.channels_for(&member.user_name))
                .await?;

            recipients.push(ResolvedRecipient {
                user_name: member.user_name.clone(),
                channels,
            });
        }

        tracing::debug!(
            event_id = %payload.identity(),
            recipients = recipients.len(),
            "Recipients resolved"
        );
        Ok(recipients)
    }

    /// Run one collaborator lookup under the configured timeout.
    async fn lookup<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, Unavailable>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(AppError::ResolutionUnavailable(err.0)),
            Err(_) => Err(AppError::ResolutionUnavailable(format!(
                "{what} lookup timed out after {:?}",
                self.lookup_timeout
            ))),
        }
    }
}
