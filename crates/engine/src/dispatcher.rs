//! Channel dispatcher — fans one comment event out across recipients and
//! channels.
//!
//! Per (recipient, channel) triple the dispatcher:
//! 1. Checks cancellation (a deleted comment stops further attempts but
//!    never retracts delivered notifications)
//! 2. Claims the triple on the [`DeliveryLedger`] — already-delivered and
//!    in-flight triples are skipped, giving idempotent re-processing
//! 3. Attempts delivery with a per-send timeout, retrying transient
//!    failures in-process with exponential backoff up to `max_attempts`
//! 4. Records the outcome back into the ledger
//!
//! Failure on one triple never aborts its siblings; every visited triple
//! lands in the returned [`DispatchReport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use url::Url;

use herald_common::config::AppConfig;
use herald_common::error::{AppError, SendError};
use herald_common::types::{
    ChannelKind, DeliveryStatus, DispatchOutcome, DispatchReport, EventId, EventPayload,
    RenderedNotification, ResolvedRecipient,
};

use crate::ledger::{ClaimDecision, DeliveryKey, DeliveryLedger};
use crate::resolver::RecipientResolver;
use crate::traits::{ChannelTransport, PermissionOracle, PreferenceStore};

/// Tunables for one dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Timeout per permission/preference lookup.
    pub lookup_timeout: Duration,
    /// Timeout per channel send; a timeout classifies as retryable.
    pub send_timeout: Duration,
    /// How long a `pending` ledger entry shields its triple from reclaim.
    pub pending_liveness: Duration,
    /// Delay before the first in-dispatch retry.
    pub retry_base_delay: Duration,
    /// Exponential backoff multiplier.
    pub retry_multiplier: f64,
    /// Maximum send attempts per triple within one dispatch call.
    pub max_attempts: u32,
    /// Disable self-notification suppression (testing/audit).
    pub notify_self: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(3),
            send_timeout: Duration::from_secs(10),
            pending_liveness: Duration::from_secs(60),
            retry_base_delay: Duration::from_millis(500),
            retry_multiplier: 2.0,
            max_attempts: 3,
            notify_self: false,
        }
    }
}

impl DispatchPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            pending_liveness: Duration::from_secs(config.pending_liveness_secs),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            retry_multiplier: config.retry_multiplier,
            max_attempts: config.retry_max_attempts.max(1),
            notify_self: config.notify_self,
        }
    }

    /// Backoff delay after the given attempt number (1-indexed):
    /// `base_delay * multiplier^(attempt - 1)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_base_delay.as_secs_f64();
        let delay = base * self.retry_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay)
    }
}

/// Entry point of the dispatch pipeline.
pub struct ChannelDispatcher {
    resolver: RecipientResolver,
    ledger: Arc<dyn DeliveryLedger>,
    permissions: Arc<dyn PermissionOracle>,
    preferences: Arc<dyn PreferenceStore>,
    transports: HashMap<ChannelKind, Arc<dyn ChannelTransport>>,
    policy: DispatchPolicy,
}

impl ChannelDispatcher {
    pub fn new(
        ledger: Arc<dyn DeliveryLedger>,
        permissions: Arc<dyn PermissionOracle>,
        preferences: Arc<dyn PreferenceStore>,
        transports: Vec<Arc<dyn ChannelTransport>>,
        policy: DispatchPolicy,
    ) -> Self {
        let resolver = RecipientResolver::new(policy.notify_self, policy.lookup_timeout);
        Self {
            resolver,
            ledger,
            permissions,
            preferences,
            transports: transports.into_iter().map(|t| (t.kind(), t)).collect(),
            policy,
        }
    }

    /// Dispatch one event without external cancellation.
    pub async fn dispatch(&self, payload: &EventPayload) -> Result<DispatchReport, AppError> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.dispatch_with_cancel(payload, cancel_rx).await
    }

    /// Dispatch one event; flipping the watch sender to `true` cancels
    /// triples not yet attempted. Already-delivered outcomes are never
    /// rolled back.
    ///
    /// Resolution failure aborts the whole event before any ledger write,
    /// so the caller may retry wholesale.
    pub async fn dispatch_with_cancel(
        &self,
        payload: &EventPayload,
        cancel: watch::Receiver<bool>,
    ) -> Result<DispatchReport, AppError> {
        let event_id = payload.identity();
        let recipients = self
            .resolver
            .resolve(payload, self.permissions.as_ref(), self.preferences.as_ref())
            .await?;
        let notification = Self::render_notification(payload);

        tracing::info!(
            event_id = %event_id,
            author = payload.author_user_name(),
            page = payload.page_name(),
            recipients = recipients.len(),
            "Dispatching comment event"
        );

        let mut report = DispatchReport::new(event_id.clone());
        for recipient in &recipients {
            for channel in &recipient.channels {
                let outcome = self
                    .dispatch_triple(&event_id, recipient, *channel, &notification, &cancel)
                    .await?;
                report.push(&recipient.user_name, *channel, outcome);
            }
        }

        tracing::info!(
            event_id = %event_id,
            triples = report.entries.len(),
            delivered = report.delivered_count(),
            "Dispatch complete"
        );
        Ok(report)
    }

    /// Drive one (recipient, channel) triple to a report outcome.
    async fn dispatch_triple(
        &self,
        event_id: &EventId,
        recipient: &ResolvedRecipient,
        channel: ChannelKind,
        notification: &RenderedNotification,
        cancel: &watch::Receiver<bool>,
    ) -> Result<DispatchOutcome, AppError> {
        let user = recipient.user_name.as_str();

        let Some(transport) = self.transports.get(&channel) else {
            tracing::warn!(channel = %channel, "No transport registered for channel");
            return Ok(DispatchOutcome::FailedTerminal {
                detail: format!("no transport registered for channel {channel}"),
            });
        };

        let key = DeliveryKey::new(event_id.clone(), user, channel);
        let mut attempt = 1u32;

        loop {
            if *cancel.borrow() {
                tracing::info!(event_id = %event_id, user, channel = %channel, "Dispatch cancelled");
                return Ok(DispatchOutcome::Cancelled);
            }

            match self
                .ledger
                .record_attempt(&key, self.policy.pending_liveness)
                .await?
            {
                ClaimDecision::AlreadyDelivered => return Ok(DispatchOutcome::AlreadyDelivered),
                ClaimDecision::InFlight => return Ok(DispatchOutcome::InFlight),
                ClaimDecision::Terminal => {
                    let detail = self
                        .ledger
                        .lookup(&key)
                        .await?
                        .and_then(|record| record.detail)
                        .unwrap_or_else(|| "previous terminal failure".to_string());
                    return Ok(DispatchOutcome::FailedTerminal { detail });
                }
                ClaimDecision::Claimed => {}
            }

            match self.attempt_send(transport.as_ref(), user, notification).await {
                Ok(()) => {
                    self.ledger
                        .record_outcome(&key, DeliveryStatus::Delivered, None)
                        .await?;
                    tracing::info!(
                        event_id = %event_id,
                        user,
                        channel = %channel,
                        attempt,
                        "Notification delivered"
                    );
                    return Ok(DispatchOutcome::Delivered);
                }
                Err(SendError::Terminal(detail)) => {
                    self.ledger
                        .record_outcome(&key, DeliveryStatus::FailedTerminal, Some(detail.clone()))
                        .await?;
                    tracing::warn!(
                        event_id = %event_id,
                        user,
                        channel = %channel,
                        %detail,
                        "Terminal delivery failure"
                    );
                    return Ok(DispatchOutcome::FailedTerminal { detail });
                }
                Err(SendError::Retryable(detail)) => {
                    self.ledger
                        .record_outcome(
                            &key,
                            DeliveryStatus::FailedRetryable,
                            Some(detail.clone()),
                        )
                        .await?;
                    if attempt >= self.policy.max_attempts || *cancel.borrow() {
                        tracing::warn!(
                            event_id = %event_id,
                            user,
                            channel = %channel,
                            attempt,
                            %detail,
                            "Retryable delivery failure, giving up for this dispatch"
                        );
                        return Ok(DispatchOutcome::FailedRetryable { detail });
                    }

                    let delay = self.policy.backoff_delay(attempt);
                    tracing::debug!(
                        event_id = %event_id,
                        user,
                        channel = %channel,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One transport send, bounded by the per-send timeout.
    async fn attempt_send(
        &self,
        transport: &dyn ChannelTransport,
        recipient: &str,
        notification: &RenderedNotification,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(
            self.policy.send_timeout,
            transport.send(recipient, notification),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SendError::Retryable(format!(
                "send timed out after {:?}",
                self.policy.send_timeout
            ))),
        }
    }

    /// Render the user-facing notification. Identical for every recipient of
    /// an event, so it is built once per dispatch.
    pub fn render_notification(payload: &EventPayload) -> RenderedNotification {
        RenderedNotification {
            title: format!("New comment on {}", payload.page_name()),
            body: format!(
                "{} commented on {} in {}",
                payload.author_user_name(),
                payload.page_name(),
                payload.application().name
            ),
            link: Self::render_link(payload),
        }
    }

    /// Absolute link to the commented-on page, with each path segment
    /// percent-encoded (page names may contain spaces and the like).
    fn render_link(payload: &EventPayload) -> String {
        match Url::parse(payload.origin_header()) {
            Ok(mut url) => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.pop_if_empty().extend([
                        "applications",
                        payload.application().slug.as_str(),
                        "pages",
                        payload.page_name(),
                    ]);
                }
                String::from(url)
            }
            // Origin syntax was validated at payload construction.
            Err(_) => format!(
                "{}/applications/{}/pages/{}",
                payload.origin_header().trim_end_matches('/'),
                payload.application().slug,
                payload.page_name()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use herald_common::error::Unavailable;
    use herald_common::types::{Application, Workspace, WorkspaceMember};

    use crate::ledger::MemoryLedger;

    fn make_payload(author: &str, members: &[&str]) -> EventPayload {
        EventPayload::new(
            author,
            Workspace {
                id: Uuid::nil(),
                name: "Acme Inc".to_string(),
            },
            members
                .iter()
                .map(|user| WorkspaceMember {
                    user_name: user.to_string(),
                    permission_group: "developer".to_string(),
                })
                .collect(),
            Application {
                id: Uuid::nil(),
                name: "Order Tracker".to_string(),
                slug: "order-tracker".to_string(),
            },
            "https://app.example.com",
            "Orders",
        )
        .unwrap()
    }

    /// Grants access to everyone except the listed users.
    struct StubOracle {
        denied: BTreeSet<String>,
    }

    #[async_trait]
    impl PermissionOracle for StubOracle {
        async fn has_application_access(
            &self,
            user_name: &str,
            _application: &Application,
        ) -> Result<bool, Unavailable> {
            Ok(!self.denied.contains(user_name))
        }
    }

    struct DownOracle;

    #[async_trait]
    impl PermissionOracle for DownOracle {
        async fn has_application_access(
            &self,
            _user_name: &str,
            _application: &Application,
        ) -> Result<bool, Unavailable> {
            Err(Unavailable("permission service unreachable".to_string()))
        }
    }

    /// Same channel set for every user.
    struct StubPreferences {
        channels: BTreeSet<ChannelKind>,
    }

    impl StubPreferences {
        fn with(channels: &[ChannelKind]) -> Self {
            Self {
                channels: channels.iter().copied().collect(),
            }
        }
    }

    #[async_trait]
    impl PreferenceStore for StubPreferences {
        async fn channels_for(
            &self,
            _user_name: &str,
        ) -> Result<BTreeSet<ChannelKind>, Unavailable> {
            Ok(self.channels.clone())
        }
    }

    /// Records every send; failures can be scripted per call, after which
    /// sends succeed. Optionally sleeps to hold a triple in flight.
    struct RecordingTransport {
        kind: ChannelKind,
        sends: Mutex<Vec<String>>,
        script: Mutex<VecDeque<Result<(), SendError>>>,
        delay: Option<Duration>,
    }

    impl RecordingTransport {
        fn ok(kind: ChannelKind) -> Arc<Self> {
            Self::scripted(kind, vec![])
        }

        fn scripted(kind: ChannelKind, script: Vec<Result<(), SendError>>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                sends: Mutex::new(Vec::new()),
                script: Mutex::new(script.into()),
                delay: None,
            })
        }

        fn slow(kind: ChannelKind, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                kind,
                sends: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
                delay: Some(delay),
            })
        }

        fn send_count(&self) -> usize {
            self.sends.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChannelTransport for RecordingTransport {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(
            &self,
            recipient: &str,
            _notification: &RenderedNotification,
        ) -> Result<(), SendError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.sends.lock().unwrap().push(recipient.to_string());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn fast_policy() -> DispatchPolicy {
        DispatchPolicy {
            retry_base_delay: Duration::from_millis(10),
            ..DispatchPolicy::default()
        }
    }

    fn make_dispatcher(
        ledger: Arc<MemoryLedger>,
        transports: Vec<Arc<RecordingTransport>>,
        policy: DispatchPolicy,
    ) -> ChannelDispatcher {
        make_dispatcher_denying(ledger, transports, policy, &[])
    }

    fn make_dispatcher_denying(
        ledger: Arc<MemoryLedger>,
        transports: Vec<Arc<RecordingTransport>>,
        policy: DispatchPolicy,
        denied: &[&str],
    ) -> ChannelDispatcher {
        ChannelDispatcher::new(
            ledger,
            Arc::new(StubOracle {
                denied: denied.iter().map(|u| u.to_string()).collect(),
            }),
            Arc::new(StubPreferences::with(&[
                ChannelKind::Email,
                ChannelKind::InApp,
            ])),
            transports
                .into_iter()
                .map(|t| t as Arc<dyn ChannelTransport>)
                .collect(),
            policy,
        )
    }

    #[tokio::test]
    async fn test_fan_out_worked_example() {
        // Workspace [alice(author), bob, carol]; bob lacks application
        // access; carol gets email + in-app.
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::ok(ChannelKind::Email);
        let in_app = RecordingTransport::ok(ChannelKind::InApp);
        let dispatcher = make_dispatcher_denying(
            Arc::clone(&ledger),
            vec![Arc::clone(&email), Arc::clone(&in_app)],
            fast_policy(),
            &["bob"],
        );

        let payload = make_payload("alice", &["alice", "bob", "carol"]);
        let report = dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(
            report.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::Delivered)
        );
        assert_eq!(
            report.outcome_for("carol", ChannelKind::InApp),
            Some(&DispatchOutcome::Delivered)
        );
        assert!(report.outcome_for("alice", ChannelKind::Email).is_none());
        assert!(report.outcome_for("bob", ChannelKind::Email).is_none());
        assert_eq!(email.send_count(), 1);
        assert_eq!(in_app.send_count(), 1);
    }

    #[tokio::test]
    async fn test_redispatch_is_idempotent() {
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::ok(ChannelKind::Email);
        let in_app = RecordingTransport::ok(ChannelKind::InApp);
        let dispatcher = make_dispatcher(
            Arc::clone(&ledger),
            vec![Arc::clone(&email), Arc::clone(&in_app)],
            fast_policy(),
        );

        let payload = make_payload("alice", &["alice", "carol"]);
        let first = dispatcher.dispatch(&payload).await.unwrap();
        assert_eq!(first.delivered_count(), 2);

        // Replaying the same logical event must not produce new sends.
        let second = dispatcher.dispatch(&payload).await.unwrap();
        assert_eq!(second.delivered_count(), 0);
        assert_eq!(
            second.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::AlreadyDelivered)
        );
        assert_eq!(
            second.outcome_for("carol", ChannelKind::InApp),
            Some(&DispatchOutcome::AlreadyDelivered)
        );
        assert_eq!(email.send_count(), 1);
        assert_eq!(in_app.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_failure_is_isolated() {
        let ledger = Arc::new(MemoryLedger::new());
        // Email keeps failing transiently; in-app succeeds.
        let email = RecordingTransport::scripted(
            ChannelKind::Email,
            vec![
                Err(SendError::Retryable("rate limited".to_string())),
                Err(SendError::Retryable("rate limited".to_string())),
                Err(SendError::Retryable("rate limited".to_string())),
            ],
        );
        let in_app = RecordingTransport::ok(ChannelKind::InApp);
        let dispatcher = make_dispatcher(
            Arc::clone(&ledger),
            vec![Arc::clone(&email), Arc::clone(&in_app)],
            fast_policy(),
        );

        let payload = make_payload("alice", &["alice", "carol"]);
        let report = dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(
            report.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::FailedRetryable {
                detail: "rate limited".to_string()
            })
        );
        assert_eq!(
            report.outcome_for("carol", ChannelKind::InApp),
            Some(&DispatchOutcome::Delivered)
        );
        // max_attempts bounds the in-dispatch retries.
        assert_eq!(email.send_count(), 3);
        assert_eq!(in_app.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_recovers_within_dispatch() {
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::scripted(
            ChannelKind::Email,
            vec![Err(SendError::Retryable("gateway hiccup".to_string()))],
        );
        let dispatcher =
            make_dispatcher(Arc::clone(&ledger), vec![Arc::clone(&email)], fast_policy());

        let payload = make_payload("alice", &["alice", "carol"]);
        let report = dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(
            report.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::Delivered)
        );
        assert_eq!(email.send_count(), 2);

        let key = DeliveryKey::new(payload.identity(), "carol", ChannelKind::Email);
        let record = ledger.lookup(&key).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_never_retried() {
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::scripted(
            ChannelKind::Email,
            vec![Err(SendError::Terminal("recipient unsubscribed".to_string()))],
        );
        let dispatcher =
            make_dispatcher(Arc::clone(&ledger), vec![Arc::clone(&email)], fast_policy());

        let payload = make_payload("alice", &["alice", "carol"]);
        let report = dispatcher.dispatch(&payload).await.unwrap();
        assert_eq!(
            report.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::FailedTerminal {
                detail: "recipient unsubscribed".to_string()
            })
        );
        assert_eq!(email.send_count(), 1);

        // The terminal record shields the triple on replay too.
        let replay = dispatcher.dispatch(&payload).await.unwrap();
        assert_eq!(
            replay.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::FailedTerminal {
                detail: "recipient unsubscribed".to_string()
            })
        );
        assert_eq!(email.send_count(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_leaves_ledger_untouched() {
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::ok(ChannelKind::Email);
        let dispatcher = ChannelDispatcher::new(
            Arc::clone(&ledger) as Arc<dyn DeliveryLedger>,
            Arc::new(DownOracle),
            Arc::new(StubPreferences::with(&[ChannelKind::Email])),
            vec![Arc::clone(&email) as Arc<dyn ChannelTransport>],
            fast_policy(),
        );

        let payload = make_payload("alice", &["alice", "carol"]);
        let result = dispatcher.dispatch(&payload).await;

        assert!(matches!(result, Err(AppError::ResolutionUnavailable(_))));
        assert_eq!(ledger.tracked_count(), 0);
        assert_eq!(email.send_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_dispatch_sends_once_per_triple() {
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::slow(ChannelKind::Email, Duration::from_millis(50));
        let dispatcher =
            make_dispatcher(Arc::clone(&ledger), vec![Arc::clone(&email)], fast_policy());

        let payload = make_payload("alice", &["alice", "carol"]);
        let (first, second) =
            tokio::join!(dispatcher.dispatch(&payload), dispatcher.dispatch(&payload));
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(email.send_count(), 1, "exactly one send per triple");
        let outcomes = [
            first.outcome_for("carol", ChannelKind::Email).unwrap(),
            second.outcome_for("carol", ChannelKind::Email).unwrap(),
        ];
        assert!(outcomes.contains(&&DispatchOutcome::Delivered));
        assert!(outcomes.contains(&&DispatchOutcome::InFlight));
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_attempts_nothing() {
        let ledger = Arc::new(MemoryLedger::new());
        let email = RecordingTransport::ok(ChannelKind::Email);
        let in_app = RecordingTransport::ok(ChannelKind::InApp);
        let dispatcher = make_dispatcher(
            Arc::clone(&ledger),
            vec![Arc::clone(&email), Arc::clone(&in_app)],
            fast_policy(),
        );

        let (cancel_tx, cancel_rx) = watch::channel(true);
        let payload = make_payload("alice", &["alice", "carol"]);
        let report = dispatcher
            .dispatch_with_cancel(&payload, cancel_rx)
            .await
            .unwrap();
        drop(cancel_tx);

        assert_eq!(report.entries.len(), 2);
        for entry in &report.entries {
            assert_eq!(entry.outcome, DispatchOutcome::Cancelled);
        }
        assert_eq!(email.send_count(), 0);
        assert_eq!(in_app.send_count(), 0);
        assert_eq!(ledger.tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_transport_is_terminal_without_ledger_writes() {
        let ledger = Arc::new(MemoryLedger::new());
        // Only email is wired up; preferences also grant in-app.
        let email = RecordingTransport::ok(ChannelKind::Email);
        let dispatcher =
            make_dispatcher(Arc::clone(&ledger), vec![Arc::clone(&email)], fast_policy());

        let payload = make_payload("alice", &["alice", "carol"]);
        let report = dispatcher.dispatch(&payload).await.unwrap();

        assert_eq!(
            report.outcome_for("carol", ChannelKind::Email),
            Some(&DispatchOutcome::Delivered)
        );
        assert!(matches!(
            report.outcome_for("carol", ChannelKind::InApp),
            Some(DispatchOutcome::FailedTerminal { .. })
        ));
        // Only the email triple reached the ledger.
        assert_eq!(ledger.tracked_count(), 1);
    }

    #[test]
    fn test_render_notification() {
        let payload = make_payload("alice", &["alice", "carol"]);
        let notification = ChannelDispatcher::render_notification(&payload);

        assert_eq!(notification.title, "New comment on Orders");
        assert_eq!(
            notification.body,
            "alice commented on Orders in Order Tracker"
        );
        assert_eq!(
            notification.link,
            "https://app.example.com/applications/order-tracker/pages/Orders"
        );
    }

    #[test]
    fn test_render_link_encodes_page_name() {
        let payload = EventPayload::new(
            "alice",
            Workspace {
                id: Uuid::nil(),
                name: "Acme Inc".to_string(),
            },
            vec![],
            Application {
                id: Uuid::nil(),
                name: "Order Tracker".to_string(),
                slug: "order-tracker".to_string(),
            },
            "https://app.example.com",
            "Q3 Orders",
        )
        .unwrap();

        let notification = ChannelDispatcher::render_notification(&payload);
        assert_eq!(
            notification.link,
            "https://app.example.com/applications/order-tracker/pages/Q3%20Orders"
        );
    }

    #[test]
    fn test_policy_from_config() {
        let config = AppConfig {
            database_url: "postgres://localhost/herald".to_string(),
            db_max_connections: 20,
            lookup_timeout_ms: 1500,
            send_timeout_ms: 8000,
            pending_liveness_secs: 45,
            retry_base_delay_ms: 250,
            retry_multiplier: 3.0,
            retry_max_attempts: 0,
            notify_self: true,
            email_api_url: None,
            email_api_key: None,
            email_from: None,
            push_gateway_url: None,
            in_app_feed_url: None,
        };

        let policy = DispatchPolicy::from_config(&config);
        assert_eq!(policy.lookup_timeout, Duration::from_millis(1500));
        assert_eq!(policy.send_timeout, Duration::from_secs(8));
        assert_eq!(policy.pending_liveness, Duration::from_secs(45));
        assert_eq!(policy.retry_base_delay, Duration::from_millis(250));
        assert_eq!(policy.retry_multiplier, 3.0);
        // At least one attempt always happens.
        assert_eq!(policy.max_attempts, 1);
        assert!(policy.notify_self);
    }
}
