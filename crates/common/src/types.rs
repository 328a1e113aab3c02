use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::error::ValidationError;

/// Notification channel kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    InApp,
    Email,
    Push,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::InApp => write!(f, "in_app"),
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Push => write!(f, "push"),
        }
    }
}

/// Delivery status of one (event, recipient, channel) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    FailedRetryable,
    FailedTerminal,
}

impl DeliveryStatus {
    /// Terminal states admit no further attempts.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::FailedTerminal
        )
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::FailedRetryable => write!(f, "failed_retryable"),
            DeliveryStatus::FailedTerminal => write!(f, "failed_terminal"),
        }
    }
}

/// A workspace in the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
}

/// An application inside a workspace. `slug` is the URL-safe identifier
/// used when building notification links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// One workspace member at event-creation time: a user and the permission
/// group they held when the comment was made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub user_name: String,
    pub permission_group: String,
}

/// Stable identity of a comment event, derived from the payload content.
///
/// Replays of the same logical event hash to the same id, so they hit the
/// same delivery-ledger keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable payload of one comment event.
///
/// Carries a denormalized snapshot of workspace membership at event-creation
/// time. Later membership changes never alter a payload already in flight;
/// recipients are resolved from this snapshot, not re-read at delivery time.
///
/// Fields are private and only readable through accessors — a constructed
/// payload cannot be modified. Construction validates every field and fails
/// with [`ValidationError`] otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPayload {
    author_user_name: String,
    workspace: Workspace,
    workspace_members: Vec<WorkspaceMember>,
    application: Application,
    origin_header: String,
    page_name: String,
}

impl EventPayload {
    /// Validated constructor.
    ///
    /// Rules:
    /// - `author_user_name` and `page_name` must be non-empty
    /// - every member's `user_name` must be non-empty and unique
    /// - `origin_header` must be a bare http(s) origin (no path/query/fragment)
    pub fn new(
        author_user_name: impl Into<String>,
        workspace: Workspace,
        workspace_members: Vec<WorkspaceMember>,
        application: Application,
        origin_header: impl Into<String>,
        page_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let author_user_name = author_user_name.into();
        let origin_header = origin_header.into();
        let page_name = page_name.into();

        if author_user_name.trim().is_empty() {
            return Err(ValidationError::MissingField("author_user_name"));
        }
        if page_name.trim().is_empty() {
            return Err(ValidationError::MissingField("page_name"));
        }

        let mut seen = HashSet::new();
        for member in &workspace_members {
            if member.user_name.trim().is_empty() {
                return Err(ValidationError::MissingField("workspace_members.user_name"));
            }
            if !seen.insert(member.user_name.as_str()) {
                return Err(ValidationError::DuplicateMember(member.user_name.clone()));
            }
        }

        validate_origin(&origin_header)?;

        Ok(Self {
            author_user_name,
            workspace,
            workspace_members,
            application,
            origin_header,
            page_name,
        })
    }

    pub fn author_user_name(&self) -> &str {
        &self.author_user_name
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_members(&self) -> &[WorkspaceMember] {
        &self.workspace_members
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn origin_header(&self) -> &str {
        &self.origin_header
    }

    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    /// Content-derived event identity.
    ///
    /// Structurally equal payloads produce equal ids, so repeated deliveries
    /// of the same logical event share ledger keys. The id is a SHA-256
    /// digest over the field contents, so it is stable across processes,
    /// builds, and toolchains — ledger rows written by one deployment stay
    /// valid for the next.
    pub fn identity(&self) -> EventId {
        let mut hasher = Sha256::new();
        hash_part(&mut hasher, &self.author_user_name);
        hasher.update(self.workspace.id.as_bytes());
        hash_part(&mut hasher, &self.workspace.name);
        for member in &self.workspace_members {
            hash_part(&mut hasher, &member.user_name);
            hash_part(&mut hasher, &member.permission_group);
        }
        hasher.update(self.application.id.as_bytes());
        hash_part(&mut hasher, &self.application.name);
        hash_part(&mut hasher, &self.application.slug);
        hash_part(&mut hasher, &self.origin_header);
        hash_part(&mut hasher, &self.page_name);

        let digest = hasher.finalize();
        EventId(format!("evt-{}", hex::encode(&digest[..8])))
    }
}

/// Length-prefixed field write; keeps adjacent fields from colliding.
fn hash_part(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_be_bytes());
    hasher.update(part.as_bytes());
}

/// Check that `origin` is a bare http(s) origin: scheme + host [+ port],
/// nothing else. Notification links are built by appending paths to it.
fn validate_origin(origin: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidOrigin(origin.to_string());

    let parsed = Url::parse(origin).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    if !parsed.has_host() || !parsed.username().is_empty() {
        return Err(invalid());
    }
    // Url normalizes a bare origin's path to "/"; anything longer was explicit.
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid());
    }
    Ok(())
}

/// A notification target produced by recipient resolution: one user plus the
/// channels applicable to them. Created per dispatch, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub user_name: String,
    pub channels: BTreeSet<ChannelKind>,
}

/// Human-readable notification ready for delivery on any channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedNotification {
    /// Short title (e.g., "New comment on Orders")
    pub title: String,
    /// Detailed body message
    pub body: String,
    /// Absolute link to the commented-on page
    pub link: String,
}

/// Outcome of one (recipient, channel) triple within a single dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Sent successfully during this dispatch.
    Delivered,
    /// Transient failure; eligible for retry on a later dispatch.
    FailedRetryable { detail: String },
    /// Permanent failure; never retried.
    FailedTerminal { detail: String },
    /// Ledger already shows this triple delivered — idempotent no-op.
    AlreadyDelivered,
    /// Another attempt owns the triple within the liveness window.
    InFlight,
    /// Dispatch was cancelled before this triple was attempted.
    Cancelled,
}

/// One entry of a [`DispatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub recipient: String,
    pub channel: ChannelKind,
    pub outcome: DispatchOutcome,
}

/// Per-triple outcomes of one `dispatch` call. Channel failures never abort
/// sibling triples; every triple the dispatcher visited appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub event_id: EventId,
    pub entries: Vec<ReportEntry>,
}

impl DispatchReport {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, recipient: &str, channel: ChannelKind, outcome: DispatchOutcome) {
        self.entries.push(ReportEntry {
            recipient: recipient.to_string(),
            channel,
            outcome,
        });
    }

    /// Outcome for a specific (recipient, channel) pair, if visited.
    pub fn outcome_for(&self, recipient: &str, channel: ChannelKind) -> Option<&DispatchOutcome> {
        self.entries
            .iter()
            .find(|e| e.recipient == recipient && e.channel == channel)
            .map(|e| &e.outcome)
    }

    /// Number of triples sent successfully during this dispatch.
    pub fn delivered_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == DispatchOutcome::Delivered)
            .count()
    }
}
