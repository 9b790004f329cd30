//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use uuid::Uuid;

use crate::domain::{Button, DomainError, FormattingSpan, InboundEvent, ScheduledJob};

/// One option of an interactive choice. `token` comes back verbatim as the
/// selection event when the user picks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub label: String,
    pub token: String,
}

/// Messaging transport gateway. Receives updates; sends text/photo messages
/// with formatting entities and inline link buttons.
///
/// `target` is a numeric chat/channel id or an @handle, passed verbatim.
#[async_trait::async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Long-poll the transport for the next batch of inbound events.
    /// Blocks up to the transport's poll timeout; may return an empty batch.
    async fn next_events(&self) -> Result<Vec<InboundEvent>, DomainError>;

    async fn send_text(
        &self,
        target: &str,
        text: &str,
        spans: &[FormattingSpan],
        buttons: &[Vec<Button>],
    ) -> Result<(), DomainError>;

    async fn send_photo(
        &self,
        target: &str,
        photo_ref: &str,
        caption: Option<&str>,
        spans: &[FormattingSpan],
        buttons: &[Vec<Button>],
    ) -> Result<(), DomainError>;

    /// Present explicit choices (inline callback buttons). The selection
    /// arrives later as an `EventPayload::Selection` through `next_events`.
    async fn present_choice(
        &self,
        target: &str,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), DomainError>;

    /// Acknowledge a received selection so the transport stops showing a
    /// pending state on the pressed button.
    async fn ack_selection(&self, callback_id: &str) -> Result<(), DomainError>;
}

/// Durable job registry. `create` must not return success before the job is
/// crash-durable; a registered job must never be lost short of `delete`.
#[async_trait::async_trait]
pub trait JobStorePort: Send + Sync {
    async fn create(&self, job: &ScheduledJob) -> Result<(), DomainError>;

    /// Every persisted job, used once at process start to repopulate the
    /// scheduler.
    async fn load_all(&self) -> Result<Vec<ScheduledJob>, DomainError>;

    /// Idempotent: deleting an absent id is not an error.
    async fn delete(&self, id: Uuid) -> Result<(), DomainError>;
}
