//! Domain entities. Pure data structures for the core business.
//!
//! No Telegram/IO types here — these are mapped from adapters. The serde
//! shapes of `ScheduledJob` and everything nested in it are the external
//! compatibility surface of the persisted job file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::schedule::ScheduleSpec;

/// A rich-text range over the post text, in the transport's own addressing
/// (Bot API UTF-16 code units). Stored verbatim from capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingSpan {
    pub offset: i64,
    pub length: i64,
    #[serde(flatten)]
    pub kind: SpanKind,
}

/// Presentation kind of a formatting span.
///
/// Closed set of kinds the transport round-trips losslessly, plus `Other`
/// for aux-free kinds the transport may add (mention, hashtag, url, ...).
/// `TextMention` references a user identity and cannot be replayed without
/// the original user object; capture drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpanKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    CustomEmoji { custom_emoji_id: String },
    TextMention,
    Other { name: String },
}

/// One inline link button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}

/// The message payload of a post: plain text, or a photo with an optional
/// caption. At least one of the two is guaranteed by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PostBody {
    Text { text: String },
    Photo { photo_ref: String, caption: Option<String> },
}

/// A normalized, serializable post. Immutable once committed into a job.
///
/// `spans` address the body text (the caption for photos); overlap rules
/// are transport-defined and not validated here. `buttons` is an ordered
/// grid of rows, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSpec {
    #[serde(flatten)]
    pub body: PostBody,
    #[serde(default)]
    pub spans: Vec<FormattingSpan>,
    #[serde(default)]
    pub buttons: Vec<Vec<Button>>,
}

impl PostSpec {
    /// The body text the spans address (caption for photos).
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            PostBody::Text { text } => Some(text),
            PostBody::Photo { caption, .. } => caption.as_deref(),
        }
    }
}

/// The durable unit: one recurring post committed at dialogue confirmation.
/// Lives until explicitly deleted; survives process restart via the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    /// The conversation the job was created from. Bookkeeping/display only.
    pub owner_chat_id: i64,
    /// Numeric channel id or @handle, verbatim from user input.
    pub channel_target: String,
    pub post: PostSpec,
    pub schedule: ScheduleSpec,
    pub created_at: DateTime<Utc>,
}

/// Normalized inbound message from the transport, before capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: Option<String>,
    /// Opaque transport file id of the largest attached photo, if any.
    pub photo_ref: Option<String>,
    /// Entities over `text` (caption entities when a photo is present).
    pub spans: Vec<FormattingSpan>,
}

/// One inbound update, routed by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A `/command`, lowercased, arguments stripped.
    Command(String),
    Message(InboundMessage),
    /// An inline-keyboard selection. `token` is the callback data;
    /// `callback_id` must be acknowledged back to the transport.
    Selection { callback_id: String, token: String },
}
