//! Map Bot API wire types to domain entities and back.
//!
//! The entity ↔ span mapping is the Dispatcher's "reconstruction" step: a
//! defined, total mapping from the normalized form back to transport
//! primitives. `text_mention` is the one exception — it references a user
//! object the normalized form cannot carry, so it maps to
//! `SpanKind::TextMention` on the way in (capture drops it) and to nothing
//! on the way out.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Button, EventPayload, FormattingSpan, InboundEvent, InboundMessage, SpanKind,
};
use crate::ports::ChoiceOption;

// ─── Wire types (the Bot API subset this bot speaks) ─────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WireUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub message_id: i64,
    pub chat: WireChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<WirePhotoSize>>,
    #[serde(default)]
    pub entities: Option<Vec<WireEntity>>,
    #[serde(default)]
    pub caption_entities: Option<Vec<WireEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCallbackQuery {
    pub id: String,
    pub from: WireUser,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireUser {
    pub id: i64,
}

/// One formatting entity on the wire. `user` is carried only to recognize
/// identity-referencing entities; it is never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_emoji_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireReplyMarkup {
    pub inline_keyboard: Vec<Vec<WireInlineButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireInlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

// ─── Wire → domain ───────────────────────────────────────────────────────

pub fn entity_to_span(entity: &WireEntity) -> FormattingSpan {
    let kind = match entity.kind.as_str() {
        "bold" => SpanKind::Bold,
        "italic" => SpanKind::Italic,
        "underline" => SpanKind::Underline,
        "strikethrough" => SpanKind::Strikethrough,
        "spoiler" => SpanKind::Spoiler,
        "code" => SpanKind::Code,
        "pre" => SpanKind::Pre {
            language: entity.language.clone(),
        },
        "text_link" => SpanKind::TextLink {
            url: entity.url.clone().unwrap_or_default(),
        },
        "custom_emoji" => SpanKind::CustomEmoji {
            custom_emoji_id: entity.custom_emoji_id.clone().unwrap_or_default(),
        },
        "text_mention" => SpanKind::TextMention,
        other => SpanKind::Other {
            name: other.to_string(),
        },
    };
    FormattingSpan {
        offset: entity.offset,
        length: entity.length,
        kind,
    }
}

/// Total except for `TextMention`, which has no lossless wire form.
pub fn span_to_entity(span: &FormattingSpan) -> Option<WireEntity> {
    let mut entity = WireEntity {
        kind: String::new(),
        offset: span.offset,
        length: span.length,
        url: None,
        language: None,
        custom_emoji_id: None,
        user: None,
    };
    entity.kind = match &span.kind {
        SpanKind::Bold => "bold".to_string(),
        SpanKind::Italic => "italic".to_string(),
        SpanKind::Underline => "underline".to_string(),
        SpanKind::Strikethrough => "strikethrough".to_string(),
        SpanKind::Spoiler => "spoiler".to_string(),
        SpanKind::Code => "code".to_string(),
        SpanKind::Pre { language } => {
            entity.language = language.clone();
            "pre".to_string()
        }
        SpanKind::TextLink { url } => {
            entity.url = Some(url.clone());
            "text_link".to_string()
        }
        SpanKind::CustomEmoji { custom_emoji_id } => {
            entity.custom_emoji_id = Some(custom_emoji_id.clone());
            "custom_emoji".to_string()
        }
        SpanKind::TextMention => return None,
        SpanKind::Other { name } => name.clone(),
    };
    Some(entity)
}

pub fn spans_to_entities(spans: &[FormattingSpan]) -> Vec<WireEntity> {
    spans.iter().filter_map(span_to_entity).collect()
}

pub fn buttons_to_markup(buttons: &[Vec<Button>]) -> Option<WireReplyMarkup> {
    if buttons.is_empty() {
        return None;
    }
    Some(WireReplyMarkup {
        inline_keyboard: buttons
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| WireInlineButton {
                        text: b.label.clone(),
                        url: Some(b.url.clone()),
                        callback_data: None,
                    })
                    .collect()
            })
            .collect(),
    })
}

/// One callback button per row, matching the confirmation layout.
pub fn choice_markup(options: &[ChoiceOption]) -> WireReplyMarkup {
    WireReplyMarkup {
        inline_keyboard: options
            .iter()
            .map(|o| {
                vec![WireInlineButton {
                    text: o.label.clone(),
                    url: None,
                    callback_data: Some(o.token.clone()),
                }]
            })
            .collect(),
    }
}

/// Route one update to a domain event. Service updates this bot does not
/// handle map to None.
pub fn update_to_event(update: WireUpdate) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let chat_id = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);
        return Some(InboundEvent {
            chat_id,
            payload: EventPayload::Selection {
                callback_id: query.id,
                token: query.data.unwrap_or_default(),
            },
        });
    }
    update.message.map(message_to_event)
}

fn message_to_event(msg: WireMessage) -> InboundEvent {
    let chat_id = msg.chat.id;
    if let Some(command) = command_of(msg.text.as_deref()) {
        return InboundEvent {
            chat_id,
            payload: EventPayload::Command(command),
        };
    }

    // Largest photo size carries the file id worth storing.
    let photo_ref = msg
        .photo
        .as_ref()
        .and_then(|sizes| sizes.iter().max_by_key(|p| p.width * p.height))
        .map(|p| p.file_id.clone());

    let (text, entities) = if photo_ref.is_some() {
        (msg.caption, msg.caption_entities)
    } else {
        (msg.text, msg.entities)
    };

    InboundEvent {
        chat_id,
        payload: EventPayload::Message(InboundMessage {
            chat_id,
            text,
            photo_ref,
            spans: entities
                .unwrap_or_default()
                .iter()
                .map(entity_to_span)
                .collect(),
        }),
    }
}

/// `/command` detection: first token, `@botname` suffix stripped, lowercased.
fn command_of(text: Option<&str>) -> Option<String> {
    let text = text?.trim();
    if !text.starts_with('/') {
        return None;
    }
    let token = text.split_whitespace().next()?;
    let command = token.split('@').next().unwrap_or(token);
    Some(command.to_lowercase())
}
