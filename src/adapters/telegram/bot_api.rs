//! Telegram Bot API gateway over HTTPS.
//!
//! Implements `MessagingGateway` with plain `reqwest` calls against
//! `api.telegram.org`. Every response is the standard `{ok, result,
//! description}` envelope; failures map to `DomainError::Gateway`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::telegram::mapper::{
    self, WireEntity, WireReplyMarkup, WireUpdate,
};
use crate::domain::{Button, DomainError, FormattingSpan, InboundEvent};
use crate::ports::{ChoiceOption, MessagingGateway};

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessagePayload<'a> {
    chat_id: serde_json::Value,
    text: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entities: Vec<WireEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<WireReplyMarkup>,
}

#[derive(Serialize)]
struct SendPhotoPayload<'a> {
    chat_id: serde_json::Value,
    photo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    caption_entities: Vec<WireEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<WireReplyMarkup>,
}

#[derive(Serialize)]
struct GetUpdatesPayload {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Serialize)]
struct AnswerCallbackPayload<'a> {
    callback_query_id: &'a str,
}

/// Bot API gateway. One instance per bot token.
pub struct BotApiGateway {
    client: reqwest::Client,
    base_url: String,
    poll_timeout_secs: u64,
    /// Next getUpdates offset (last confirmed update_id + 1).
    offset: tokio::sync::Mutex<i64>,
}

impl BotApiGateway {
    pub fn new(token: &str, poll_timeout_secs: u64) -> Self {
        // The HTTP timeout must outlast the long-poll hold.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", token),
            poll_timeout_secs,
            offset: tokio::sync::Mutex::new(0),
        }
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        method: &str,
        payload: &impl Serialize,
    ) -> Result<T, DomainError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(payload)
            .send()
            .await
            .map_err(|e| DomainError::Gateway(format!("{}: {}", method, e)))?;

        let status = response.status();
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| DomainError::Gateway(format!("{}: bad response: {}", method, e)))?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {}", status));
            warn!(method, %status, description, "Bot API call failed");
            return Err(DomainError::Gateway(format!("{}: {}", method, description)));
        }
        envelope
            .result
            .ok_or_else(|| DomainError::Gateway(format!("{}: empty result", method)))
    }
}

/// The Bot API accepts a numeric chat id or an "@handle" string; user input
/// is kept verbatim but numeric targets go out as numbers.
fn chat_id_value(target: &str) -> serde_json::Value {
    match target.parse::<i64>() {
        Ok(id) => serde_json::Value::from(id),
        Err(_) => serde_json::Value::from(target),
    }
}

#[async_trait::async_trait]
impl MessagingGateway for BotApiGateway {
    async fn next_events(&self) -> Result<Vec<InboundEvent>, DomainError> {
        let mut offset = self.offset.lock().await;
        let updates: Vec<WireUpdate> = self
            .call(
                "getUpdates",
                &GetUpdatesPayload {
                    offset: *offset,
                    timeout: self.poll_timeout_secs,
                    allowed_updates: &["message", "callback_query"],
                },
            )
            .await?;

        if let Some(max_id) = updates.iter().map(|u| u.update_id).max() {
            *offset = max_id + 1;
        }
        debug!(count = updates.len(), "received updates");
        Ok(updates.into_iter().filter_map(mapper::update_to_event).collect())
    }

    async fn send_text(
        &self,
        target: &str,
        text: &str,
        spans: &[FormattingSpan],
        buttons: &[Vec<Button>],
    ) -> Result<(), DomainError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessagePayload {
                    chat_id: chat_id_value(target),
                    text,
                    entities: mapper::spans_to_entities(spans),
                    reply_markup: mapper::buttons_to_markup(buttons),
                },
            )
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        target: &str,
        photo_ref: &str,
        caption: Option<&str>,
        spans: &[FormattingSpan],
        buttons: &[Vec<Button>],
    ) -> Result<(), DomainError> {
        let _: serde_json::Value = self
            .call(
                "sendPhoto",
                &SendPhotoPayload {
                    chat_id: chat_id_value(target),
                    photo: photo_ref,
                    caption,
                    caption_entities: mapper::spans_to_entities(spans),
                    reply_markup: mapper::buttons_to_markup(buttons),
                },
            )
            .await?;
        Ok(())
    }

    async fn present_choice(
        &self,
        target: &str,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), DomainError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessagePayload {
                    chat_id: chat_id_value(target),
                    text: prompt,
                    entities: Vec::new(),
                    reply_markup: Some(mapper::choice_markup(options)),
                },
            )
            .await?;
        Ok(())
    }

    async fn ack_selection(&self, callback_id: &str) -> Result<(), DomainError> {
        // answerCallbackQuery returns plain `true`.
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackPayload {
                    callback_query_id: callback_id,
                },
            )
            .await?;
        Ok(())
    }
}
