//! Implements InputPort. Long-polling update loop and command routing.
//!
//! One bad update never kills the loop: per-event failures are logged and
//! the poll continues. Transport outages back off briefly and retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{DomainError, EventPayload, InboundEvent};
use crate::ports::{InputPort, MessagingGateway};
use crate::usecases::{DialogueEngine, DialogueEvent};

const HELP_TEXT: &str = "👋 Merhaba! Kanal Yönetim Botuna Hoş Geldiniz!\n\n\
    Tekrarlanan gönderiler (fotoğraf, emoji, buton destekli) zamanlamak için \
    /schedule komutunu kullanın.\n\n\
    İşlemi istediğiniz zaman iptal etmek için /cancel komutunu kullanabilirsiniz.";

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Long-polling adapter. Pulls events from the gateway and drives the
/// dialogue engine.
pub struct UpdatePoller {
    gateway: Arc<dyn MessagingGateway>,
    engine: Arc<DialogueEngine>,
}

impl UpdatePoller {
    pub fn new(gateway: Arc<dyn MessagingGateway>, engine: Arc<DialogueEngine>) -> Self {
        Self { gateway, engine }
    }

    async fn dispatch(&self, event: InboundEvent) -> Result<(), DomainError> {
        let chat_id = event.chat_id;
        match event.payload {
            EventPayload::Command(command) => match command.as_str() {
                "/start" => {
                    self.gateway
                        .send_text(&chat_id.to_string(), HELP_TEXT, &[], &[])
                        .await
                }
                "/schedule" => self.engine.handle_event(chat_id, DialogueEvent::Begin).await,
                "/cancel" => self.engine.handle_event(chat_id, DialogueEvent::Cancel).await,
                "/skip" => {
                    self.engine
                        .handle_event(chat_id, DialogueEvent::SkipButtons)
                        .await
                }
                other => {
                    debug!(chat_id, command = other, "unknown command ignored");
                    Ok(())
                }
            },
            EventPayload::Message(msg) => {
                self.engine
                    .handle_event(chat_id, DialogueEvent::Message(msg))
                    .await
            }
            EventPayload::Selection { callback_id, token } => {
                if let Err(e) = self.gateway.ack_selection(&callback_id).await {
                    warn!(chat_id, error = %e, "callback ack failed");
                }
                self.engine
                    .handle_event(chat_id, DialogueEvent::Selection(token))
                    .await
            }
        }
    }
}

#[async_trait::async_trait]
impl InputPort for UpdatePoller {
    async fn run(&self) -> Result<(), DomainError> {
        info!("update poller started");
        loop {
            let events = match self.gateway.next_events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "polling failed; retrying");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };
            for event in events {
                let chat_id = event.chat_id;
                if let Err(e) = self.dispatch(event).await {
                    warn!(chat_id, error = %e, "update handling failed");
                }
            }
        }
    }
}
