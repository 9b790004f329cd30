//! Dialogue engine: the multi-turn conversation that assembles a recurring
//! post, one validated piece per turn.
//!
//! State is a tagged stage carrying exactly the fields valid at that stage;
//! transitions are a pure function `(Stage, event) -> (next stage, effects)`
//! and the engine executes the effects. Sessions are keyed by chat id; one
//! turn per conversation is in flight at a time, and `/cancel` discards the
//! draft from any stage with no side effects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    DomainError, InboundMessage, PostSpec, ScheduleSpec, ScheduledJob, parse_time_of_day,
    parse_weekdays,
};
use crate::ports::{ChoiceOption, JobStorePort, MessagingGateway};
use crate::usecases::capture::{capture_post, parse_buttons};
use crate::usecases::dispatcher::DispatchService;
use crate::usecases::scheduler::SchedulerHandle;

/// Callback tokens for the confirmation choice.
pub const CONFIRM_TOKEN: &str = "confirm_recurring";
pub const CANCEL_TOKEN: &str = "cancel_recurring";

const PROMPT_CONTENT: &str = "Harika! Tekrarlanacak bir gönderi ayarlayalım.\n\n\
    Lütfen zamanlamak istediğiniz gönderiyi (fotoğraf, metin ve premium emoji içerebilir) gönderin.";
const PROMPT_BUTTONS: &str = "✅ Gönderi kaydedildi.\n\n\
    Şimdi gönderiye buton eklemek için her satıra bir sıra yazın, butonları virgülle ayırın:\n\
    Etiket - https://ornek.com, Diğer - https://ornek.org\n\n\
    Buton istemiyorsanız /skip yazın.";
const PROMPT_CHANNEL: &str = "✅ Butonlar ayarlandı.\n\n\
    Şimdi bu gönderinin yayınlanacağı kanalın ID'sini veya @kullaniciadini girin:";
const PROMPT_CHANNEL_SKIPPED: &str = "Butonlar atlandı.\n\n\
    Şimdi bu gönderinin yayınlanacağı kanalın ID'sini veya @kullaniciadini girin:";
const PROMPT_WEEKDAYS: &str = "✅ Kanal ayarlandı.\n\n\
    Bu gönderi haftanın hangi günleri yayınlansın?\n(Örnek: Pazartesi, Çarşamba, Cuma)";
const PROMPT_TIME: &str =
    "✅ Günler ayarlandı.\n\nPeki saat kaçta yayınlansın?\n(Format: SS:DD, Örn: 09:30)";
const PREVIEW_BANNER: &str = "--- GÖNDERİ ÖNİZLEMESİ ---";

const MSG_UNSUPPORTED: &str = "Lütfen metin veya fotoğraf içeren bir gönderi gönderin.";
const MSG_NO_VALID_BUTTONS: &str = "Geçerli buton bulunamadı. Her satıra 'Etiket - URL' \
    biçiminde yazın veya /skip ile bu adımı atlayın.";
const MSG_INVALID_DAYS: &str = "Geçersiz gün ismi. Lütfen tekrar deneyin (Örn: Salı, Perşembe).";
const MSG_INVALID_TIME: &str = "Zaman formatı yanlış. Lütfen SS:DD formatında girin.";
const MSG_CANCELLED: &str = "İşlem iptal edildi.";
const MSG_COMMITTED: &str = "✅ Harika! Gönderiniz başarıyla zamanlandı.";
const MSG_COMMIT_FAILED: &str = "Zamanlama başarısız oldu. Gönderi kaydedilemedi, lütfen tekrar deneyin.";

/// A fully assembled draft awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDraft {
    pub post: PostSpec,
    pub channel: String,
    pub schedule: ScheduleSpec,
}

/// Per-conversation dialogue state. Each variant carries only the fields
/// collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    AwaitingContent,
    AwaitingButtons { post: PostSpec },
    AwaitingChannel { post: PostSpec },
    AwaitingWeekdays { post: PostSpec, channel: String },
    AwaitingTime { post: PostSpec, channel: String, weekdays: Vec<u8> },
    AwaitingConfirmation { draft: JobDraft },
}

/// One user turn, already normalized by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueEvent {
    /// `/schedule`
    Begin,
    /// `/cancel`
    Cancel,
    /// `/skip` (button step only)
    SkipButtons,
    Message(InboundMessage),
    /// Inline-choice selection token.
    Selection(String),
}

/// Side effects a transition asks the engine to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    Reply(String),
    /// Render the draft through the dispatcher so the preview is exactly
    /// what a fire-time delivery would send.
    Preview(PostSpec),
    Choice { prompt: String, options: Vec<ChoiceOption> },
    Commit(JobDraft),
}

/// Pure transition. `Begin` and `Cancel` are handled by the engine before
/// this is reached. Returning `None` ends the dialogue.
fn step(stage: Stage, event: DialogueEvent) -> (Option<Stage>, Vec<Effect>) {
    match (stage, event) {
        (Stage::AwaitingContent, DialogueEvent::Message(msg)) => match capture_post(&msg) {
            Ok(post) => (
                Some(Stage::AwaitingButtons { post }),
                vec![Effect::Reply(PROMPT_BUTTONS.to_string())],
            ),
            Err(_) => (
                Some(Stage::AwaitingContent),
                vec![Effect::Reply(MSG_UNSUPPORTED.to_string())],
            ),
        },

        (Stage::AwaitingButtons { post }, DialogueEvent::SkipButtons) => (
            Some(Stage::AwaitingChannel { post }),
            vec![Effect::Reply(PROMPT_CHANNEL_SKIPPED.to_string())],
        ),
        (Stage::AwaitingButtons { mut post }, DialogueEvent::Message(msg)) => {
            match parse_buttons(msg.text.as_deref().unwrap_or_default()) {
                Ok(rows) => {
                    post.buttons = rows;
                    (
                        Some(Stage::AwaitingChannel { post }),
                        vec![Effect::Reply(PROMPT_CHANNEL.to_string())],
                    )
                }
                Err(_) => (
                    Some(Stage::AwaitingButtons { post }),
                    vec![Effect::Reply(MSG_NO_VALID_BUTTONS.to_string())],
                ),
            }
        }

        (Stage::AwaitingChannel { post }, DialogueEvent::Message(msg)) => {
            let channel = msg.text.as_deref().unwrap_or_default().trim().to_string();
            if channel.is_empty() {
                (
                    Some(Stage::AwaitingChannel { post }),
                    vec![Effect::Reply(PROMPT_CHANNEL.to_string())],
                )
            } else {
                (
                    Some(Stage::AwaitingWeekdays { post, channel }),
                    vec![Effect::Reply(PROMPT_WEEKDAYS.to_string())],
                )
            }
        }

        (Stage::AwaitingWeekdays { post, channel }, DialogueEvent::Message(msg)) => {
            match parse_weekdays(msg.text.as_deref().unwrap_or_default()) {
                Ok(weekdays) => (
                    Some(Stage::AwaitingTime { post, channel, weekdays }),
                    vec![Effect::Reply(PROMPT_TIME.to_string())],
                ),
                Err(_) => (
                    Some(Stage::AwaitingWeekdays { post, channel }),
                    vec![Effect::Reply(MSG_INVALID_DAYS.to_string())],
                ),
            }
        }

        (Stage::AwaitingTime { post, channel, weekdays }, DialogueEvent::Message(msg)) => {
            match parse_time_of_day(msg.text.as_deref().unwrap_or_default()) {
                Ok(time) => {
                    let draft = JobDraft {
                        post,
                        channel,
                        schedule: ScheduleSpec { weekdays, time },
                    };
                    let effects = vec![
                        Effect::Reply(PREVIEW_BANNER.to_string()),
                        Effect::Preview(draft.post.clone()),
                        Effect::Choice {
                            prompt: confirmation_summary(&draft),
                            options: vec![
                                ChoiceOption {
                                    label: "✅ Onayla ve Zamanla".to_string(),
                                    token: CONFIRM_TOKEN.to_string(),
                                },
                                ChoiceOption {
                                    label: "❌ İptal Et".to_string(),
                                    token: CANCEL_TOKEN.to_string(),
                                },
                            ],
                        },
                    ];
                    (Some(Stage::AwaitingConfirmation { draft }), effects)
                }
                Err(_) => (
                    Some(Stage::AwaitingTime { post, channel, weekdays }),
                    vec![Effect::Reply(MSG_INVALID_TIME.to_string())],
                ),
            }
        }

        (Stage::AwaitingConfirmation { draft }, DialogueEvent::Selection(token)) => {
            match token.as_str() {
                CONFIRM_TOKEN => (None, vec![Effect::Commit(draft)]),
                CANCEL_TOKEN => (None, vec![Effect::Reply(MSG_CANCELLED.to_string())]),
                _ => (Some(Stage::AwaitingConfirmation { draft }), vec![]),
            }
        }

        // Anything else (stray /skip, selections outside confirmation,
        // messages while confirming) leaves the stage untouched.
        (stage, _) => (Some(stage), vec![]),
    }
}

fn confirmation_summary(draft: &JobDraft) -> String {
    format!(
        "Yukarıdaki gönderi, {} kanalına her {} günü saat {}'da (Türkiye saati ile) \
         paylaşılmak üzere ayarlanacak.\n\nOnaylıyor musunuz?",
        draft.channel,
        draft.schedule.weekday_names(),
        draft.schedule.time
    )
}

/// Drives one dialogue per chat. Safe for concurrent conversations; the
/// session map is the only shared state and is never held across I/O.
pub struct DialogueEngine {
    gateway: Arc<dyn MessagingGateway>,
    store: Arc<dyn JobStorePort>,
    scheduler: SchedulerHandle,
    dispatcher: Arc<DispatchService>,
    sessions: Mutex<HashMap<i64, Stage>>,
}

impl DialogueEngine {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        store: Arc<dyn JobStorePort>,
        scheduler: SchedulerHandle,
        dispatcher: Arc<DispatchService>,
    ) -> Self {
        Self {
            gateway,
            store,
            scheduler,
            dispatcher,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Process one user turn as a single request/response transaction.
    pub async fn handle_event(&self, chat_id: i64, event: DialogueEvent) -> Result<(), DomainError> {
        match event {
            DialogueEvent::Begin => {
                self.sessions
                    .lock()
                    .await
                    .insert(chat_id, Stage::AwaitingContent);
                self.reply(chat_id, PROMPT_CONTENT).await
            }
            DialogueEvent::Cancel => {
                if self.sessions.lock().await.remove(&chat_id).is_some() {
                    info!(chat_id, "dialogue cancelled; draft discarded");
                }
                self.reply(chat_id, MSG_CANCELLED).await
            }
            event => {
                let Some(stage) = self.sessions.lock().await.remove(&chat_id) else {
                    debug!(chat_id, "no active dialogue; ignoring turn");
                    return Ok(());
                };
                let (next, effects) = step(stage, event);
                // Re-insert before any I/O so a gateway hiccup cannot lose
                // the draft mid-dialogue.
                if let Some(next) = next {
                    self.sessions.lock().await.insert(chat_id, next);
                }
                for effect in effects {
                    self.apply(chat_id, effect).await?;
                }
                Ok(())
            }
        }
    }

    async fn apply(&self, chat_id: i64, effect: Effect) -> Result<(), DomainError> {
        match effect {
            Effect::Reply(text) => self.reply(chat_id, &text).await,
            Effect::Preview(post) => {
                self.dispatcher
                    .send_post(&chat_id.to_string(), &post)
                    .await
            }
            Effect::Choice { prompt, options } => {
                self.gateway
                    .present_choice(&chat_id.to_string(), &prompt, &options)
                    .await
            }
            Effect::Commit(draft) => self.commit(chat_id, draft).await,
        }
    }

    /// Build the job, persist it durably, then register it with the
    /// scheduler. A persistence failure is surfaced to the user and leaves
    /// nothing registered.
    async fn commit(&self, chat_id: i64, draft: JobDraft) -> Result<(), DomainError> {
        let job = ScheduledJob {
            id: Uuid::new_v4(),
            owner_chat_id: chat_id,
            channel_target: draft.channel,
            post: draft.post,
            schedule: draft.schedule,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create(&job).await {
            warn!(chat_id, error = %e, "job persistence failed; nothing scheduled");
            return self.reply(chat_id, MSG_COMMIT_FAILED).await;
        }
        if let Err(e) = self.scheduler.register(job.clone()) {
            // Durable but not armed; recovery re-arms it on next start.
            warn!(job_id = %job.id, error = %e, "scheduler registration failed");
            return self.reply(chat_id, MSG_COMMIT_FAILED).await;
        }
        info!(
            job_id = %job.id,
            channel = %job.channel_target,
            weekdays = ?job.schedule.weekdays,
            time = %job.schedule.time,
            "recurring post scheduled"
        );
        self.reply(chat_id, MSG_COMMITTED).await
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), DomainError> {
        self.gateway
            .send_text(&chat_id.to_string(), text, &[], &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Button, FormattingSpan, SpanKind};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Sent {
        target: String,
        text: Option<String>,
        photo: Option<String>,
        spans: Vec<FormattingSpan>,
        buttons: Vec<Vec<Button>>,
    }

    #[derive(Default)]
    struct MockGateway {
        sends: StdMutex<Vec<Sent>>,
        choices: StdMutex<Vec<(String, String, Vec<ChoiceOption>)>>,
    }

    #[async_trait::async_trait]
    impl MessagingGateway for MockGateway {
        async fn next_events(&self) -> Result<Vec<crate::domain::InboundEvent>, DomainError> {
            Ok(vec![])
        }

        async fn send_text(
            &self,
            target: &str,
            text: &str,
            spans: &[FormattingSpan],
            buttons: &[Vec<Button>],
        ) -> Result<(), DomainError> {
            self.sends.lock().unwrap().push(Sent {
                target: target.to_string(),
                text: Some(text.to_string()),
                photo: None,
                spans: spans.to_vec(),
                buttons: buttons.to_vec(),
            });
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
            self.sends.lock().unwrap().push(Sent {
                target: target.to_string(),
                text: caption.map(String::from),
                photo: Some(photo_ref.to_string()),
                spans: spans.to_vec(),
                buttons: buttons.to_vec(),
            });
            Ok(())
        }

        async fn present_choice(
            &self,
            target: &str,
            prompt: &str,
            options: &[ChoiceOption],
        ) -> Result<(), DomainError> {
            self.choices.lock().unwrap().push((
                target.to_string(),
                prompt.to_string(),
                options.to_vec(),
            ));
            Ok(())
        }

        async fn ack_selection(&self, _callback_id: &str) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemStore {
        jobs: StdMutex<Vec<ScheduledJob>>,
        fail_create: bool,
    }

    #[async_trait::async_trait]
    impl JobStorePort for MemStore {
        async fn create(&self, job: &ScheduledJob) -> Result<(), DomainError> {
            if self.fail_create {
                return Err(DomainError::Store("disk full".to_string()));
            }
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }

        async fn load_all(&self) -> Result<Vec<ScheduledJob>, DomainError> {
            Ok(self.jobs.lock().unwrap().clone())
        }

        async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
            self.jobs.lock().unwrap().retain(|j| j.id != id);
            Ok(())
        }
    }

    struct Harness {
        gateway: Arc<MockGateway>,
        store: Arc<MemStore>,
        engine: DialogueEngine,
        registrations: tokio::sync::mpsc::UnboundedReceiver<ScheduledJob>,
    }

    fn harness_with_store(store: MemStore) -> Harness {
        let gateway = Arc::new(MockGateway::default());
        let store = Arc::new(store);
        let (handle, registrations) = SchedulerHandle::test_pair();
        let dispatcher = Arc::new(DispatchService::new(gateway.clone()));
        let engine = DialogueEngine::new(gateway.clone(), store.clone(), handle, dispatcher);
        Harness { gateway, store, engine, registrations }
    }

    fn harness() -> Harness {
        harness_with_store(MemStore::default())
    }

    fn text_msg(chat_id: i64, text: &str) -> DialogueEvent {
        DialogueEvent::Message(InboundMessage {
            chat_id,
            text: Some(text.to_string()),
            photo_ref: None,
            spans: vec![],
        })
    }

    const CHAT: i64 = 42;

    async fn run_happy_path_until_confirmation(h: &Harness) {
        h.engine.handle_event(CHAT, DialogueEvent::Begin).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "Hello")).await.unwrap();
        h.engine.handle_event(CHAT, DialogueEvent::SkipButtons).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "@mychannel")).await.unwrap();
        h.engine
            .handle_event(CHAT, text_msg(CHAT, "Monday, Wednesday"))
            .await
            .unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "08:00")).await.unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_commit() {
        let mut h = harness();
        run_happy_path_until_confirmation(&h).await;

        // Preview was rendered against the draft before confirmation.
        let previews: Vec<_> = h
            .gateway
            .sends
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.text.as_deref() == Some("Hello"))
            .cloned()
            .collect();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].target, CHAT.to_string());

        let choices = h.gateway.choices.lock().unwrap().clone();
        assert_eq!(choices.len(), 1);
        assert!(choices[0].1.contains("@mychannel"));
        assert!(choices[0].1.contains("Pazartesi, Çarşamba"));
        assert!(choices[0].1.contains("08:00"));

        h.engine
            .handle_event(CHAT, DialogueEvent::Selection(CONFIRM_TOKEN.to_string()))
            .await
            .unwrap();

        let jobs = h.store.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.owner_chat_id, CHAT);
        assert_eq!(job.channel_target, "@mychannel");
        assert_eq!(job.schedule.weekdays, vec![0, 2]);
        assert_eq!(job.schedule.time.hour, 8);
        assert_eq!(job.schedule.time.minute, 0);
        assert_eq!(job.post.text(), Some("Hello"));

        // Registered with the scheduler exactly once, after persistence.
        let registered = h.registrations.try_recv().unwrap();
        assert_eq!(registered.id, job.id);
        assert!(h.registrations.try_recv().is_err());

        // Session is cleared: a stray follow-up turn is ignored.
        let sends_before = h.gateway.sends.lock().unwrap().len();
        h.engine.handle_event(CHAT, text_msg(CHAT, "anything")).await.unwrap();
        assert_eq!(h.gateway.sends.lock().unwrap().len(), sends_before);
    }

    #[tokio::test]
    async fn test_buttons_step_parses_grid_onto_job() {
        let mut h = harness();
        h.engine.handle_event(CHAT, DialogueEvent::Begin).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "Hello")).await.unwrap();
        h.engine
            .handle_event(
                CHAT,
                text_msg(CHAT, "A - http://x.com, B - http://y.com\nC - http://z.com"),
            )
            .await
            .unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "@chan")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "cuma")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "10:15")).await.unwrap();
        h.engine
            .handle_event(CHAT, DialogueEvent::Selection(CONFIRM_TOKEN.to_string()))
            .await
            .unwrap();

        let job = h.registrations.try_recv().unwrap();
        assert_eq!(job.post.buttons.len(), 2);
        assert_eq!(job.post.buttons[0].len(), 2);
        assert_eq!(job.post.buttons[1][0].label, "C");
    }

    #[tokio::test]
    async fn test_invalid_inputs_keep_their_stage() {
        let h = harness();
        h.engine.handle_event(CHAT, DialogueEvent::Begin).await.unwrap();

        // No content: stays at AwaitingContent.
        h.engine
            .handle_event(
                CHAT,
                DialogueEvent::Message(InboundMessage {
                    chat_id: CHAT,
                    text: None,
                    photo_ref: None,
                    spans: vec![],
                }),
            )
            .await
            .unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "Hello")).await.unwrap();

        // Malformed buttons: stays, then valid grid advances.
        h.engine.handle_event(CHAT, text_msg(CHAT, "no separator")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "A - http://x.com")).await.unwrap();

        h.engine.handle_event(CHAT, text_msg(CHAT, "@chan")).await.unwrap();

        // Invalid weekday: whole parse rejected, stage kept.
        h.engine.handle_event(CHAT, text_msg(CHAT, "Pazartesi, xyz")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "Pazartesi")).await.unwrap();

        // Invalid time: stage kept.
        h.engine.handle_event(CHAT, text_msg(CHAT, "9:3")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "09:30")).await.unwrap();

        assert_eq!(h.gateway.choices.lock().unwrap().len(), 1);
        let texts: Vec<String> = h
            .gateway
            .sends
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| s.text.clone())
            .collect();
        assert!(texts.iter().any(|t| t == MSG_UNSUPPORTED));
        assert!(texts.iter().any(|t| t == MSG_NO_VALID_BUTTONS));
        assert!(texts.iter().any(|t| t == MSG_INVALID_DAYS));
        assert!(texts.iter().any(|t| t == MSG_INVALID_TIME));
    }

    #[tokio::test]
    async fn test_cancel_at_every_stage_commits_nothing() {
        let stages: &[&[&str]] = &[
            &[],
            &["Hello"],
            &["Hello", "A - http://x.com"],
            &["Hello", "A - http://x.com", "@chan"],
            &["Hello", "A - http://x.com", "@chan", "Salı"],
            &["Hello", "A - http://x.com", "@chan", "Salı", "12:00"],
        ];
        for inputs in stages {
            let mut h = harness();
            h.engine.handle_event(CHAT, DialogueEvent::Begin).await.unwrap();
            for input in *inputs {
                h.engine.handle_event(CHAT, text_msg(CHAT, input)).await.unwrap();
            }
            h.engine.handle_event(CHAT, DialogueEvent::Cancel).await.unwrap();

            assert!(h.store.jobs.lock().unwrap().is_empty());
            assert!(h.registrations.try_recv().is_err());
            assert!(
                h.gateway
                    .sends
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|s| s.text.as_deref() == Some(MSG_CANCELLED))
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_selection_at_confirmation() {
        let mut h = harness();
        run_happy_path_until_confirmation(&h).await;
        h.engine
            .handle_event(CHAT, DialogueEvent::Selection(CANCEL_TOKEN.to_string()))
            .await
            .unwrap();
        assert!(h.store.jobs.lock().unwrap().is_empty());
        assert!(h.registrations.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persistence_failure_surfaces_and_registers_nothing() {
        let mut h = harness_with_store(MemStore {
            fail_create: true,
            ..Default::default()
        });
        run_happy_path_until_confirmation(&h).await;
        h.engine
            .handle_event(CHAT, DialogueEvent::Selection(CONFIRM_TOKEN.to_string()))
            .await
            .unwrap();

        assert!(h.registrations.try_recv().is_err());
        let last = h.gateway.sends.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.text.as_deref(), Some(MSG_COMMIT_FAILED));
    }

    #[tokio::test]
    async fn test_preview_matches_fire_time_delivery() {
        let mut h = harness();
        h.engine.handle_event(CHAT, DialogueEvent::Begin).await.unwrap();
        h.engine
            .handle_event(
                CHAT,
                DialogueEvent::Message(InboundMessage {
                    chat_id: CHAT,
                    text: Some("Hello world".to_string()),
                    photo_ref: None,
                    spans: vec![FormattingSpan {
                        offset: 0,
                        length: 5,
                        kind: SpanKind::Bold,
                    }],
                }),
            )
            .await
            .unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "A - http://x.com")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "@chan")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "Pazar")).await.unwrap();
        h.engine.handle_event(CHAT, text_msg(CHAT, "21:00")).await.unwrap();
        h.engine
            .handle_event(CHAT, DialogueEvent::Selection(CONFIRM_TOKEN.to_string()))
            .await
            .unwrap();

        let job = h.registrations.try_recv().unwrap();
        let preview = h
            .gateway
            .sends
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.text.as_deref() == Some("Hello world"))
            .cloned()
            .unwrap();

        // Fire-time delivery reconstructs the same text, spans and buttons.
        let dispatcher = DispatchService::new(h.gateway.clone());
        dispatcher.deliver(&job).await;
        let delivered = h.gateway.sends.lock().unwrap().last().cloned().unwrap();
        assert_eq!(delivered.target, "@chan");
        assert_eq!(delivered.text, preview.text);
        assert_eq!(delivered.spans, preview.spans);
        assert_eq!(delivered.buttons, preview.buttons);
    }
}
