//! Dispatch: turn a stored `PostSpec` back into a live send.
//!
//! The same path renders the dialogue preview and the fire-time delivery,
//! so the preview is byte-for-byte what will later be posted. A failed
//! delivery is logged and swallowed; the job stays scheduled.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{DomainError, PostBody, PostSpec, ScheduledJob};
use crate::ports::MessagingGateway;

pub struct DispatchService {
    gateway: Arc<dyn MessagingGateway>,
}

impl DispatchService {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { gateway }
    }

    /// Send a post to `target`, reconstructing formatting entities and the
    /// button keyboard from the normalized form.
    pub async fn send_post(&self, target: &str, post: &PostSpec) -> Result<(), DomainError> {
        match &post.body {
            PostBody::Photo { photo_ref, caption } => {
                self.gateway
                    .send_photo(target, photo_ref, caption.as_deref(), &post.spans, &post.buttons)
                    .await
            }
            PostBody::Text { text } => {
                self.gateway
                    .send_text(target, text, &post.spans, &post.buttons)
                    .await
            }
        }
    }

    /// Fire-time delivery. Never propagates gateway errors: the scheduler
    /// loop must not crash and the job must not be deregistered.
    pub async fn deliver(&self, job: &ScheduledJob) {
        match self.send_post(&job.channel_target, &job.post).await {
            Ok(()) => {
                info!(job_id = %job.id, channel = %job.channel_target, "post delivered");
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    channel = %job.channel_target,
                    error = %e,
                    "delivery failed; job stays scheduled for its next occurrence"
                );
            }
        }
    }
}
