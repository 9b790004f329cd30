//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod schedule;

pub use entities::{
    Button, EventPayload, FormattingSpan, InboundEvent, InboundMessage, PostBody, PostSpec,
    ScheduledJob, SpanKind,
};
pub use errors::DomainError;
pub use schedule::{ScheduleSpec, TimeOfDay, next_fire_instant, parse_time_of_day, parse_weekdays};
