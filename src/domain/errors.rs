//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these. The first four variants
//! are user-input validation errors: the dialogue recovers from them by
//! re-prompting the same stage, never by aborting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("message has neither text nor photo")]
    UnsupportedContent,

    #[error("no valid button rows in input")]
    NoValidButtons,

    #[error("unrecognized weekday name: {0}")]
    InvalidWeekday(String),

    #[error("time must be HH:MM with HH 00-23 and MM 00-59")]
    InvalidTimeFormat,

    #[error("messaging gateway error: {0}")]
    Gateway(String),

    #[error("job store error: {0}")]
    Store(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}
