//! Infrastructure adapters. Implement ports.
//!
//! Telegram Bot API, filesystem persistence. Map errors to DomainError.

pub mod persistence;
pub mod telegram;
