//! Telegram Bot API adapters: HTTP gateway, wire mapping, update poller.

pub mod bot_api;
pub mod mapper;
pub mod poller;

pub use bot_api::BotApiGateway;
pub use poller::UpdatePoller;
