//! Application use cases. Orchestrate domain logic via ports.

pub mod capture;
pub mod dialogue;
pub mod dispatcher;
pub mod scheduler;

pub use capture::{capture_post, parse_buttons};
pub use dialogue::{DialogueEngine, DialogueEvent};
pub use dispatcher::DispatchService;
pub use scheduler::{SchedulerHandle, SchedulerService};
