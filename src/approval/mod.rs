//! Human-approval workflow — one pending decision per generated draft.

pub mod manager;
pub mod model;

pub use manager::{spawn_expiry_task, TaskManager};
pub use model::{ApprovalOutcome, ApprovalTask, DeliveryWarning, EmailSnapshot, TaskEvent, TaskStatus};
