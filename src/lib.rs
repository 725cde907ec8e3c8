//! replyflow — auto-reply rule engine with a human-approval workflow.

pub mod api;
pub mod approval;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod draft;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod rules;
