//! Approval task data model — statuses, outcomes, and task events.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{EmailCategory, InboundEmail};
use crate::draft::Draft;
use crate::rules::AutoReplyRule;

/// Status of an approval task.
///
/// `pending → {approved, rejected, revised, expired}`; `revised` immediately
/// re-enters `pending` after a manual edit. Approved, rejected, and expired
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for an approver's decision.
    Pending,
    /// Approved — the draft was handed to the dispatcher.
    Approved,
    /// Rejected — no dispatch occurs.
    Rejected,
    /// Draft was manually edited; observable marker before re-entering pending.
    Revised,
    /// Timed out without a decision.
    Expired,
}

impl TaskStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Revised => write!(f, "revised"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Immutable snapshot of the source email, taken at task creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSnapshot {
    pub from: String,
    pub subject: String,
    pub body: String,
    pub category: EmailCategory,
}

impl EmailSnapshot {
    pub fn new(email: &InboundEmail, category: EmailCategory) -> Self {
        Self {
            from: email.from.clone(),
            subject: email.subject.clone(),
            body: email.body.clone(),
            category,
        }
    }
}

/// Warning attached to an approval outcome when delivery did not fully
/// succeed. Approval is a business decision, delivery a mechanical follow-up;
/// the warning keeps the two visibly distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryWarning {
    NoSmtpConfig,
    SendFailed,
}

/// One pending human decision over a generated draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTask {
    pub id: Uuid,
    /// The rule that triggered generation.
    pub rule_id: u64,
    pub status: TaskStatus,
    pub original_email: EmailSnapshot,
    pub draft: Draft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Derived from the rule's `approval_timeout_hours` at creation.
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Delivery outcome metadata, recorded after approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_email_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_warning: Option<DeliveryWarning>,
}

impl ApprovalTask {
    /// Create a new pending task for a generated draft.
    pub fn new(rule: &AutoReplyRule, email: EmailSnapshot, draft: Draft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            status: TaskStatus::Pending,
            original_email: email,
            draft,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(rule.approval_timeout_hours as i64),
            approved_by: None,
            rejected_by: None,
            rejection_reason: None,
            sent_email_id: None,
            delivery_warning: None,
        }
    }

    /// Check if this task is past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of an approve/reject call, returned to the caller in full: the
/// task's new state plus the delivery result when one was attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub task: ApprovalTask,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_email_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<DeliveryWarning>,
}

/// Task lifecycle events published on the manager's broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A new task entered the queue.
    TaskCreated { task: ApprovalTask },
    /// A task's status changed.
    TaskUpdated { id: Uuid, status: TaskStatus },
    /// A task's draft was regenerated or edited in place.
    DraftReplaced { task: ApprovalTask },
    /// A task timed out.
    TaskExpired { id: Uuid },
}
