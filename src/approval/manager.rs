//! Approval task manager — owns the task state machine.
//!
//! All check-and-transition paths run under a single write lock over the task
//! map, so concurrent approve/reject/edit/expire calls on one task serialize
//! and exactly one transition commits; the loser gets
//! `InvalidStateTransition`, never silent corruption. Delivery happens outside
//! the lock — approval is already committed by then, and a send failure is
//! surfaced as a warning on the outcome, not a rollback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::InboundEmail;
use crate::dispatch::Dispatcher;
use crate::draft::{Draft, DraftGenerator, GenerateOptions};
use crate::error::{ApprovalError, Error, GenerationError, SendError};
use crate::rules::{AutoReplyRule, RuleStore};

use super::model::{
    ApprovalOutcome, ApprovalTask, DeliveryWarning, EmailSnapshot, TaskEvent, TaskStatus,
};

/// Broadcast channel capacity for task events.
const EVENT_CAPACITY: usize = 256;

struct Inner {
    tasks: HashMap<Uuid, ApprovalTask>,
    /// Task ids with a regeneration in flight. Overlapping regenerations for
    /// one task are rejected, not queued — last-writer-wins is insufficient.
    generating: HashSet<Uuid>,
}

/// Owns every approval task and its transitions.
pub struct TaskManager {
    inner: RwLock<Inner>,
    rules: Arc<RuleStore>,
    dispatcher: Arc<dyn Dispatcher>,
    generator: Arc<DraftGenerator>,
    tx: broadcast::Sender<TaskEvent>,
}

impl TaskManager {
    pub fn new(
        rules: Arc<RuleStore>,
        dispatcher: Arc<dyn Dispatcher>,
        generator: Arc<DraftGenerator>,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            inner: RwLock::new(Inner {
                tasks: HashMap::new(),
                generating: HashSet::new(),
            }),
            rules,
            dispatcher,
            generator,
            tx,
        })
    }

    /// Subscribe to task lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Create a pending task for a generated draft.
    pub async fn create(
        &self,
        rule: &AutoReplyRule,
        email: EmailSnapshot,
        draft: Draft,
    ) -> ApprovalTask {
        let task = ApprovalTask::new(rule, email, draft);
        info!(
            task_id = %task.id,
            rule_id = rule.id,
            from = %task.original_email.from,
            expires_at = %task.expires_at,
            "Approval task created"
        );

        let mut inner = self.inner.write().await;
        inner.tasks.insert(task.id, task.clone());
        drop(inner);

        // Ok if no receivers are listening yet
        let _ = self.tx.send(TaskEvent::TaskCreated { task: task.clone() });
        task
    }

    pub async fn get(&self, id: Uuid) -> Option<ApprovalTask> {
        self.inner.read().await.tasks.get(&id).cloned()
    }

    /// All tasks, newest first.
    pub async fn list(&self) -> Vec<ApprovalTask> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<ApprovalTask> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Approve a pending task and dispatch its draft.
    ///
    /// The transition commits first; delivery is attempted exactly once
    /// afterwards and its result is recorded on the task and returned in the
    /// outcome. Delivery failure never reverts the approval.
    pub async fn approve(
        &self,
        id: Uuid,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let (draft, to, rule_id) = {
            let mut inner = self.inner.write().await;
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or(ApprovalError::TaskNotFound { id })?;

            if task.status != TaskStatus::Pending {
                return Err(ApprovalError::InvalidStateTransition {
                    id,
                    status: task.status,
                    action: "approve",
                });
            }

            task.status = TaskStatus::Approved;
            task.approved_by = Some(approved_by.to_string());
            task.updated_at = Utc::now();
            (task.draft.clone(), task.original_email.from.clone(), task.rule_id)
        };

        info!(task_id = %id, approved_by, "Task approved");
        self.rules.record_decision(rule_id, true).await;
        let _ = self.tx.send(TaskEvent::TaskUpdated {
            id,
            status: TaskStatus::Approved,
        });

        let (sent_email_id, warning) = match self.dispatcher.send(&draft, &to).await {
            Ok(receipt) => {
                info!(task_id = %id, sent_email_id = %receipt.sent_email_id, "Reply dispatched");
                (Some(receipt.sent_email_id), None)
            }
            Err(SendError::NoSmtpConfig) => {
                warn!(task_id = %id, "Approved without dispatch: no SMTP transport configured");
                (None, Some(DeliveryWarning::NoSmtpConfig))
            }
            Err(SendError::SendFailed { reason }) => {
                warn!(task_id = %id, reason, "Approved but dispatch failed");
                (None, Some(DeliveryWarning::SendFailed))
            }
        };

        let task = {
            let mut inner = self.inner.write().await;
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or(ApprovalError::TaskNotFound { id })?;
            task.sent_email_id = sent_email_id.clone();
            task.delivery_warning = warning;
            task.clone()
        };

        Ok(ApprovalOutcome {
            task,
            sent_email_id,
            warning,
        })
    }

    /// Reject a pending task. No dispatch occurs.
    pub async fn reject(
        &self,
        id: Uuid,
        rejected_by: &str,
        reason: Option<String>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let (task, rule_id) = {
            let mut inner = self.inner.write().await;
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or(ApprovalError::TaskNotFound { id })?;

            if task.status != TaskStatus::Pending {
                return Err(ApprovalError::InvalidStateTransition {
                    id,
                    status: task.status,
                    action: "reject",
                });
            }

            task.status = TaskStatus::Rejected;
            task.rejected_by = Some(rejected_by.to_string());
            task.rejection_reason = reason;
            task.updated_at = Utc::now();
            (task.clone(), task.rule_id)
        };

        info!(task_id = %id, rejected_by, "Task rejected");
        self.rules.record_decision(rule_id, false).await;
        let _ = self.tx.send(TaskEvent::TaskUpdated {
            id,
            status: TaskStatus::Rejected,
        });

        Ok(ApprovalOutcome {
            task,
            sent_email_id: None,
            warning: None,
        })
    }

    /// Manually edit a pending task's draft.
    ///
    /// The task passes through `revised` as an observable marker and
    /// immediately re-enters `pending` — an edit never bypasses approval.
    pub async fn edit(
        &self,
        id: Uuid,
        new_subject: String,
        new_body: String,
    ) -> Result<ApprovalTask, ApprovalError> {
        let task = {
            let mut inner = self.inner.write().await;
            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or(ApprovalError::TaskNotFound { id })?;

            if task.status != TaskStatus::Pending {
                return Err(ApprovalError::InvalidStateTransition {
                    id,
                    status: task.status,
                    action: "edit",
                });
            }

            task.draft.subject = new_subject;
            task.draft.body = new_body;
            task.draft.html = None;
            task.status = TaskStatus::Revised;
            task.updated_at = Utc::now();
            let _ = self.tx.send(TaskEvent::TaskUpdated {
                id,
                status: TaskStatus::Revised,
            });

            // Re-queued for a fresh approval decision.
            task.status = TaskStatus::Pending;
            task.clone()
        };

        info!(task_id = %id, "Draft edited, task re-entered pending");
        let _ = self.tx.send(TaskEvent::DraftReplaced { task: task.clone() });
        Ok(task)
    }

    /// Regenerate the draft of a pending task in place.
    ///
    /// Overwrites the single pending task's draft — a regeneration never
    /// creates a second task. A failure leaves the prior draft untouched, and
    /// a regeneration issued while another is in flight for the same task is
    /// rejected.
    ///
    /// The generation itself runs in a detached task: once the in-flight
    /// guard is taken, the work completes and releases the guard even if the
    /// caller's future is dropped (an HTTP client disconnecting mid-call).
    pub async fn regenerate(
        self: &Arc<Self>,
        id: Uuid,
        instruction: Option<String>,
    ) -> Result<ApprovalTask, Error> {
        let (email, rule_id) = {
            let mut inner = self.inner.write().await;
            let task = inner
                .tasks
                .get(&id)
                .ok_or(ApprovalError::TaskNotFound { id })?;

            if task.status != TaskStatus::Pending {
                return Err(ApprovalError::InvalidStateTransition {
                    id,
                    status: task.status,
                    action: "regenerate",
                }
                .into());
            }
            if inner.generating.contains(&id) {
                return Err(ApprovalError::GenerationInFlight { id }.into());
            }

            let email = InboundEmail {
                from: task.original_email.from.clone(),
                sender_name: None,
                subject: task.original_email.subject.clone(),
                body: task.original_email.body.clone(),
                received_at: task.created_at,
            };
            let rule_id = task.rule_id;
            inner.generating.insert(id);
            (email, rule_id)
        };

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let options = match manager.rules.get(rule_id).await {
                Some(rule) => GenerateOptions::from_rule(&rule, instruction),
                // Rule deleted since the task was created — regenerate with defaults.
                None => GenerateOptions {
                    use_knowledge_base: false,
                    tone: "professional".into(),
                    model: None,
                    prompt_template: None,
                    instruction,
                },
            };

            let result = manager.generator.generate(&email, &options).await;

            let mut inner = manager.inner.write().await;
            inner.generating.remove(&id);

            let draft = result?;

            let task = inner
                .tasks
                .get_mut(&id)
                .ok_or(ApprovalError::TaskNotFound { id })?;

            // The task may have expired or been decided while generation ran.
            if task.status != TaskStatus::Pending {
                warn!(task_id = %id, status = %task.status, "Discarding regenerated draft, task no longer pending");
                return Err(ApprovalError::InvalidStateTransition {
                    id,
                    status: task.status,
                    action: "regenerate",
                }
                .into());
            }

            task.draft = draft;
            task.updated_at = Utc::now();
            let task = task.clone();
            drop(inner);

            info!(task_id = %id, "Draft regenerated in place");
            let _ = manager.tx.send(TaskEvent::DraftReplaced { task: task.clone() });
            Ok::<ApprovalTask, Error>(task)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(GenerationError::UpstreamUnavailable {
                reason: format!("generation task failed: {e}"),
            }
            .into()),
        }
    }

    /// Expire every pending task past its deadline.
    ///
    /// Invoked by the scheduler, not by user action. Idempotent: already
    /// expired tasks are untouched, so repeated sweeps are no-ops.
    pub async fn expire_sweep(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let mut inner = self.inner.write().await;
            for task in inner.tasks.values_mut() {
                if task.status == TaskStatus::Pending && task.is_overdue(now) {
                    task.status = TaskStatus::Expired;
                    task.updated_at = now;
                    expired.push(task.id);
                    debug!(task_id = %task.id, "Task expired");
                }
            }
        }

        for id in &expired {
            let _ = self.tx.send(TaskEvent::TaskExpired { id: *id });
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue tasks");
        }
        expired.len()
    }
}

/// Spawn a background task that periodically expires overdue tasks.
pub fn spawn_expiry_task(
    manager: Arc<TaskManager>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            manager.expire_sweep().await;
        }
    })
}
