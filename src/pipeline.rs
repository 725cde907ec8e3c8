//! Reply pipeline — classify, match, generate, route.
//!
//! One inbound email flows through: classification → rule matching → draft
//! generation → either an approval task or a direct dispatch. Classifier and
//! generator failures abort the pipeline for that email and surface to the
//! caller — the email stays in the operator queue unresolved, never silently
//! dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approval::{ApprovalTask, DeliveryWarning, EmailSnapshot, TaskManager};
use crate::classify::{Classification, Classifier, InboundEmail};
use crate::dispatch::Dispatcher;
use crate::draft::{DraftGenerator, GenerateOptions};
use crate::error::{Error, SendError};
use crate::rules::RuleStore;

/// What a processed email resulted in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// No enabled rule matched — left for manual handling. Not an error.
    NoMatch { classification: Classification },
    /// A rule matched (and was counted) but has auto-generation disabled.
    MatchedNoDraft {
        rule_id: u64,
        classification: Classification,
    },
    /// A draft was generated and awaits human approval.
    TaskCreated { task: ApprovalTask },
    /// The rule allows unattended replies; the draft was dispatched directly.
    AutoSent {
        rule_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sent_email_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<DeliveryWarning>,
    },
}

/// Orchestrates the classify → match → generate → route flow.
pub struct ReplyPipeline {
    classifier: Arc<dyn Classifier>,
    rules: Arc<RuleStore>,
    generator: Arc<DraftGenerator>,
    manager: Arc<TaskManager>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl ReplyPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        rules: Arc<RuleStore>,
        generator: Arc<DraftGenerator>,
        manager: Arc<TaskManager>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            classifier,
            rules,
            generator,
            manager,
            dispatcher,
        }
    }

    /// Process one inbound email end to end.
    pub async fn process(&self, email: InboundEmail) -> Result<PipelineOutcome, Error> {
        let classification = self.classifier.classify(&email).await?;
        info!(
            from = %email.from,
            category = %classification.category,
            purchase_intent_score = classification.purchase_intent_score,
            "Inbound email classified"
        );

        let Some(rule) = self.rules.match_rule(&classification).await else {
            info!(from = %email.from, "No matching rule, left for manual handling");
            return Ok(PipelineOutcome::NoMatch { classification });
        };

        if !rule.auto_generate_reply {
            info!(rule_id = rule.id, "Rule matched but auto-generation is off");
            return Ok(PipelineOutcome::MatchedNoDraft {
                rule_id: rule.id,
                classification,
            });
        }

        let options = GenerateOptions::from_rule(&rule, None);
        let draft = self.generator.generate(&email, &options).await?;
        let snapshot = EmailSnapshot::new(&email, classification.category);

        // The classifier can demand a human look even when the rule would
        // allow an unattended reply.
        if rule.require_approval || classification.requires_human_review {
            let task = self.manager.create(&rule, snapshot, draft).await;
            return Ok(PipelineOutcome::TaskCreated { task });
        }

        let (sent_email_id, warning) = match self.dispatcher.send(&draft, &email.from).await {
            Ok(receipt) => {
                info!(rule_id = rule.id, sent_email_id = %receipt.sent_email_id, "Auto-reply dispatched");
                (Some(receipt.sent_email_id), None)
            }
            Err(SendError::NoSmtpConfig) => {
                warn!(rule_id = rule.id, "Auto-reply skipped: no SMTP transport configured");
                (None, Some(DeliveryWarning::NoSmtpConfig))
            }
            Err(SendError::SendFailed { reason }) => {
                warn!(rule_id = rule.id, reason, "Auto-reply dispatch failed");
                (None, Some(DeliveryWarning::SendFailed))
            }
        };

        Ok(PipelineOutcome::AutoSent {
            rule_id: rule.id,
            sent_email_id,
            warning,
        })
    }
}
