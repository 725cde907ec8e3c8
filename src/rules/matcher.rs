//! Rule store + matcher — selects the single winning rule per classified email.
//!
//! Matching is deterministic: among enabled rules whose category matches and
//! whose conditions hold, the highest `priority` wins; priority ties break on
//! the lowest rule id. Priority collisions are plausible in operator-authored
//! rule sets, so the tie-break is part of the contract, not an accident.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classify::Classification;
use crate::error::RuleError;
use crate::rules::model::{AutoReplyRule, RuleDraft};

struct Inner {
    rules: Vec<AutoReplyRule>,
    next_id: u64,
}

/// Owns every rule and its counters. Counter updates go through this store
/// only — the matcher bumps `triggered_count`, the approval manager reports
/// decisions — so the single-writer invariant holds.
pub struct RuleStore {
    inner: RwLock<Inner>,
}

impl RuleStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner {
                rules: Vec::new(),
                next_id: 1,
            }),
        })
    }

    /// Create a rule from an operator draft.
    pub async fn create(&self, draft: RuleDraft) -> AutoReplyRule {
        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;
        let rule = draft.into_rule(id);
        info!(rule_id = id, name = %rule.rule_name, category = %rule.email_category, "Rule created");
        inner.rules.push(rule.clone());
        rule
    }

    /// All rules, in id order.
    pub async fn list(&self) -> Vec<AutoReplyRule> {
        let inner = self.inner.read().await;
        let mut rules = inner.rules.clone();
        rules.sort_by_key(|r| r.id);
        rules
    }

    pub async fn get(&self, id: u64) -> Option<AutoReplyRule> {
        let inner = self.inner.read().await;
        inner.rules.iter().find(|r| r.id == id).cloned()
    }

    /// Replace a rule's authored fields, preserving its counters.
    pub async fn update(&self, id: u64, draft: RuleDraft) -> Result<AutoReplyRule, RuleError> {
        let mut inner = self.inner.write().await;
        let rule = inner
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RuleError::NotFound { id })?;

        let counters = rule.counters;
        *rule = draft.into_rule(id);
        rule.counters = counters;
        info!(rule_id = id, name = %rule.rule_name, "Rule updated");
        Ok(rule.clone())
    }

    pub async fn delete(&self, id: u64) -> Result<(), RuleError> {
        let mut inner = self.inner.write().await;
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id != id);
        if inner.rules.len() == before {
            return Err(RuleError::NotFound { id });
        }
        info!(rule_id = id, "Rule deleted");
        Ok(())
    }

    /// Select the winning rule for a classification and bump its
    /// `triggered_count`. Exactly one increment per matched email, regardless
    /// of what happens downstream.
    ///
    /// Returns `None` when no enabled rule matches — absence is a normal
    /// outcome (the email is left for manual handling), not an error.
    pub async fn match_rule(&self, classification: &Classification) -> Option<AutoReplyRule> {
        let mut inner = self.inner.write().await;

        let winner_id = inner
            .rules
            .iter()
            .filter(|r| {
                r.is_enabled
                    && r.email_category == classification.category
                    && r.conditions_hold(classification)
            })
            // Highest priority wins; ties break on lowest id.
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|r| r.id)?;

        let rule = inner
            .rules
            .iter_mut()
            .find(|r| r.id == winner_id)
            .expect("winner id taken from the same locked set");

        rule.counters.triggered_count += 1;
        debug!(
            rule_id = rule.id,
            name = %rule.rule_name,
            triggered = rule.counters.triggered_count,
            "Rule matched"
        );
        Some(rule.clone())
    }

    /// Record an approval decision against the triggering rule.
    /// A rule deleted since the task was created is logged and skipped.
    pub async fn record_decision(&self, rule_id: u64, approved: bool) {
        let mut inner = self.inner.write().await;
        let Some(rule) = inner.rules.iter_mut().find(|r| r.id == rule_id) else {
            warn!(rule_id, "Decision recorded for a rule that no longer exists");
            return;
        };
        if approved {
            rule.counters.approved_count += 1;
        } else {
            rule.counters.rejected_count += 1;
        }
    }
}
