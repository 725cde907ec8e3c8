//! Rule data model — predicates, counters, and the rule entity.
//!
//! Conditions are a closed predicate list (field, operator, threshold), never
//! free-form code. Every condition must hold for a rule to match (AND).

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, EmailCategory, Level};

/// Approval timeout bounds in hours.
pub const MIN_TIMEOUT_HOURS: u32 = 1;
pub const MAX_TIMEOUT_HOURS: u32 = 168;

/// How the pending draft is surfaced to the approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMethod {
    System,
    Wechat,
    Email,
}

impl Default for ApprovalMethod {
    fn default() -> Self {
        Self::System
    }
}

/// Classification field a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    PurchaseIntent,
    PurchaseIntentScore,
    OpportunityScore,
    Urgency,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Gte,
    Lte,
    Eq,
}

/// Threshold value — a numeric score or a named level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Level(Level),
    Number(u8),
}

impl ConditionValue {
    /// Numeric form for comparison: levels use their rank (0–2).
    fn as_number(self) -> u8 {
        match self {
            Self::Number(n) => n,
            Self::Level(l) => l.rank(),
        }
    }
}

/// One predicate: `field op value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub op: ConditionOp,
    pub value: ConditionValue,
}

impl Condition {
    /// Evaluate against a classification.
    pub fn holds(&self, c: &Classification) -> bool {
        let lhs: u8 = match self.field {
            ConditionField::PurchaseIntent => c.purchase_intent.rank(),
            ConditionField::PurchaseIntentScore => c.purchase_intent_score,
            ConditionField::OpportunityScore => c.opportunity_score,
            ConditionField::Urgency => c.urgency.rank(),
        };
        let rhs = self.value.as_number();
        match self.op {
            ConditionOp::Gte => lhs >= rhs,
            ConditionOp::Lte => lhs <= rhs,
            ConditionOp::Eq => lhs == rhs,
        }
    }
}

/// Draft generation settings carried by a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Attach knowledge-base snippets to the generation context.
    #[serde(default)]
    pub use_knowledge_base: bool,
    /// Reply tone, e.g. "professional", "friendly".
    #[serde(default = "default_tone")]
    pub tone: String,
    /// Model override for this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt template identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

fn default_tone() -> String {
    "professional".to_string()
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            use_knowledge_base: false,
            tone: default_tone(),
            model: None,
            prompt_template: None,
        }
    }
}

/// Rule outcome counters. Mutated only by the matcher (triggered) and the
/// approval manager (approved/rejected), never by API consumers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RuleCounters {
    pub triggered_count: u64,
    pub approved_count: u64,
    pub rejected_count: u64,
}

/// Operator-authored auto-reply policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyRule {
    pub id: u64,
    pub rule_name: String,
    pub email_category: EmailCategory,
    pub is_enabled: bool,
    pub auto_generate_reply: bool,
    pub require_approval: bool,
    pub approval_method: ApprovalMethod,
    /// Clamped to 1–168 hours.
    pub approval_timeout_hours: u32,
    /// Higher wins; ties break on lower id.
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub counters: RuleCounters,
}

impl AutoReplyRule {
    /// Do all conditions hold for this classification?
    pub fn conditions_hold(&self, c: &Classification) -> bool {
        self.conditions.iter().all(|cond| cond.holds(c))
    }
}

/// Rule fields as authored by an operator — everything except the id and
/// counters, which the store owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub rule_name: String,
    pub email_category: EmailCategory,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default = "default_true")]
    pub auto_generate_reply: bool,
    #[serde(default = "default_true")]
    pub require_approval: bool,
    #[serde(default)]
    pub approval_method: ApprovalMethod,
    #[serde(default = "default_timeout")]
    pub approval_timeout_hours: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub generation: GenerationSettings,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u32 {
    24
}

impl RuleDraft {
    /// Materialize into a rule with the given id, clamping the timeout.
    pub fn into_rule(self, id: u64) -> AutoReplyRule {
        AutoReplyRule {
            id,
            rule_name: self.rule_name,
            email_category: self.email_category,
            is_enabled: self.is_enabled,
            auto_generate_reply: self.auto_generate_reply,
            require_approval: self.require_approval,
            approval_method: self.approval_method,
            approval_timeout_hours: self
                .approval_timeout_hours
                .clamp(MIN_TIMEOUT_HOURS, MAX_TIMEOUT_HOURS),
            priority: self.priority,
            conditions: self.conditions,
            generation: self.generation,
            counters: RuleCounters::default(),
        }
    }
}
