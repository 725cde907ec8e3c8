//! Auto-reply rules — the operator-authored policy layer.

pub mod matcher;
pub mod model;

pub use matcher::RuleStore;
pub use model::{
    ApprovalMethod, AutoReplyRule, Condition, ConditionField, ConditionOp, ConditionValue,
    GenerationSettings, RuleCounters, RuleDraft,
};
