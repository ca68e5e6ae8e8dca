use serde::{Deserialize, Serialize};
use std::fmt;

use super::payload::PayloadKey;

/// Classification of a denial.
///
/// Policy-shaped kinds are legitimate evaluation outcomes; fault kinds mean
/// the rule set itself is broken and should be surfaced to operators
/// separately from ordinary rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// An authored rule rejected the operation
    Policy,
    /// A required payload field was absent (absence of proof denies)
    MissingField,
    /// Arithmetic in a numeric predicate overflowed
    Overflow,
    /// No rule root is configured for the requested operation
    NoRuleConfigured,
    /// Namespace resolution entered a cycle
    Cycle,
    /// A namespace reference did not resolve
    UnknownNamespace,
    /// Evaluation exceeded the depth or node budget
    LimitExceeded,
}

impl DenialKind {
    /// True for misconfigured-policy outcomes as opposed to legitimate
    /// rejections.
    #[inline]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            DenialKind::Cycle | DenialKind::UnknownNamespace | DenialKind::LimitExceeded
        )
    }
}

/// Reason a verdict denied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Denial {
    /// Classification of the denial
    pub kind: DenialKind,

    /// Rule kind that produced it (e.g. "amount", "address_list", "any")
    pub rule: String,

    /// Human-readable explanation
    pub message: String,
}

impl Denial {
    pub fn policy(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Denial {
            kind: DenialKind::Policy,
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(rule: impl Into<String>, key: PayloadKey) -> Self {
        Denial {
            kind: DenialKind::MissingField,
            rule: rule.into(),
            message: format!("missing field {}", key),
        }
    }

    pub fn overflow(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Denial {
            kind: DenialKind::Overflow,
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn no_rule_configured(operation: impl fmt::Display) -> Self {
        Denial {
            kind: DenialKind::NoRuleConfigured,
            rule: "root".to_string(),
            message: format!("no rule configured for {}", operation),
        }
    }

    pub fn cycle(name: &str) -> Self {
        Denial {
            kind: DenialKind::Cycle,
            rule: "namespace".to_string(),
            message: format!("cycle detected resolving namespace `{}`", name),
        }
    }

    pub fn unknown_namespace(name: &str) -> Self {
        Denial {
            kind: DenialKind::UnknownNamespace,
            rule: "namespace".to_string(),
            message: format!("namespace `{}` is not defined", name),
        }
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Denial {
            kind: DenialKind::LimitExceeded,
            rule: "limits".to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Outcome of evaluating a rule set against an operation and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the operation is permitted
    pub allowed: bool,

    /// Denial reason, present iff not allowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Denial>,

    /// Rule nodes visited during evaluation
    pub rules_evaluated: u32,
}

impl Verdict {
    pub fn allow(rules_evaluated: u32) -> Self {
        Verdict {
            allowed: true,
            reason: None,
            rules_evaluated,
        }
    }

    pub fn deny(reason: Denial, rules_evaluated: u32) -> Self {
        Verdict {
            allowed: false,
            reason: Some(reason),
            rules_evaluated,
        }
    }

    /// True if this is a fault-tagged denial (misconfigured policy) rather
    /// than a legitimate rejection.
    pub fn is_fault(&self) -> bool {
        self.reason
            .as_ref()
            .map(|d| d.kind.is_fault())
            .unwrap_or(false)
    }
}
