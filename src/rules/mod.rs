pub mod eval;

pub use eval::{evaluate, EvalLimits};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Identity, PayloadKey};

/// Comparison operator for numeric predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    LtEq,
    Eq,
    GtEq,
    Gt,
}

impl CompareOp {
    /// Apply the comparison. Pure integer comparison, no overflow possible.
    #[inline]
    pub fn compare(self, lhs: u64, rhs: u64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::LtEq => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::GtEq => lhs >= rhs,
            CompareOp::Gt => lhs > rhs,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Eq => "==",
            CompareOp::GtEq => ">=",
            CompareOp::Gt => ">",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A node in an authorization rule tree.
///
/// Closed tagged union: new rule kinds are added as new tags so evaluation
/// stays exhaustive and total. Composites combine children; leaves test a
/// payload field against authored constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Unconditionally allows
    Pass,

    /// Conjunction; short-circuits on the first denying child. Empty allows.
    All { rules: Vec<Rule> },

    /// Disjunction; short-circuits on the first allowing child. Empty denies.
    Any { rules: Vec<Rule> },

    /// Inversion of the child's policy outcome
    Not { rule: Box<Rule> },

    /// Reference to a named rule in the rule set's shared map
    Namespace { name: String },

    /// Payload field must equal a fixed address
    AddressMatch { field: PayloadKey, address: Identity },

    /// Payload field must be on the allow-list
    AddressList {
        field: PayloadKey,
        addresses: Vec<Identity>,
    },

    /// Payload field compared against a fixed amount
    Amount {
        field: PayloadKey,
        operator: CompareOp,
        amount: u64,
    },

    /// Payload field must equal the address derived from `base` and the
    /// seeds supplied under `seeds_field`
    DerivedMatch {
        base: Identity,
        field: PayloadKey,
        seeds_field: PayloadKey,
    },

    /// At least `min_interval_secs` must have elapsed since the timestamp
    /// supplied under `field`
    Frequency {
        field: PayloadKey,
        min_interval_secs: u64,
    },
}

/// Node and depth census of a rule tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleShape {
    pub nodes: u32,
    pub max_depth: u32,
}

impl Rule {
    /// Short name of the rule kind, used in denial reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Pass => "pass",
            Rule::All { .. } => "all",
            Rule::Any { .. } => "any",
            Rule::Not { .. } => "not",
            Rule::Namespace { .. } => "namespace",
            Rule::AddressMatch { .. } => "address_match",
            Rule::AddressList { .. } => "address_list",
            Rule::Amount { .. } => "amount",
            Rule::DerivedMatch { .. } => "derived_match",
            Rule::Frequency { .. } => "frequency",
        }
    }

    /// Direct children of this node.
    pub fn children(&self) -> &[Rule] {
        match self {
            Rule::All { rules } | Rule::Any { rules } => rules,
            Rule::Not { rule } => std::slice::from_ref(rule),
            _ => &[],
        }
    }

    /// Count nodes and maximum depth with an explicit worklist, so an
    /// adversarially deep tree cannot overflow the call stack.
    pub fn shape(&self) -> RuleShape {
        let mut nodes: u32 = 0;
        let mut max_depth: u32 = 0;
        let mut stack: Vec<(&Rule, u32)> = vec![(self, 1)];

        while let Some((rule, depth)) = stack.pop() {
            nodes = nodes.saturating_add(1);
            max_depth = max_depth.max(depth);
            for child in rule.children() {
                stack.push((child, depth.saturating_add(1)));
            }
        }

        RuleShape { nodes, max_depth }
    }

    /// All namespace names referenced anywhere in this tree.
    pub fn namespace_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        let mut stack: Vec<&Rule> = vec![self];

        while let Some(rule) = stack.pop() {
            if let Rule::Namespace { name } = rule {
                refs.push(name.as_str());
            }
            stack.extend(rule.children());
        }

        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op() {
        assert!(CompareOp::LtEq.compare(1000, 1000));
        assert!(!CompareOp::Lt.compare(1000, 1000));
        assert!(CompareOp::Gt.compare(2, 1));
        assert!(CompareOp::Eq.compare(7, 7));
        assert_eq!(CompareOp::GtEq.symbol(), ">=");
    }

    #[test]
    fn test_shape_counts_nodes_and_depth() {
        let rule = Rule::All {
            rules: vec![
                Rule::Pass,
                Rule::Not {
                    rule: Box::new(Rule::Any {
                        rules: vec![Rule::Pass, Rule::Pass],
                    }),
                },
            ],
        };

        let shape = rule.shape();
        assert_eq!(shape.nodes, 6);
        assert_eq!(shape.max_depth, 4);
    }

    #[test]
    fn test_shape_of_leaf() {
        let shape = Rule::Pass.shape();
        assert_eq!(shape.nodes, 1);
        assert_eq!(shape.max_depth, 1);
    }

    #[test]
    fn test_namespace_refs() {
        let rule = Rule::Any {
            rules: vec![
                Rule::Namespace {
                    name: "a".to_string(),
                },
                Rule::All {
                    rules: vec![Rule::Namespace {
                        name: "b".to_string(),
                    }],
                },
            ],
        };

        let mut refs = rule.namespace_refs();
        refs.sort_unstable();
        assert_eq!(refs, vec!["a", "b"]);
    }

    #[test]
    fn test_tagged_serialization() {
        let rule = Rule::Amount {
            field: PayloadKey::AMOUNT,
            operator: CompareOp::LtEq,
            amount: 1000,
        };

        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"type\":\"amount\""));
        assert!(json.contains("\"operator\":\"lt_eq\""));

        let parsed: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }

    #[test]
    fn test_deep_tree_shape_does_not_recurse() {
        let mut rule = Rule::Pass;
        for _ in 0..100_000 {
            rule = Rule::Not {
                rule: Box::new(rule),
            };
        }

        let shape = rule.shape();
        assert_eq!(shape.nodes, 100_001);
        assert_eq!(shape.max_depth, 100_001);
    }
}
