use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use thiserror::Error;

use crate::rules::Rule;

use super::identity::Identity;
use super::operation::Operation;

/// Serialized rule-set format version. Bumped on incompatible layout
/// changes; commit rejects versions it does not understand.
pub const RULE_SET_FORMAT_VERSION: u32 = 1;

/// Maximum rule-set name length in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// Static per-tree limits enforced at commit time. The evaluator enforces
/// its own dynamic budget as well; these bounds keep stored rule sets small
/// enough that the dynamic budget is only reachable through namespace
/// composition.
pub const MAX_RULE_NODES: u32 = 1024;
pub const MAX_RULE_DEPTH: u32 = 32;

/// Errors from deserializing or validating a rule set.
#[derive(Error, Debug)]
pub enum RuleSetError {
    #[error("malformed rule set bytes: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported rule set format version {0}")]
    UnsupportedVersion(u32),

    #[error("rule set name must be 1..={MAX_NAME_LEN} bytes, got {0}")]
    InvalidName(usize),

    #[error("rule tree for {context} exceeds static limits ({nodes} nodes, depth {depth})")]
    TreeTooLarge {
        context: String,
        nodes: u32,
        depth: u32,
    },

    #[error("rule tree for {context} references undefined namespace `{name}`")]
    UnknownNamespace { context: String, name: String },

    #[error("namespace cycle involving `{0}`")]
    NamespaceCycle(String),
}

/// A named, versioned collection of authorization rules owned by a creator.
///
/// `operations` holds one root rule per operation; `shared` holds named
/// rules that `Namespace` nodes resolve against. Instances are immutable
/// once committed to a store; an update commits a whole new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Serialized format version
    pub format_version: u32,

    /// Rule set name, unique per creator
    pub name: String,

    /// Creator identity that owns this rule set
    pub owner: Identity,

    /// Root rule per operation
    #[serde(default)]
    pub operations: BTreeMap<Operation, Rule>,

    /// Named rules available to `Namespace` references
    #[serde(default)]
    pub shared: BTreeMap<String, Rule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, owner: Identity) -> Self {
        RuleSet {
            format_version: RULE_SET_FORMAT_VERSION,
            name: name.into(),
            owner,
            operations: BTreeMap::new(),
            shared: BTreeMap::new(),
        }
    }

    /// Set the root rule for an operation, replacing any prior root.
    pub fn add(&mut self, operation: Operation, rule: Rule) {
        self.operations.insert(operation, rule);
    }

    /// Register a named rule for `Namespace` reuse.
    pub fn add_shared(&mut self, name: impl Into<String>, rule: Rule) {
        self.shared.insert(name.into(), rule);
    }

    pub fn rule_for(&self, operation: Operation) -> Option<&Rule> {
        self.operations.get(&operation)
    }

    pub fn shared_rule(&self, name: &str) -> Option<&Rule> {
        self.shared.get(name)
    }

    /// Deserialize and fully validate. Nothing partially-validated ever
    /// escapes this function.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RuleSetError> {
        let rule_set: RuleSet = serde_json::from_slice(bytes)?;
        rule_set.validate()?;
        Ok(rule_set)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RuleSetError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Structural validation: format version, name bounds, per-tree size
    /// limits, namespace resolvability, and acyclicity of the shared-name
    /// reference graph.
    pub fn validate(&self) -> Result<(), RuleSetError> {
        if self.format_version != RULE_SET_FORMAT_VERSION {
            return Err(RuleSetError::UnsupportedVersion(self.format_version));
        }

        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(RuleSetError::InvalidName(self.name.len()));
        }

        for (operation, rule) in &self.operations {
            self.check_tree(operation.as_str(), rule)?;
        }
        for (name, rule) in &self.shared {
            self.check_tree(name, rule)?;
        }

        self.check_shared_acyclic()
    }

    fn check_tree(&self, context: &str, rule: &Rule) -> Result<(), RuleSetError> {
        let shape = rule.shape();
        if shape.nodes > MAX_RULE_NODES || shape.max_depth > MAX_RULE_DEPTH {
            return Err(RuleSetError::TreeTooLarge {
                context: context.to_string(),
                nodes: shape.nodes,
                depth: shape.max_depth,
            });
        }

        for name in rule.namespace_refs() {
            if !self.shared.contains_key(name) {
                return Err(RuleSetError::UnknownNamespace {
                    context: context.to_string(),
                    name: name.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Namespace references of a shared rule, empty if the name is unknown.
    fn shared_refs(&self, name: &str) -> Vec<&str> {
        self.shared
            .get(name)
            .map_or_else(Vec::new, |rule| rule.namespace_refs())
    }

    /// Three-color DFS over the shared-name reference graph, iterative so
    /// reference chains cannot overflow the call stack.
    fn check_shared_acyclic(&self) -> Result<(), RuleSetError> {
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut color: HashMap<&str, u8> = HashMap::new();

        for start in self.shared.keys() {
            if color.get(start.as_str()) == Some(&BLACK) {
                continue;
            }

            let mut stack: Vec<(&str, Vec<&str>, usize)> =
                vec![(start, self.shared_refs(start), 0)];
            color.insert(start, GRAY);

            while let Some(frame) = stack.last_mut() {
                if frame.2 < frame.1.len() {
                    let next = frame.1[frame.2];
                    frame.2 += 1;
                    match color.get(next) {
                        Some(&GRAY) => {
                            return Err(RuleSetError::NamespaceCycle(next.to_string()));
                        }
                        Some(&BLACK) => {}
                        _ => {
                            color.insert(next, GRAY);
                            let next_refs = self.shared_refs(next);
                            stack.push((next, next_refs, 0));
                        }
                    }
                } else {
                    color.insert(frame.0, BLACK);
                    stack.pop();
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PayloadKey;
    use crate::rules::CompareOp;

    fn owner() -> Identity {
        Identity::new([9u8; 32])
    }

    #[test]
    fn test_round_trip() {
        let mut rule_set = RuleSet::new("transfer-policy", owner());
        rule_set.add(
            Operation::Transfer,
            Rule::Amount {
                field: PayloadKey::AMOUNT,
                operator: CompareOp::LtEq,
                amount: 1000,
            },
        );

        let bytes = rule_set.to_bytes().unwrap();
        let parsed = RuleSet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, rule_set);
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let mut rule_set = RuleSet::new("p", owner());
        rule_set.format_version = 99;

        assert!(matches!(
            rule_set.validate(),
            Err(RuleSetError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_rejects_bad_names() {
        let rule_set = RuleSet::new("", owner());
        assert!(matches!(
            rule_set.validate(),
            Err(RuleSetError::InvalidName(0))
        ));

        let rule_set = RuleSet::new("x".repeat(MAX_NAME_LEN + 1), owner());
        assert!(matches!(
            rule_set.validate(),
            Err(RuleSetError::InvalidName(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_namespace() {
        let mut rule_set = RuleSet::new("p", owner());
        rule_set.add(
            Operation::Transfer,
            Rule::Namespace {
                name: "missing".to_string(),
            },
        );

        let err = rule_set.validate().unwrap_err();
        assert!(matches!(err, RuleSetError::UnknownNamespace { name, .. } if name == "missing"));
    }

    #[test]
    fn test_rejects_namespace_cycle() {
        let mut rule_set = RuleSet::new("p", owner());
        rule_set.add_shared(
            "a",
            Rule::Namespace {
                name: "b".to_string(),
            },
        );
        rule_set.add_shared(
            "b",
            Rule::Namespace {
                name: "a".to_string(),
            },
        );

        assert!(matches!(
            rule_set.validate(),
            Err(RuleSetError::NamespaceCycle(_))
        ));
    }

    #[test]
    fn test_rejects_self_cycle() {
        let mut rule_set = RuleSet::new("p", owner());
        rule_set.add_shared(
            "a",
            Rule::Namespace {
                name: "a".to_string(),
            },
        );

        assert!(matches!(
            rule_set.validate(),
            Err(RuleSetError::NamespaceCycle(name)) if name == "a"
        ));
    }

    #[test]
    fn test_accepts_shared_dag() {
        let mut rule_set = RuleSet::new("p", owner());
        rule_set.add_shared("leaf", Rule::Pass);
        rule_set.add_shared(
            "left",
            Rule::Namespace {
                name: "leaf".to_string(),
            },
        );
        rule_set.add_shared(
            "right",
            Rule::Namespace {
                name: "leaf".to_string(),
            },
        );
        rule_set.add(
            Operation::Transfer,
            Rule::All {
                rules: vec![
                    Rule::Namespace {
                        name: "left".to_string(),
                    },
                    Rule::Namespace {
                        name: "right".to_string(),
                    },
                ],
            },
        );

        rule_set.validate().unwrap();
    }

    #[test]
    fn test_rejects_oversized_tree() {
        let mut rule_set = RuleSet::new("p", owner());
        let wide = Rule::All {
            rules: (0..=MAX_RULE_NODES)
                .map(|_| Rule::Pass)
                .collect(),
        };
        rule_set.add(Operation::Transfer, wide);

        assert!(matches!(
            rule_set.validate(),
            Err(RuleSetError::TreeTooLarge { .. })
        ));
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        assert!(matches!(
            RuleSet::from_bytes(b"not json"),
            Err(RuleSetError::Malformed(_))
        ));
    }
}
