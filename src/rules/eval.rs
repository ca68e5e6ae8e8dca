use chrono::{DateTime, Utc};

use crate::domain::{Denial, Operation, Payload, RuleSet, Verdict};
use crate::wire::address::derived_address;

use super::Rule;

/// Dynamic evaluation budget.
///
/// Wider than the per-tree static limits so that namespace composition of
/// several committed trees still fits; exhausting either bound is a
/// fail-closed fault, never a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalLimits {
    pub max_depth: u32,
    pub max_nodes: u32,
}

impl Default for EvalLimits {
    fn default() -> Self {
        EvalLimits {
            max_depth: 64,
            max_nodes: 4096,
        }
    }
}

/// Evaluate the rule set's root for `operation` against `payload`.
///
/// Pure given its inputs: the evaluation timestamp is injected by the
/// caller. A missing root is the fail-closed "no rule configured" denial.
pub fn evaluate(
    rule_set: &RuleSet,
    operation: Operation,
    payload: &Payload,
    evaluated_at: DateTime<Utc>,
    limits: EvalLimits,
) -> Verdict {
    let root = match rule_set.rule_for(operation) {
        Some(root) => root,
        None => return Verdict::deny(Denial::no_rule_configured(operation), 0),
    };

    let mut evaluator = Evaluator {
        rule_set,
        payload,
        evaluated_at: evaluated_at.timestamp().max(0) as u64,
        limits,
        nodes: 0,
        resolving: Vec::new(),
    };

    match evaluator.eval(root, 1) {
        Ok(()) => Verdict::allow(evaluator.nodes),
        Err(denial) => Verdict::deny(denial, evaluator.nodes),
    }
}

struct Evaluator<'a> {
    rule_set: &'a RuleSet,
    payload: &'a Payload,
    evaluated_at: u64,
    limits: EvalLimits,
    nodes: u32,
    /// Namespace resolution in progress, innermost last. Doubles as the
    /// cycle guard: re-entering a name already on the stack is a cycle.
    resolving: Vec<&'a str>,
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, rule: &'a Rule, depth: u32) -> Result<(), Denial> {
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(Denial::limit_exceeded(format!(
                "node budget of {} exhausted",
                self.limits.max_nodes
            )));
        }
        if depth > self.limits.max_depth {
            return Err(Denial::limit_exceeded(format!(
                "depth {} exceeds maximum {}",
                depth, self.limits.max_depth
            )));
        }

        match rule {
            Rule::Pass => Ok(()),

            Rule::All { rules } => {
                for child in rules {
                    self.eval(child, depth + 1)?;
                }
                Ok(())
            }

            Rule::Any { rules } => {
                if rules.is_empty() {
                    return Err(Denial::policy("any", "empty disjunction"));
                }

                let mut reasons = Vec::with_capacity(rules.len());
                for child in rules {
                    match self.eval(child, depth + 1) {
                        Ok(()) => return Ok(()),
                        // A fault is not a legitimate "no": surface it
                        // instead of letting a later branch mask it.
                        Err(denial) if denial.kind.is_fault() => return Err(denial),
                        Err(denial) => reasons.push(denial.message),
                    }
                }
                Err(Denial::policy(
                    "any",
                    format!("no alternative allowed: {}", reasons.join("; ")),
                ))
            }

            Rule::Not { rule: child } => match self.eval(child, depth + 1) {
                Ok(()) => Err(Denial::policy("not", "expected child to deny")),
                Err(denial) if denial.kind.is_fault() => Err(denial),
                Err(_) => Ok(()),
            },

            Rule::Namespace { name } => {
                if self.resolving.iter().any(|n| *n == name.as_str()) {
                    return Err(Denial::cycle(name));
                }
                let target = self
                    .rule_set
                    .shared_rule(name)
                    .ok_or_else(|| Denial::unknown_namespace(name))?;

                self.resolving.push(name.as_str());
                let result = self.eval(target, depth + 1);
                self.resolving.pop();
                result
            }

            Rule::AddressMatch { field, address } => {
                let actual = self
                    .payload
                    .address(*field)
                    .ok_or_else(|| Denial::missing_field(rule.kind(), *field))?;
                if actual == address {
                    Ok(())
                } else {
                    Err(Denial::policy(
                        rule.kind(),
                        format!(
                            "{} {} does not match expected {}",
                            field,
                            actual.short(),
                            address.short()
                        ),
                    ))
                }
            }

            Rule::AddressList { field, addresses } => {
                let actual = self
                    .payload
                    .address(*field)
                    .ok_or_else(|| Denial::missing_field(rule.kind(), *field))?;
                if addresses.contains(actual) {
                    Ok(())
                } else {
                    Err(Denial::policy(
                        rule.kind(),
                        format!(
                            "{} {} is not on the allow-list ({} entries)",
                            field,
                            actual.short(),
                            addresses.len()
                        ),
                    ))
                }
            }

            Rule::Amount {
                field,
                operator,
                amount,
            } => {
                let actual = self
                    .payload
                    .number(*field)
                    .ok_or_else(|| Denial::missing_field(rule.kind(), *field))?;
                if operator.compare(actual, *amount) {
                    Ok(())
                } else {
                    Err(Denial::policy(
                        rule.kind(),
                        format!("{} {} not {} {}", field, actual, operator, amount),
                    ))
                }
            }

            Rule::DerivedMatch {
                base,
                field,
                seeds_field,
            } => {
                let actual = self
                    .payload
                    .address(*field)
                    .ok_or_else(|| Denial::missing_field(rule.kind(), *field))?;
                let seeds = self
                    .payload
                    .seeds(*seeds_field)
                    .ok_or_else(|| Denial::missing_field(rule.kind(), *seeds_field))?;

                let expected = derived_address(base, seeds);
                if *actual == expected {
                    Ok(())
                } else {
                    Err(Denial::policy(
                        rule.kind(),
                        format!(
                            "{} {} does not match derived address {}",
                            field,
                            actual.short(),
                            expected.short()
                        ),
                    ))
                }
            }

            Rule::Frequency {
                field,
                min_interval_secs,
            } => {
                let last = self
                    .payload
                    .number(*field)
                    .ok_or_else(|| Denial::missing_field(rule.kind(), *field))?;
                let next_allowed = last.checked_add(*min_interval_secs).ok_or_else(|| {
                    Denial::overflow(
                        rule.kind(),
                        format!("{} + {} overflows", last, min_interval_secs),
                    )
                })?;

                if self.evaluated_at >= next_allowed {
                    Ok(())
                } else {
                    Err(Denial::policy(
                        rule.kind(),
                        format!(
                            "too frequent: last at {}, next allowed at {}",
                            last, next_allowed
                        ),
                    ))
                }
            }
        }
    }
}
