//! The policy evaluator collaborator.
//!
//! The policy expression language itself is out of scope; this module
//! models the evaluator as a trait object so the engines never depend on
//! a concrete rule representation. [`DefaultPolicyEvaluator`] is a small
//! pattern-matching implementation (two precompiled [`regex::RegexSet`]s
//! plus one numeric threshold hook) sufficient to drive the scenarios in
//! this design — not a general rule engine.

use regex::RegexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    RequireApproval,
    Block,
}

#[derive(Debug, Clone)]
pub struct PolicyRequest<'a> {
    pub tool_name: &'a str,
    pub user_id: &'a str,
    pub args: &'a serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub decision: PolicyDecision,
    pub reason: Option<String>,
}

impl PolicyVerdict {
    pub fn allow() -> Self {
        PolicyVerdict {
            decision: PolicyDecision::Allow,
            reason: None,
        }
    }
}

/// A black-box decision function: `{tool_name, user_id, args} -> allow |
/// require_approval | block`. A missing/unmapped decision defaults to
/// `allow` — callers should treat `None` the same as `Allow`.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, req: PolicyRequest<'_>) -> PolicyVerdict;
}

/// Pattern-based default: tool names matching `blocked` are blocked
/// outright; tool names matching `requires_approval` need approval unless
/// a more specific threshold hook downgrades/upgrades the decision.
/// Anything else is allowed.
pub struct DefaultPolicyEvaluator {
    blocked: RegexSet,
    requires_approval: RegexSet,
    /// Tools that require approval only when a named numeric arg exceeds
    /// a threshold, e.g. `payments.transfer` when `args.amount > 100`.
    amount_thresholds: Vec<(String, String, f64)>,
}

impl DefaultPolicyEvaluator {
    pub fn new(
        blocked_patterns: &[String],
        requires_approval_patterns: &[String],
        amount_thresholds: Vec<(String, String, f64)>,
    ) -> Self {
        let blocked = RegexSet::new(blocked_patterns).unwrap_or_else(|_| RegexSet::empty());
        let requires_approval =
            RegexSet::new(requires_approval_patterns).unwrap_or_else(|_| RegexSet::empty());
        DefaultPolicyEvaluator {
            blocked,
            requires_approval,
            amount_thresholds,
        }
    }

    /// A reasonable out-of-the-box configuration matching the literal
    /// scenarios this design must satisfy: `dangerous.*` is blocked,
    /// `payments.transfer` requires approval above a $100 threshold.
    pub fn with_defaults() -> Self {
        DefaultPolicyEvaluator::new(
            &["^dangerous\\.".to_string()],
            &["^payments\\.transfer$".to_string()],
            vec![("payments.transfer".to_string(), "amount".to_string(), 100.0)],
        )
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn evaluate(&self, req: PolicyRequest<'_>) -> PolicyVerdict {
        if self.blocked.is_match(req.tool_name) {
            return PolicyVerdict {
                decision: PolicyDecision::Block,
                reason: Some(format!("{} is blocked by policy", req.tool_name)),
            };
        }

        if self.requires_approval.is_match(req.tool_name) {
            for (tool, field, threshold) in &self.amount_thresholds {
                if tool == req.tool_name {
                    let value = req.args.get(field).and_then(|v| v.as_f64());
                    match value {
                        Some(v) if v > *threshold => {
                            return PolicyVerdict {
                                decision: PolicyDecision::RequireApproval,
                                reason: Some(format!(
                                    "{field}={v} exceeds threshold {threshold}"
                                )),
                            };
                        }
                        Some(_) => return PolicyVerdict::allow(),
                        None => {
                            return PolicyVerdict {
                                decision: PolicyDecision::RequireApproval,
                                reason: Some(format!("missing {field}, defaulting to approval")),
                            }
                        }
                    }
                }
            }
            return PolicyVerdict {
                decision: PolicyDecision::RequireApproval,
                reason: Some(format!("{} requires approval by policy", req.tool_name)),
            };
        }

        PolicyVerdict::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(tool_name: &'a str, args: &'a serde_json::Value) -> PolicyRequest<'a> {
        PolicyRequest {
            tool_name,
            user_id: "u1",
            args,
        }
    }

    #[test]
    fn blocks_dangerous_commands() {
        let eval = DefaultPolicyEvaluator::with_defaults();
        let args = serde_json::json!({});
        let verdict = eval.evaluate(req("dangerous.command", &args));
        assert_eq!(verdict.decision, PolicyDecision::Block);
    }

    #[test]
    fn requires_approval_above_threshold() {
        let eval = DefaultPolicyEvaluator::with_defaults();
        let args = serde_json::json!({"amount": 200});
        let verdict = eval.evaluate(req("payments.transfer", &args));
        assert_eq!(verdict.decision, PolicyDecision::RequireApproval);
    }

    #[test]
    fn allows_below_threshold() {
        let eval = DefaultPolicyEvaluator::with_defaults();
        let args = serde_json::json!({"amount": 50});
        let verdict = eval.evaluate(req("payments.transfer", &args));
        assert_eq!(verdict.decision, PolicyDecision::Allow);
    }

    #[test]
    fn allows_unmapped_tools_by_default() {
        let eval = DefaultPolicyEvaluator::with_defaults();
        let args = serde_json::json!({});
        let verdict = eval.evaluate(req("search.web", &args));
        assert_eq!(verdict.decision, PolicyDecision::Allow);
    }
}
