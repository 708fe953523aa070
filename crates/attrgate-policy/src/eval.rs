//! Policy evaluation.

use attrgate_core::{AttributeSet, Timestamp};

use crate::error::Result;
use crate::expr::PolicyExpression;

/// Decide whether `attributes` presented at time `now` satisfy `expr`.
///
/// `AND` and `OR` short-circuit left to right. A threshold gate stops as
/// soon as `k` children hold or too few remain to reach `k`.
pub fn evaluate(expr: &PolicyExpression, attributes: &AttributeSet, now: Timestamp) -> bool {
    match expr {
        PolicyExpression::Attribute(name) => attributes.contains(name),
        PolicyExpression::Date { op, value } => op.apply(now.as_u64(), *value),
        PolicyExpression::And(children) => children
            .iter()
            .all(|child| evaluate(child, attributes, now)),
        PolicyExpression::Or(children) => children
            .iter()
            .any(|child| evaluate(child, attributes, now)),
        PolicyExpression::Threshold { k, children } => {
            let mut satisfied = 0;
            for (i, child) in children.iter().enumerate() {
                if satisfied + (children.len() - i) < *k {
                    return false;
                }
                if evaluate(child, attributes, now) {
                    satisfied += 1;
                    if satisfied >= *k {
                        return true;
                    }
                }
            }
            satisfied >= *k
        }
    }
}

/// Parse `policy` and evaluate it in one step.
pub fn evaluate_str(policy: &str, attributes: &AttributeSet, now: Timestamp) -> Result<bool> {
    let expr = PolicyExpression::parse(policy)?;
    Ok(evaluate(&expr, attributes, now))
}

impl PolicyExpression {
    /// See [`evaluate`].
    pub fn evaluate(&self, attributes: &AttributeSet, now: Timestamp) -> bool {
        evaluate(self, attributes, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attrs(names: &[&str]) -> AttributeSet {
        AttributeSet::new(names.iter().copied()).unwrap()
    }

    fn eval(policy: &str, names: &[&str], now: u64) -> bool {
        evaluate_str(policy, &attrs(names), Timestamp(now)).unwrap()
    }

    #[test]
    fn test_attribute_membership() {
        assert!(eval("admin", &["admin"], 0));
        assert!(!eval("admin", &["guest"], 0));
        assert!(!eval("admin", &[], 0));
    }

    #[test]
    fn test_boolean_composition() {
        assert!(eval("admin AND ops", &["admin", "ops"], 0));
        assert!(!eval("admin AND ops", &["admin"], 0));
        assert!(eval("admin OR ops", &["ops"], 0));
        assert!(!eval("admin OR ops", &["guest"], 0));
        assert!(eval("guest OR admin AND ops", &["guest"], 0));
        assert!(!eval("(guest OR admin) AND ops", &["guest"], 0));
    }

    #[test]
    fn test_time_comparison() {
        let policy = "admin AND date > 15434456322";
        assert!(eval(policy, &["admin"], 15434456323));
        assert!(!eval(policy, &["admin"], 15434456322));
        assert!(!eval(policy, &["admin"], 1));

        assert!(eval("date <= 10", &[], 10));
        assert!(eval("date == 10", &[], 10));
        assert!(!eval("date != 10", &[], 10));
        assert!(eval("date >= 10", &[], 11));
        assert!(eval("date < 10", &[], 9));
    }

    #[test]
    fn test_threshold() {
        let policy = "2 of (admin, ops, date > 100)";
        assert!(eval(policy, &["admin", "ops"], 0));
        assert!(eval(policy, &["ops"], 101));
        assert!(!eval(policy, &["admin"], 50));
        assert!(eval("1 of (a)", &["a"], 0));
        assert!(eval("3 of (a, b, c)", &["a", "b", "c"], 0));
    }

    #[test]
    fn test_evaluate_str_propagates_parse_errors() {
        assert!(evaluate_str("admin AND", &attrs(&["admin"]), Timestamp(0)).is_err());
    }

    proptest! {
        #[test]
        fn and_is_conjunction(a in any::<bool>(), b in any::<bool>()) {
            let mut names = Vec::new();
            if a { names.push("a"); }
            if b { names.push("b"); }
            let set = attrs(&names);
            let now = Timestamp(0);
            prop_assert_eq!(evaluate_str("a AND b", &set, now).unwrap(), a && b);
            prop_assert_eq!(evaluate_str("a OR b", &set, now).unwrap(), a || b);
        }

        #[test]
        fn threshold_counts_members(mask in 0u8..8, k in 1usize..=3) {
            let all = ["a", "b", "c"];
            let names: Vec<&str> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| *n)
                .collect();
            let policy = format!("{k} of (a, b, c)");
            let held = evaluate_str(&policy, &attrs(&names), Timestamp(0)).unwrap();
            prop_assert_eq!(held, names.len() >= k);
        }

        #[test]
        fn date_comparison_matches_integer_order(now in any::<u64>(), lit in any::<u64>()) {
            let set = AttributeSet::empty();
            let policy = format!("date > {lit}");
            prop_assert_eq!(evaluate_str(&policy, &set, Timestamp(now)).unwrap(), now > lit);
        }
    }
}
