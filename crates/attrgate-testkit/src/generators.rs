//! Proptest generators for property-based testing.

use proptest::prelude::*;

use attrgate_core::{AttributeSet, IdentityKeypair, Timestamp};
use attrgate_policy::{Comparator, PolicyExpression};

/// Generate a deterministic identity keypair.
pub fn identity_keypair() -> impl Strategy<Value = IdentityKeypair> {
    any::<[u8; 32]>().prop_map(IdentityKeypair::from_seed)
}

/// Generate a valid attribute token that is not a policy keyword.
pub fn attribute_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.:-]{0,15}".prop_filter("policy keyword", |s| s != "of" && s != "date")
}

/// Generate a non-empty attribute set.
pub fn attribute_set() -> impl Strategy<Value = AttributeSet> {
    prop::collection::btree_set(attribute_name(), 1..8).prop_map(|names| {
        // Every generated token satisfies the token rules.
        AttributeSet::new(names).unwrap_or_default()
    })
}

pub fn comparator() -> impl Strategy<Value = Comparator> {
    prop_oneof![
        Just(Comparator::Lt),
        Just(Comparator::Le),
        Just(Comparator::Gt),
        Just(Comparator::Ge),
        Just(Comparator::Eq),
        Just(Comparator::Ne),
    ]
}

pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp)
}

/// Generate a policy tree in normal form, drawing names from `names`.
///
/// Normal form means the tree equals what its own canonical text parses to.
pub fn policy_over(names: Vec<String>) -> impl Strategy<Value = PolicyExpression> {
    let leaf = prop_oneof![
        3 => prop::sample::select(names).prop_map(PolicyExpression::Attribute),
        1 => (comparator(), any::<u64>())
            .prop_map(|(op, value)| PolicyExpression::Date { op, value }),
    ];

    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(PolicyExpression::and),
            prop::collection::vec(inner.clone(), 2..4).prop_map(PolicyExpression::or),
            prop::collection::vec(inner, 1..4).prop_flat_map(|children| {
                let n = children.len();
                (1..=n).prop_map(move |k| PolicyExpression::Threshold {
                    k,
                    children: children.clone(),
                })
            }),
        ]
    })
}

/// Generate a policy tree over a small fixed vocabulary.
pub fn policy() -> impl Strategy<Value = PolicyExpression> {
    policy_over(
        ["admin", "ops", "guest", "it_departement", "auditor"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

/// Generate printable text that may or may not be a valid policy.
pub fn policy_text() -> impl Strategy<Value = String> {
    prop_oneof![
        policy().prop_map(|p| p.to_string()),
        "[ -~]{0,64}",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrgate_policy::evaluate;

    proptest! {
        #[test]
        fn generated_policies_round_trip(expr in policy()) {
            let reparsed = PolicyExpression::parse(&expr.to_string()).unwrap();
            prop_assert_eq!(reparsed, expr);
        }

        #[test]
        fn generated_sets_are_valid(set in attribute_set()) {
            prop_assert!(!set.is_empty());
        }

        #[test]
        fn evaluation_only_depends_on_referenced_names(
            expr in policy(),
            set in attribute_set(),
            now in timestamp(),
        ) {
            let referenced: Vec<&str> = set
                .iter()
                .filter(|name| expr.attributes().contains(name))
                .collect();
            let narrowed = AttributeSet::new(referenced).unwrap();
            prop_assert_eq!(evaluate(&expr, &set, now), evaluate(&expr, &narrowed, now));
        }
    }
}
