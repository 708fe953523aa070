//! Golden policy vectors.
//!
//! Each vector pins how one policy text parses, how it prints canonically
//! and what it decides for one presented attribute set at one time.

use serde::{Deserialize, Serialize};

use attrgate_core::{AttributeSet, Timestamp};
use attrgate_policy::{evaluate, PolicyExpression};

/// A golden policy vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenVector {
    pub name: String,
    pub policy: String,
    /// Canonical text, or `None` when the policy must be rejected.
    pub canonical: Option<String>,
    pub attributes: Vec<String>,
    pub now: u64,
    /// Expected decision for accepted policies.
    pub admitted: bool,
}

fn vector(
    name: &str,
    policy: &str,
    canonical: Option<&str>,
    attributes: &[&str],
    now: u64,
    admitted: bool,
) -> GoldenVector {
    GoldenVector {
        name: name.to_string(),
        policy: policy.to_string(),
        canonical: canonical.map(str::to_string),
        attributes: attributes.iter().map(|s| s.to_string()).collect(),
        now,
        admitted,
    }
}

/// Get all golden policy vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    const SAMPLE: &str = "(admin AND date > 15434456322)";
    vec![
        vector(
            "sample_policy_admits_admin_after_date",
            SAMPLE,
            Some("admin AND date > 15434456322"),
            &["admin", "it_departement"],
            15434456400,
            true,
        ),
        vector(
            "sample_policy_rejects_guest",
            SAMPLE,
            Some("admin AND date > 15434456322"),
            &["guest"],
            15434456400,
            false,
        ),
        vector(
            "sample_policy_rejects_before_date",
            SAMPLE,
            Some("admin AND date > 15434456322"),
            &["admin"],
            15434456321,
            false,
        ),
        vector(
            "single_attribute",
            "  admin ",
            Some("admin"),
            &["admin"],
            0,
            true,
        ),
        vector(
            "and_binds_tighter_than_or",
            "guest OR admin AND ops",
            Some("guest OR admin AND ops"),
            &["guest"],
            0,
            true,
        ),
        vector(
            "parenthesized_or",
            "(guest OR admin) AND ops",
            Some("(guest OR admin) AND ops"),
            &["guest"],
            0,
            false,
        ),
        vector(
            "redundant_parens_dropped",
            "((a AND (b AND c)))",
            Some("a AND b AND c"),
            &["a", "b", "c"],
            0,
            true,
        ),
        vector(
            "threshold_two_of_three",
            "2 of (admin, ops, date >= 100)",
            Some("2 of (admin, ops, date >= 100)"),
            &["ops"],
            100,
            true,
        ),
        vector(
            "all_comparators",
            "date<10 OR date<=10 OR date>10 OR date>=10 OR date==10 OR date!=10",
            Some("date < 10 OR date <= 10 OR date > 10 OR date >= 10 OR date == 10 OR date != 10"),
            &[],
            10,
            true,
        ),
        vector("empty_rejected", "", None, &["admin"], 0, false),
        vector("dangling_and_rejected", "(admin AND", None, &["admin"], 0, false),
        vector("lowercase_keyword_rejected", "admin and ops", None, &["admin"], 0, false),
        vector("comparison_on_attribute_rejected", "level > 3", None, &[], 0, false),
        vector("threshold_too_large_rejected", "3 of (a, b)", None, &["a", "b"], 0, false),
    ]
}

/// Outcome of checking one vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Check one vector against the parser and evaluator.
pub fn check_vector(vector: &GoldenVector) -> VectorResult {
    let outcome = match (PolicyExpression::parse(&vector.policy), &vector.canonical) {
        (Err(err), None) => Ok(format!("rejected: {}", err)),
        (Err(err), Some(_)) => Err(format!("unexpected rejection: {}", err)),
        (Ok(expr), None) => Err(format!("unexpectedly accepted as `{}`", expr)),
        (Ok(expr), Some(canonical)) => check_accepted(vector, &expr, canonical),
    };

    let (passed, detail) = match outcome {
        Ok(detail) => (true, detail),
        Err(detail) => (false, detail),
    };
    VectorResult {
        name: vector.name.clone(),
        passed,
        detail,
    }
}

fn check_accepted(
    vector: &GoldenVector,
    expr: &PolicyExpression,
    canonical: &str,
) -> Result<String, String> {
    let printed = expr.to_string();
    if printed != canonical {
        return Err(format!("canonical `{}`, expected `{}`", printed, canonical));
    }

    let attributes = AttributeSet::new(vector.attributes.iter().cloned())
        .map_err(|e| format!("bad vector attributes: {}", e))?;
    let admitted = evaluate(expr, &attributes, Timestamp(vector.now));
    if admitted != vector.admitted {
        return Err(format!("decided {}, expected {}", admitted, vector.admitted));
    }
    Ok(format!("admitted = {}", admitted))
}

/// Check all golden vectors.
pub fn verify_all_vectors() -> Vec<VectorResult> {
    all_vectors().iter().map(check_vector).collect()
}

/// The vectors as pretty JSON, for sharing with other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}
