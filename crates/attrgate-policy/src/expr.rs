//! Policy expression trees.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyParseError;
use crate::parser;

/// Comparison operator in a `date` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    /// Apply the comparator as `lhs <op> rhs`.
    pub fn apply(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed device policy.
///
/// `And` and `Or` nodes are n-ary and never directly contain a node of the
/// same kind; the constructors flatten such chains so that the canonical
/// [`Display`](fmt::Display) form parses back to an equal tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyExpression {
    /// True iff the attribute is present.
    Attribute(String),

    /// Compares the evaluation time against a literal.
    Date { op: Comparator, value: u64 },

    And(Vec<PolicyExpression>),

    Or(Vec<PolicyExpression>),

    /// True iff at least `k` children are true.
    Threshold { k: usize, children: Vec<PolicyExpression> },
}

impl PolicyExpression {
    /// Parse policy text.
    ///
    /// Either the whole input is accepted or an error with the offending
    /// byte position is returned.
    pub fn parse(input: &str) -> Result<Self, PolicyParseError> {
        parser::parse(input)
    }

    /// Conjunction of `children`, flattening nested conjunctions.
    pub fn and(children: Vec<PolicyExpression>) -> Self {
        Self::flatten(children, true)
    }

    /// Disjunction of `children`, flattening nested disjunctions.
    pub fn or(children: Vec<PolicyExpression>) -> Self {
        Self::flatten(children, false)
    }

    fn flatten(children: Vec<PolicyExpression>, conjunction: bool) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match (child, conjunction) {
                (PolicyExpression::And(inner), true) | (PolicyExpression::Or(inner), false) => {
                    flat.extend(inner)
                }
                (other, _) => flat.push(other),
            }
        }

        if flat.len() == 1 {
            return flat.remove(0);
        }
        if conjunction {
            PolicyExpression::And(flat)
        } else {
            PolicyExpression::Or(flat)
        }
    }

    /// All attribute names the policy refers to.
    pub fn attributes(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            PolicyExpression::Attribute(name) => {
                names.insert(name.as_str());
            }
            PolicyExpression::Date { .. } => {}
            PolicyExpression::And(children)
            | PolicyExpression::Or(children)
            | PolicyExpression::Threshold { children, .. } => {
                for child in children {
                    child.collect_attributes(names);
                }
            }
        }
    }

    /// Whether the policy has any time predicate.
    pub fn is_time_dependent(&self) -> bool {
        match self {
            PolicyExpression::Attribute(_) => false,
            PolicyExpression::Date { .. } => true,
            PolicyExpression::And(children)
            | PolicyExpression::Or(children)
            | PolicyExpression::Threshold { children, .. } => {
                children.iter().any(PolicyExpression::is_time_dependent)
            }
        }
    }
}

impl FromStr for PolicyExpression {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[PolicyExpression],
    separator: &str,
    parenthesize_or: bool,
) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        match child {
            PolicyExpression::Or(_) if parenthesize_or => write!(f, "({child})")?,
            _ => write!(f, "{child}")?,
        }
    }
    Ok(())
}

/// Canonical text form: minimal parentheses, single spaces.
impl fmt::Display for PolicyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyExpression::Attribute(name) => f.write_str(name),
            PolicyExpression::Date { op, value } => write!(f, "date {op} {value}"),
            PolicyExpression::And(children) => write_joined(f, children, " AND ", true),
            PolicyExpression::Or(children) => write_joined(f, children, " OR ", false),
            PolicyExpression::Threshold { k, children } => {
                write!(f, "{k} of (")?;
                write_joined(f, children, ", ", false)?;
                f.write_str(")")
            }
        }
    }
}
