//! # attrgate policy
//!
//! The boolean policy language devices use to decide local admission.
//!
//! A policy names attributes, compares the evaluation time against integer
//! literals, and combines both with `AND`, `OR`, parentheses and threshold
//! gates:
//!
//! ```text
//! admin AND date > 15434456322
//! (ops OR admin) AND date < 1900000000
//! 2 of (admin, ops, auditor)
//! ```
//!
//! `AND` binds tighter than `OR`. Keywords are case-sensitive.
//!
//! ## Usage
//!
//! ```rust
//! use attrgate_core::{AttributeSet, Timestamp};
//! use attrgate_policy::PolicyExpression;
//!
//! let policy: PolicyExpression = "(admin AND date > 15434456322)".parse().unwrap();
//! let attrs = AttributeSet::new(["admin"]).unwrap();
//!
//! assert!(policy.evaluate(&attrs, Timestamp(15434456323)));
//! assert!(!policy.evaluate(&attrs, Timestamp(1)));
//! assert_eq!(policy.to_string(), "admin AND date > 15434456322");
//! ```

pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod parser;

pub use error::{ParseErrorKind, PolicyParseError, Result};
pub use eval::{evaluate, evaluate_str};
pub use expr::{Comparator, PolicyExpression};
pub use parser::{DATE_FIELD, MAX_DEPTH};
