//! Attribute sets.
//!
//! An [`AttributeSet`] is the set of credential facts bound to one grant.
//! Order of insertion is irrelevant and duplicates collapse; the set is kept
//! sorted so its canonical byte form is stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Maximum length of one attribute token in bytes.
///
/// Registries store each attribute in a 32-byte slot.
pub const MAX_ATTRIBUTE_LEN: usize = 32;

/// Maximum number of attributes in one set.
pub const MAX_ATTRIBUTES: usize = 1024;

/// Policy keywords. A policy could never name an attribute spelled like one.
pub const RESERVED_TOKENS: [&str; 3] = ["AND", "OR", "of"];

/// Check a single attribute token against the allowed alphabet.
///
/// Tokens are non-empty, at most [`MAX_ATTRIBUTE_LEN`] bytes, and consist of
/// ASCII letters, digits and `_ . : -`. Policy keywords and all-digit tokens
/// are refused since a policy reads them as syntax.
pub fn validate_token(token: &str) -> Result<()> {
    let invalid = |reason| CoreError::InvalidAttributeToken {
        token: token.to_string(),
        reason,
    };

    if token.is_empty() {
        return Err(invalid("empty token"));
    }
    if token.len() > MAX_ATTRIBUTE_LEN {
        return Err(invalid("token longer than 32 bytes"));
    }
    if !token.chars().all(is_token_char) {
        return Err(invalid("token contains a disallowed character"));
    }
    if RESERVED_TOKENS.contains(&token) {
        return Err(invalid("token is a policy keyword"));
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("token is all digits"));
    }
    Ok(())
}

/// Whether `c` may appear in an attribute token.
pub fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
}

/// An immutable set of attribute names.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AttributeSet(BTreeSet<String>);

impl AttributeSet {
    /// Build a set from a list of tokens, collapsing duplicates.
    pub fn new<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for token in tokens {
            let token = token.into();
            validate_token(&token)?;
            set.insert(token);
            if set.len() > MAX_ATTRIBUTES {
                return Err(CoreError::TooManyAttributes {
                    max: MAX_ATTRIBUTES,
                });
            }
        }
        Ok(Self(set))
    }

    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate attribute names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Sorted list of attribute names.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    /// Canonical bytes: the set size as a big-endian u16, then each sorted
    /// name as a big-endian u16 length followed by its UTF-8 bytes.
    ///
    /// Both counts fit in a u16: sets hold at most [`MAX_ATTRIBUTES`] names
    /// of at most [`MAX_ATTRIBUTE_LEN`] bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.0.iter().map(|a| a.len() + 2).sum::<usize>());
        buf.extend_from_slice(&u16_len(self.0.len()).to_be_bytes());
        for name in &self.0 {
            buf.extend_from_slice(&u16_len(name.len()).to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
        }
        buf
    }
}

fn u16_len(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

impl TryFrom<Vec<String>> for AttributeSet {
    type Error = CoreError;

    fn try_from(tokens: Vec<String>) -> Result<Self> {
        Self::new(tokens)
    }
}

impl From<AttributeSet> for Vec<String> {
    fn from(set: AttributeSet) -> Self {
        set.0.into_iter().collect()
    }
}

/// Parses a comma-separated list such as `"admin, it_departement"`.
impl FromStr for AttributeSet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        Self::new(s.split(',').map(str::trim))
    }
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{}", names.join(", "))
    }
}
