//! Tokenizer for the policy language.

use std::fmt;

use attrgate_core::attributes::is_token_char;

use crate::error::{ParseErrorKind, PolicyParseError, Result};
use crate::expr::Comparator;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    LParen,
    RParen,
    Comma,
    And,
    Or,
    /// The `of` in a threshold gate such as `2 of (a, b, c)`.
    Of,
    Cmp(Comparator),
    Int(u64),
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Of => f.write_str("of"),
            Token::Cmp(op) => write!(f, "{op}"),
            Token::Int(n) => write!(f, "{n}"),
            Token::Ident(name) => f.write_str(name),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Split `input` into tokens.
///
/// Whitespace between tokens is ignored. Keywords `AND` and `OR` are
/// case-sensitive; `and` lexes as an ordinary name.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '<' | '>' | '=' | '!' => {
                chars.next();
                let followed_by_eq = matches!(chars.peek(), Some(&(_, '=')));
                let op = match (c, followed_by_eq) {
                    ('<', false) => Comparator::Lt,
                    ('<', true) => Comparator::Le,
                    ('>', false) => Comparator::Gt,
                    ('>', true) => Comparator::Ge,
                    ('=', true) => Comparator::Eq,
                    ('!', true) => Comparator::Ne,
                    _ => {
                        return Err(PolicyParseError::new(
                            start,
                            ParseErrorKind::UnknownCharacter(c),
                        ))
                    }
                };
                if followed_by_eq {
                    chars.next();
                }
                Token::Cmp(op)
            }
            c if is_token_char(c) => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !is_token_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                word_token(&input[start..end], start)?
            }
            other => {
                return Err(PolicyParseError::new(
                    start,
                    ParseErrorKind::UnknownCharacter(other),
                ))
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
    }

    Ok(tokens)
}

fn word_token(word: &str, position: usize) -> Result<Token> {
    if word.bytes().all(|b| b.is_ascii_digit()) {
        return word.parse::<u64>().map(Token::Int).map_err(|_| {
            PolicyParseError::new(position, ParseErrorKind::IntegerOverflow(word.to_string()))
        });
    }

    Ok(match word {
        "AND" => Token::And,
        "OR" => Token::Or,
        "of" => Token::Of,
        _ => Token::Ident(word.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_sample_policy() {
        assert_eq!(
            kinds("(admin AND date > 15434456322)"),
            vec![
                Token::LParen,
                Token::Ident("admin".into()),
                Token::And,
                Token::Ident("date".into()),
                Token::Cmp(Comparator::Gt),
                Token::Int(15434456322),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("  a  OR\tb").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![2, 5, 8]);
    }

    #[test]
    fn test_comparators() {
        assert_eq!(
            kinds("< <= > >= == !="),
            vec![
                Token::Cmp(Comparator::Lt),
                Token::Cmp(Comparator::Le),
                Token::Cmp(Comparator::Gt),
                Token::Cmp(Comparator::Ge),
                Token::Cmp(Comparator::Eq),
                Token::Cmp(Comparator::Ne),
            ]
        );
        // No whitespace needed around operators.
        assert_eq!(kinds("date>=5").len(), 3);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(kinds("and"), vec![Token::Ident("and".into())]);
        assert_eq!(kinds("Or"), vec![Token::Ident("Or".into())]);
    }

    #[test]
    fn test_unknown_characters() {
        let err = tokenize("admin & guest").unwrap_err();
        assert_eq!(err.position, 6);
        assert_eq!(err.kind, ParseErrorKind::UnknownCharacter('&'));

        let err = tokenize("date = 5").unwrap_err();
        assert_eq!(err.position, 5);
    }

    #[test]
    fn test_integer_overflow() {
        let err = tokenize("date > 99999999999999999999999").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::IntegerOverflow(_)));
        assert_eq!(err.position, 7);
    }
}
