//! Recursive-descent parser for the policy language.
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ("OR" and_expr)*
//! and_expr   := term ("AND" term)*
//! term       := "(" expr ")" | threshold | comparison | attribute
//! threshold  := integer "of" "(" expr ("," expr)* ")"
//! comparison := "date" comparator integer
//! ```

use crate::error::{ParseErrorKind, PolicyParseError, Result};
use crate::expr::{Comparator, PolicyExpression};
use crate::lexer::{tokenize, Spanned, Token};

/// Maximum nesting of parentheses and threshold gates.
pub const MAX_DEPTH: usize = 64;

/// The only field a comparator may be applied to.
pub const DATE_FIELD: &str = "date";

pub(crate) fn parse(input: &str) -> Result<PolicyExpression> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(PolicyParseError::new(0, ParseErrorKind::Empty));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_or(0)?;

    if let Some(extra) = parser.peek() {
        let kind = match extra.token {
            Token::RParen => ParseErrorKind::UnbalancedParenthesis,
            ref other => ParseErrorKind::UnexpectedToken(other.to_string()),
        };
        return Err(PolicyParseError::new(extra.position, kind));
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn next(&mut self) -> Result<Spanned> {
        let spanned = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| PolicyParseError::new(self.end, ParseErrorKind::UnexpectedEnd))?;
        self.pos += 1;
        Ok(spanned)
    }

    fn unexpected(spanned: &Spanned) -> PolicyParseError {
        PolicyParseError::new(
            spanned.position,
            ParseErrorKind::UnexpectedToken(spanned.token.to_string()),
        )
    }

    /// Consume a `)` closing the group opened at `open`.
    fn close_paren(&mut self, open: usize) -> Result<()> {
        match self.peek().cloned() {
            Some(Spanned {
                token: Token::RParen,
                ..
            }) => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(Self::unexpected(&other)),
            None => Err(PolicyParseError::new(
                open,
                ParseErrorKind::UnbalancedParenthesis,
            )),
        }
    }

    fn parse_or(&mut self, depth: usize) -> Result<PolicyExpression> {
        let mut children = vec![self.parse_and(depth)?];
        while self.peek_token() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.parse_and(depth)?);
        }
        Ok(PolicyExpression::or(children))
    }

    fn parse_and(&mut self, depth: usize) -> Result<PolicyExpression> {
        let mut children = vec![self.parse_term(depth)?];
        while self.peek_token() == Some(&Token::And) {
            self.pos += 1;
            children.push(self.parse_term(depth)?);
        }
        Ok(PolicyExpression::and(children))
    }

    fn parse_term(&mut self, depth: usize) -> Result<PolicyExpression> {
        let spanned = self.next()?;
        match spanned.token {
            Token::LParen => {
                let depth = Self::descend(depth, spanned.position)?;
                let inner = self.parse_or(depth)?;
                self.close_paren(spanned.position)?;
                Ok(inner)
            }
            Token::Int(k) => self.parse_threshold(k, spanned.position, depth),
            Token::Ident(name) => match self.peek_token() {
                Some(&Token::Cmp(op)) => {
                    self.pos += 1;
                    self.parse_comparison(name, op, spanned.position)
                }
                _ => Ok(PolicyExpression::Attribute(name)),
            },
            Token::RParen => Err(PolicyParseError::new(
                spanned.position,
                ParseErrorKind::UnbalancedParenthesis,
            )),
            _ => Err(Self::unexpected(&spanned)),
        }
    }

    fn parse_comparison(
        &mut self,
        field: String,
        op: Comparator,
        position: usize,
    ) -> Result<PolicyExpression> {
        if field != DATE_FIELD {
            return Err(PolicyParseError::new(
                position,
                ParseErrorKind::UnsupportedComparisonField(field),
            ));
        }

        match self.peek().cloned() {
            Some(Spanned {
                token: Token::Int(value),
                ..
            }) => {
                self.pos += 1;
                Ok(PolicyExpression::Date { op, value })
            }
            Some(other) => Err(PolicyParseError::new(
                other.position,
                ParseErrorKind::ExpectedInteger,
            )),
            None => Err(PolicyParseError::new(
                self.end,
                ParseErrorKind::ExpectedInteger,
            )),
        }
    }

    fn parse_threshold(&mut self, k: u64, position: usize, depth: usize) -> Result<PolicyExpression> {
        let of = self.next()?;
        if of.token != Token::Of {
            return Err(Self::unexpected(&of));
        }

        let open = self.next()?;
        if open.token != Token::LParen {
            return Err(Self::unexpected(&open));
        }
        let depth = Self::descend(depth, open.position)?;

        let mut children = vec![self.parse_or(depth)?];
        while self.peek_token() == Some(&Token::Comma) {
            self.pos += 1;
            children.push(self.parse_or(depth)?);
        }
        self.close_paren(open.position)?;

        let n = children.len();
        match usize::try_from(k) {
            Ok(k) if k >= 1 && k <= n => Ok(PolicyExpression::Threshold { k, children }),
            _ => Err(PolicyParseError::new(
                position,
                ParseErrorKind::ThresholdOutOfRange { k, n },
            )),
        }
    }

    fn descend(depth: usize, position: usize) -> Result<usize> {
        let depth = depth + 1;
        if depth > MAX_DEPTH {
            return Err(PolicyParseError::new(
                position,
                ParseErrorKind::TooDeep(MAX_DEPTH),
            ));
        }
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attr(name: &str) -> PolicyExpression {
        PolicyExpression::Attribute(name.into())
    }

    fn err_of(input: &str) -> PolicyParseError {
        parse(input).unwrap_err()
    }

    #[test]
    fn test_parse_sample_policy() {
        let expr = parse("(admin AND date > 15434456322)").unwrap();
        assert_eq!(
            expr,
            PolicyExpression::And(vec![
                attr("admin"),
                PolicyExpression::Date {
                    op: Comparator::Gt,
                    value: 15434456322,
                },
            ])
        );
        assert_eq!(expr.to_string(), "admin AND date > 15434456322");
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a OR b AND c").unwrap();
        assert_eq!(
            expr,
            PolicyExpression::Or(vec![
                attr("a"),
                PolicyExpression::And(vec![attr("b"), attr("c")]),
            ])
        );
    }

    #[test]
    fn test_chains_are_flattened() {
        assert_eq!(
            parse("a AND (b AND c) AND d").unwrap(),
            PolicyExpression::And(vec![attr("a"), attr("b"), attr("c"), attr("d")])
        );
        assert_eq!(
            parse("((a OR b)) OR c").unwrap(),
            PolicyExpression::Or(vec![attr("a"), attr("b"), attr("c")])
        );
    }

    #[test]
    fn test_bare_date_is_an_attribute() {
        assert_eq!(parse("date").unwrap(), attr("date"));
    }

    #[test]
    fn test_threshold() {
        let expr = parse("2 of (a, b OR c, date < 10)").unwrap();
        assert_eq!(
            expr,
            PolicyExpression::Threshold {
                k: 2,
                children: vec![
                    attr("a"),
                    PolicyExpression::Or(vec![attr("b"), attr("c")]),
                    PolicyExpression::Date {
                        op: Comparator::Lt,
                        value: 10,
                    },
                ],
            }
        );
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = err_of("3 of (a, b)");
        assert_eq!(err.position, 0);
        assert_eq!(err.kind, ParseErrorKind::ThresholdOutOfRange { k: 3, n: 2 });

        let err = err_of("x AND 0 of (a)");
        assert_eq!(err.position, 6);
        assert_eq!(err.kind, ParseErrorKind::ThresholdOutOfRange { k: 0, n: 1 });
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(err_of("").kind, ParseErrorKind::Empty);
        assert_eq!(err_of("   \n").kind, ParseErrorKind::Empty);
    }

    #[test]
    fn test_rejects_unbalanced_parens() {
        let err = err_of("(admin AND guest");
        assert_eq!(err.kind, ParseErrorKind::UnbalancedParenthesis);
        assert_eq!(err.position, 0);

        let err = err_of("admin)");
        assert_eq!(err.kind, ParseErrorKind::UnbalancedParenthesis);
        assert_eq!(err.position, 5);

        let err = err_of(")");
        assert_eq!(err.kind, ParseErrorKind::UnbalancedParenthesis);
    }

    #[test]
    fn test_rejects_comparison_on_other_fields() {
        let err = err_of("admin AND level > 3");
        assert_eq!(
            err.kind,
            ParseErrorKind::UnsupportedComparisonField("level".into())
        );
        assert_eq!(err.position, 10);
    }

    #[test]
    fn test_rejects_missing_integer() {
        assert_eq!(err_of("date >").kind, ParseErrorKind::ExpectedInteger);
        assert_eq!(err_of("date > admin").kind, ParseErrorKind::ExpectedInteger);
        assert_eq!(err_of("date > admin").position, 7);
    }

    #[test]
    fn test_rejects_dangling_operators() {
        assert_eq!(err_of("admin AND").kind, ParseErrorKind::UnexpectedEnd);
        assert_eq!(
            err_of("OR admin").kind,
            ParseErrorKind::UnexpectedToken("OR".into())
        );
        assert_eq!(
            err_of("admin guest").kind,
            ParseErrorKind::UnexpectedToken("guest".into())
        );
        assert_eq!(
            err_of("()").kind,
            ParseErrorKind::UnbalancedParenthesis
        );
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let deep = format!("{}a{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(err_of(&deep).kind, ParseErrorKind::TooDeep(MAX_DEPTH));

        let ok = format!("{}a{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(parse(&ok).unwrap(), attr("a"));
    }

    fn arb_expr() -> impl Strategy<Value = PolicyExpression> {
        let leaf = prop_oneof![
            "[a-z][a-z0-9_]{0,8}"
                .prop_filter("keywords", |s| s != "of" && s != "date")
                .prop_map(PolicyExpression::Attribute),
            (
                prop_oneof![
                    Just(Comparator::Lt),
                    Just(Comparator::Le),
                    Just(Comparator::Gt),
                    Just(Comparator::Ge),
                    Just(Comparator::Eq),
                    Just(Comparator::Ne),
                ],
                any::<u64>()
            )
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

    proptest! {
        #[test]
        fn display_reparses_to_equal_tree(expr in arb_expr()) {
            let text = expr.to_string();
            let reparsed = parse(&text).unwrap();
            prop_assert_eq!(reparsed, expr);
        }

        #[test]
        fn parse_never_panics(input in "[ -~]{0,64}") {
            let _ = parse(&input);
        }
    }
}
