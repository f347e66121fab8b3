//! Parser for enrichment-rule conditions.
//!
//! The grammar is deliberately closed; no general expression evaluation:
//!
//! ```text
//! expr   := and ( "||" and )*
//! and    := term ( "&&" term )*
//! term   := "has_" path
//!         | path "==" string-literal
//!         | path "!=" string-literal
//! path   := ident ( "." ident )*
//! ```
//!
//! Comparisons read the slot at `path` as a string; a missing slot compares
//! as the empty string.

use thiserror::Error;

use crate::slots::{SlotMap, is_filled, slot_as_string, slot_lookup};

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("expected {expected}, found {found}")]
    Unexpected { expected: &'static str, found: String },
    #[error("empty condition")]
    Empty,
    #[error("trailing input after condition: {0}")]
    TrailingInput(String),
}

// ── Lexer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    StringLit(String),
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
}

fn lex(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ConditionError::UnexpectedChar('&', i));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ConditionError::UnexpectedChar('|', i));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ConditionError::UnexpectedChar('=', i));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(ConditionError::UnexpectedChar('!', i));
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(ConditionError::UnterminatedString);
                }
                tokens.push(Token::StringLit(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Path(chars[start..i].iter().collect()));
            }
            other => return Err(ConditionError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

// ── Parser ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Has(String),
    Eq(String, String),
    Ne(String, String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expr(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_term()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.next();
            let right = self.parse_term()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ConditionError> {
        let Some(token) = self.next() else {
            return Err(ConditionError::Unexpected {
                expected: "a predicate",
                found: "end of input".to_string(),
            });
        };
        let Token::Path(path) = token else {
            return Err(ConditionError::Unexpected {
                expected: "a slot path or has_ predicate",
                found: format!("{token:?}"),
            });
        };

        if let Some(slot) = path.strip_prefix("has_") {
            if slot.is_empty() {
                return Err(ConditionError::Unexpected {
                    expected: "a slot path after has_",
                    found: "nothing".to_string(),
                });
            }
            return Ok(Expr::Has(slot.to_string()));
        }

        match self.next() {
            Some(Token::EqEq) => match self.next() {
                Some(Token::StringLit(lit)) => Ok(Expr::Eq(path, lit)),
                other => Err(ConditionError::Unexpected {
                    expected: "a string literal after ==",
                    found: format!("{other:?}"),
                }),
            },
            Some(Token::NotEq) => match self.next() {
                Some(Token::StringLit(lit)) => Ok(Expr::Ne(path, lit)),
                other => Err(ConditionError::Unexpected {
                    expected: "a string literal after !=",
                    found: format!("{other:?}"),
                }),
            },
            other => Err(ConditionError::Unexpected {
                expected: "== or != after a slot path",
                found: format!("{other:?}"),
            }),
        }
    }
}

/// A parsed, evaluatable rule condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            let rest: Vec<String> =
                parser.tokens[parser.pos..].iter().map(|t| format!("{t:?}")).collect();
            return Err(ConditionError::TrailingInput(rest.join(" ")));
        }
        Ok(Self { expr })
    }

    pub fn evaluate(&self, slots: &SlotMap) -> bool {
        eval(&self.expr, slots)
    }
}

fn eval(expr: &Expr, slots: &SlotMap) -> bool {
    match expr {
        Expr::Has(path) => is_filled(slot_lookup(slots, path)),
        Expr::Eq(path, literal) => lookup_string(slots, path) == *literal,
        Expr::Ne(path, literal) => lookup_string(slots, path) != *literal,
        Expr::And(left, right) => eval(left, slots) && eval(right, slots),
        Expr::Or(left, right) => eval(left, slots) || eval(right, slots),
    }
}

fn lookup_string(slots: &SlotMap, path: &str) -> String {
    slot_lookup(slots, path).map(slot_as_string).unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slots(value: serde_json::Value) -> SlotMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn has_predicate_checks_filledness() {
        let cond = Condition::parse("has_destination").unwrap();
        assert!(cond.evaluate(&slots(json!({ "destination": "Dallas" }))));
        assert!(!cond.evaluate(&slots(json!({ "destination": "unknown" }))));
        assert!(!cond.evaluate(&slots(json!({}))));
    }

    #[test]
    fn has_predicate_reaches_nested_paths() {
        let cond = Condition::parse("has_timing.date").unwrap();
        assert!(cond.evaluate(&slots(json!({ "timing": { "date": "Friday" } }))));
        assert!(!cond.evaluate(&slots(json!({ "timing": { "date": "" } }))));
    }

    #[test]
    fn equality_compares_against_literal() {
        let cond = Condition::parse("transportation == \"driving\"").unwrap();
        assert!(cond.evaluate(&slots(json!({ "transportation": "driving" }))));
        assert!(!cond.evaluate(&slots(json!({ "transportation": "flying" }))));
        // Missing slot compares as empty string.
        assert!(!cond.evaluate(&slots(json!({}))));
    }

    #[test]
    fn inequality_is_true_for_missing_slots() {
        let cond = Condition::parse("budget != \"flexible\"").unwrap();
        assert!(cond.evaluate(&slots(json!({}))));
        assert!(!cond.evaluate(&slots(json!({ "budget": "flexible" }))));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // a || b && c parses as a || (b && c)
        let cond =
            Condition::parse("has_a || has_b && has_c").unwrap();
        assert!(cond.evaluate(&slots(json!({ "a": "x" }))));
        assert!(cond.evaluate(&slots(json!({ "b": "x", "c": "y" }))));
        assert!(!cond.evaluate(&slots(json!({ "b": "x" }))));
    }

    #[test]
    fn single_quoted_literals_parse() {
        let cond = Condition::parse("mode == 'smart'").unwrap();
        assert!(cond.evaluate(&slots(json!({ "mode": "smart" }))));
    }

    #[test]
    fn parse_errors_are_reported() {
        assert_eq!(Condition::parse(""), Err(ConditionError::Empty));
        assert!(matches!(Condition::parse("has_"), Err(ConditionError::Unexpected { .. })));
        assert!(matches!(
            Condition::parse("budget =="),
            Err(ConditionError::Unexpected { .. })
        ));
        assert!(matches!(
            Condition::parse("budget == \"open"),
            Err(ConditionError::UnterminatedString)
        ));
        assert!(matches!(Condition::parse("a & b"), Err(ConditionError::UnexpectedChar('&', _))));
        assert!(matches!(
            Condition::parse("has_a has_b"),
            Err(ConditionError::TrailingInput(_))
        ));
    }

    #[test]
    fn no_general_expression_evaluation() {
        // Parentheses are outside the grammar on purpose.
        assert!(matches!(
            Condition::parse("(has_a)"),
            Err(ConditionError::UnexpectedChar('(', 0))
        ));
    }
}
