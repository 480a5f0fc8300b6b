//! Regex-match rewriting
//!
//! A `matches(expr, pattern)` predicate with a literal pattern is turned into
//! a cheaper native predicate when the pattern is simple enough:
//!
//! | pattern            | rewrite                     |
//! |--------------------|-----------------------------|
//! | `""`               | `expr = ''`                 |
//! | `^abc$`            | `expr = 'abc'`              |
//! | `^abc`, `^abc.*`   | `startsWith(expr, 'abc')`   |
//! | `abc$`, `.*abc$`   | `endsWith(expr, 'abc')`     |
//! | `abc`, `.*abc.*`   | `contains(expr, 'abc')`     |
//! | `^(a\|b)$`         | `expr IN ('a', 'b')`        |
//! | `(a\|b)`           | `contains(..) OR contains(..)` |
//! | `a.b`, `^a.*b`     | `expr LIKE '%a_b%'`, `expr LIKE 'a%b%'` |
//!
//! Anything else keeps the native regex predicate.

use crate::error::QueryError;
use crate::expr::{ComparisonOp, Expr};
use crate::value::Value;
use crate::Result;

const METACHARACTERS: &[char] = &['.', '^', '$', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\'];

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Char(char),
    /// `.`
    AnyChar,
    /// `.*`
    AnyRun,
}

#[derive(Debug, PartialEq)]
enum Body {
    Pieces(Vec<Piece>),
    Alternation(Vec<String>),
}

#[derive(Debug, PartialEq)]
struct Shape {
    start_anchored: bool,
    end_anchored: bool,
    body: Body,
}

/// Rewrite `expr [NOT] REGEXP pattern`. `Ok(None)` means no cheaper form
/// exists and the predicate must stay as it is.
pub fn optimize(expr: &Expr, pattern: &str, negated: bool) -> Result<Option<Expr>> {
    let positive = match optimize_positive(expr, pattern)? {
        Some(e) => e,
        None => return Ok(None),
    };
    if negated {
        Ok(Some(negate(positive)))
    } else {
        Ok(Some(positive))
    }
}

fn optimize_positive(expr: &Expr, pattern: &str) -> Result<Option<Expr>> {
    if pattern.is_empty() {
        return Ok(Some(Expr::equals(expr.clone(), Expr::lit(""))));
    }
    let shape = match analyze(pattern)? {
        Some(shape) => shape,
        None => return Ok(None),
    };

    match shape.body {
        Body::Alternation(branches) => {
            if shape.start_anchored && shape.end_anchored {
                let values = branches.into_iter().map(Value::String).collect();
                return Ok(Some(Expr::in_list(expr.clone(), values)));
            }
            let operands = branches
                .into_iter()
                .map(|b| literal_predicate(expr, b, shape.start_anchored, shape.end_anchored))
                .collect();
            Ok(Some(Expr::or(operands)))
        }
        Body::Pieces(mut pieces) => {
            let mut start_anchored = shape.start_anchored;
            let mut end_anchored = shape.end_anchored;
            if pieces.first() == Some(&Piece::AnyRun) {
                while pieces.first() == Some(&Piece::AnyRun) {
                    pieces.remove(0);
                }
                start_anchored = false;
            }
            if pieces.last() == Some(&Piece::AnyRun) {
                while pieces.last() == Some(&Piece::AnyRun) {
                    pieces.pop();
                }
                end_anchored = false;
            }

            if pieces.is_empty() {
                // `^$` only matches the empty string; `^.*`, `.*` and friends
                // match everything and gain nothing from a rewrite.
                if start_anchored && end_anchored {
                    return Ok(Some(Expr::equals(expr.clone(), Expr::lit(""))));
                }
                return Ok(None);
            }

            let literal: Option<String> = pieces
                .iter()
                .map(|p| match p {
                    Piece::Char(c) => Some(*c),
                    _ => None,
                })
                .collect();

            match literal {
                Some(lit) => Ok(Some(literal_predicate(expr, lit, start_anchored, end_anchored))),
                None => Ok(Some(Expr::like(
                    expr.clone(),
                    like_pattern(&pieces, start_anchored, end_anchored),
                ))),
            }
        }
    }
}

fn literal_predicate(expr: &Expr, literal: String, start_anchored: bool, end_anchored: bool) -> Expr {
    let args = |lit: String| vec![expr.clone(), Expr::lit(lit)];
    match (start_anchored, end_anchored) {
        (true, true) => Expr::equals(expr.clone(), Expr::lit(literal)),
        (true, false) => Expr::function("startsWith", args(literal)),
        (false, true) => Expr::function("endsWith", args(literal)),
        (false, false) => Expr::function("contains", args(literal)),
    }
}

fn like_pattern(pieces: &[Piece], start_anchored: bool, end_anchored: bool) -> String {
    let mut like = String::new();
    if !start_anchored {
        like.push('%');
    }
    for piece in pieces {
        match piece {
            Piece::Char(c) => {
                if matches!(c, '%' | '_' | '\\') {
                    like.push('\\');
                }
                like.push(*c);
            }
            Piece::AnyChar => like.push('_'),
            Piece::AnyRun => like.push('%'),
        }
    }
    if !end_anchored {
        like.push('%');
    }
    like
}

/// Negate the specific node the positive rewrite produced.
fn negate(positive: Expr) -> Expr {
    match positive {
        Expr::Comparison { op, lhs, rhs } if op == ComparisonOp::Eq => Expr::Comparison {
            op: ComparisonOp::Ne,
            lhs,
            rhs,
        },
        Expr::In { expr, values, negated } => Expr::In {
            expr,
            values,
            negated: !negated,
        },
        Expr::Like { expr, pattern, negated } => Expr::Like {
            expr,
            pattern,
            negated: !negated,
        },
        // startsWith/endsWith/contains and alternation disjunctions
        other => Expr::not(other),
    }
}

fn is_escaped(chars: &[char], index: usize) -> bool {
    let backslashes = chars[..index].iter().rev().take_while(|c| **c == '\\').count();
    backslashes % 2 == 1
}

/// Decompose the pattern. `Ok(None)` when it uses constructs beyond literals,
/// `.`/`.*` wildcards, outer anchors and one flat alternation group.
fn analyze(pattern: &str) -> Result<Option<Shape>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut begin = 0;
    let mut end = chars.len();

    let start_anchored = chars.first() == Some(&'^');
    if start_anchored {
        begin = 1;
    }
    let end_anchored = end > begin && chars[end - 1] == '$' && !is_escaped(&chars, end - 1);
    if end_anchored {
        end -= 1;
    }
    let inner = &chars[begin..end];

    if let Some(branches) = parse_group(inner)? {
        let body = if branches.len() == 1 {
            Body::Pieces(branches[0].chars().map(Piece::Char).collect())
        } else {
            Body::Alternation(branches)
        };
        return Ok(Some(Shape {
            start_anchored,
            end_anchored,
            body,
        }));
    }

    Ok(parse_pieces(inner).map(|pieces| Shape {
        start_anchored,
        end_anchored,
        body: Body::Pieces(pieces),
    }))
}

/// `(a|b|c)` or `(?:a|b|c)` spanning the whole input, with literal branches.
fn parse_group(inner: &[char]) -> Result<Option<Vec<String>>> {
    if inner.len() < 2 || inner[0] != '(' || inner[inner.len() - 1] != ')' || is_escaped(inner, inner.len() - 1) {
        return Ok(None);
    }
    let mut content = &inner[1..inner.len() - 1];
    if content.starts_with(&['?', ':']) {
        content = &content[2..];
    }

    let mut branches = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < content.len() {
        let c = content[i];
        match c {
            '\\' => {
                let next = match content.get(i + 1) {
                    Some(n) => *n,
                    None => return Ok(None),
                };
                if next.is_ascii_alphanumeric() {
                    return Ok(None);
                }
                current.push(next);
                i += 2;
                continue;
            }
            '|' => branches.push(std::mem::take(&mut current)),
            c if METACHARACTERS.contains(&c) => return Ok(None),
            c => current.push(c),
        }
        i += 1;
    }
    branches.push(current);

    if branches.iter().any(String::is_empty) {
        return Ok(None);
    }
    if branches.len() > 1024 {
        return Err(QueryError::InvalidExpression(format!(
            "alternation with {} branches",
            branches.len()
        )));
    }
    Ok(Some(branches))
}

fn parse_pieces(inner: &[char]) -> Option<Vec<Piece>> {
    let mut pieces = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let c = inner[i];
        match c {
            '\\' => {
                let next = *inner.get(i + 1)?;
                // `\d`, `\w`, `\b` ... are classes or assertions, not literals
                if next.is_ascii_alphanumeric() {
                    return None;
                }
                pieces.push(Piece::Char(next));
                i += 2;
                continue;
            }
            '.' => {
                if inner.get(i + 1) == Some(&'*') {
                    pieces.push(Piece::AnyRun);
                    i += 2;
                    continue;
                }
                pieces.push(Piece::AnyChar);
            }
            c if METACHARACTERS.contains(&c) => return None,
            c => pieces.push(Piece::Char(c)),
        }
        i += 1;
    }
    Some(pieces)
}
