//! Expression rewriting shared by dialects
//!
//! [`transform_up`] rebuilds a tree bottom-up, handing every node to a rule
//! function. [`apply_rule`] runs one rule and falls back to the original
//! node if the rule errors or panics, so a broken rewrite can only cost
//! performance, never correctness.

pub mod has_token;
pub mod regex_match;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::expr::{Expr, WindowSpec};
use crate::metrics::{OPTIMIZER_FALLBACKS_TOTAL, OPTIMIZER_REWRITES_TOTAL};
use crate::Result;

/// Rebuild `expr` bottom-up, passing each node (children already rewritten)
/// to `rule`.
pub fn transform_up(expr: Expr, rule: &mut impl FnMut(Expr) -> Expr) -> Expr {
    let rebuilt = match expr {
        Expr::Identifier(_) | Expr::Literal(_) | Expr::Timestamp(_) => expr,
        Expr::Comparison { op, lhs, rhs } => Expr::Comparison {
            op,
            lhs: Box::new(transform_up(*lhs, rule)),
            rhs: Box::new(transform_up(*rhs, rule)),
        },
        Expr::Arithmetic { op, lhs, rhs } => Expr::Arithmetic {
            op,
            lhs: Box::new(transform_up(*lhs, rule)),
            rhs: Box::new(transform_up(*rhs, rule)),
        },
        Expr::Logical { op, operands } => Expr::Logical {
            op,
            operands: operands.into_iter().map(|o| transform_up(o, rule)).collect(),
        },
        Expr::Not(inner) => Expr::Not(Box::new(transform_up(*inner, rule))),
        Expr::In {
            expr,
            values,
            negated,
        } => Expr::In {
            expr: Box::new(transform_up(*expr, rule)),
            values,
            negated,
        },
        Expr::Like {
            expr,
            pattern,
            negated,
        } => Expr::Like {
            expr: Box::new(transform_up(*expr, rule)),
            pattern,
            negated,
        },
        Expr::RegexMatch {
            expr,
            pattern,
            negated,
        } => Expr::RegexMatch {
            expr: Box::new(transform_up(*expr, rule)),
            pattern,
            negated,
        },
        Expr::Function { name, args } => Expr::Function {
            name,
            args: args.into_iter().map(|a| transform_up(a, rule)).collect(),
        },
        Expr::Window(spec) => Expr::Window(WindowSpec {
            argument: Box::new(transform_up(*spec.argument, rule)),
            ..spec
        }),
    };
    rule(rebuilt)
}

/// Run a single named rewrite on `original`.
///
/// `Ok(Some(_))` replaces the node, `Ok(None)` keeps it. Errors and panics
/// are logged and counted, and the original node is kept.
pub fn apply_rule<F>(name: &'static str, original: Expr, rule: F) -> Expr
where
    F: FnOnce(&Expr) -> Result<Option<Expr>>,
{
    match catch_unwind(AssertUnwindSafe(|| rule(&original))) {
        Ok(Ok(Some(rewritten))) => {
            debug!(rule = name, from = %original, to = %rewritten, "expression rewritten");
            OPTIMIZER_REWRITES_TOTAL.with_label_values(&[name]).inc();
            rewritten
        }
        Ok(Ok(None)) => original,
        Ok(Err(e)) => {
            warn!(rule = name, expr = %original, error = %e, "rewrite failed, keeping original expression");
            OPTIMIZER_FALLBACKS_TOTAL.inc();
            original
        }
        Err(_) => {
            warn!(rule = name, expr = %original, "rewrite panicked, keeping original expression");
            OPTIMIZER_FALLBACKS_TOTAL.inc();
            original
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    #[test]
    fn test_transform_up_visits_children_first() {
        let expr = Expr::function("f", vec![Expr::function("g", vec![Expr::ident("x")])]);
        let mut visited = Vec::new();
        let out = transform_up(expr.clone(), &mut |e| {
            visited.push(e.to_string());
            e
        });
        assert_eq!(out, expr);
        assert_eq!(visited, vec!["x", "g(x)", "f(g(x))"]);
    }

    #[test]
    fn test_apply_rule_falls_back_on_error() {
        let original = Expr::ident("x");
        let out = apply_rule("failing", original.clone(), |_| {
            Err(QueryError::InvalidExpression("boom".to_string()))
        });
        assert_eq!(out, original);
    }

    #[test]
    fn test_apply_rule_falls_back_on_panic() {
        let original = Expr::ident("x");
        let out = apply_rule("panicking", original.clone(), |_| panic!("bad rule"));
        assert_eq!(out, original);
    }

    #[test]
    fn test_apply_rule_replaces() {
        let out = apply_rule("rename", Expr::ident("x"), |_| Ok(Some(Expr::ident("y"))));
        assert_eq!(out, Expr::ident("y"));
    }
}
