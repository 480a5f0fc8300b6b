//! Token search rewriting
//!
//! ClickHouse's `hasToken(haystack, needle)` only accepts a needle that is a
//! single token (no separators). A needle containing separators is turned
//! into a token-index friendly pre-filter on its longest token, ANDed with a
//! substring `LIKE` that keeps the exact semantics.

use crate::expr::Expr;

/// ClickHouse token characters: ASCII alphanumerics and anything non-ASCII.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || !c.is_ascii()
}

fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Rewrite `hasToken(expr, 'needle')`. Returns `None` when the needle is
/// already a single token or is not a string literal.
pub fn optimize(args: &[Expr]) -> Option<Expr> {
    let [haystack, needle] = args else {
        return None;
    };
    let needle = needle.as_string_literal()?;
    if needle.is_empty() || needle.chars().all(is_token_char) {
        return None;
    }

    let like = Expr::like(haystack.clone(), escape_like(needle));
    let longest = needle
        .split(|c: char| !is_token_char(c))
        .filter(|t| !t.is_empty())
        .max_by_key(|t| t.chars().count());

    match longest {
        Some(token) => Expr::and_all([
            Expr::function("hasToken", vec![haystack.clone(), Expr::lit(token)]),
            like,
        ]),
        None => Some(like),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(needle: &str) -> Vec<Expr> {
        vec![Expr::ident("body"), Expr::lit(needle)]
    }

    #[test]
    fn test_single_token_is_kept() {
        assert_eq!(optimize(&args("timeout")), None);
        assert_eq!(optimize(&args("错误")), None);
    }

    #[test]
    fn test_needle_with_separators_becomes_compound_like() {
        let rewritten = optimize(&args("connection reset.by")).unwrap();
        assert_eq!(
            rewritten,
            Expr::and_all([
                Expr::function("hasToken", vec![Expr::ident("body"), Expr::lit("connection")]),
                Expr::like(Expr::ident("body"), "%connection reset.by%"),
            ])
            .unwrap()
        );
    }

    #[test]
    fn test_underscore_separates_tokens() {
        let rewritten = optimize(&args("user_id")).unwrap();
        assert_eq!(
            rewritten,
            Expr::and_all([
                Expr::function("hasToken", vec![Expr::ident("body"), Expr::lit("user")]),
                Expr::like(Expr::ident("body"), "%user\\_id%"),
            ])
            .unwrap()
        );
    }

    #[test]
    fn test_separators_only() {
        assert_eq!(
            optimize(&args("%-")),
            Some(Expr::like(Expr::ident("body"), "%\\%-%"))
        );
    }

    #[test]
    fn test_non_literal_needle() {
        assert_eq!(optimize(&[Expr::ident("a"), Expr::ident("b")]), None);
    }
}
