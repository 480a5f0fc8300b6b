//! Backend-neutral expression tree
//!
//! Filters, selector expressions and window specifications share one tagged
//! enum. Dialects rewrite it with exhaustive `match`es (see
//! [`crate::dialect`]) and the SQL generator renders it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::value::Value;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    pub fn negate(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Eq => ComparisonOp::Ne,
            ComparisonOp::Ne => ComparisonOp::Eq,
            ComparisonOp::Lt => ComparisonOp::Ge,
            ComparisonOp::Le => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::Le,
            ComparisonOp::Ge => ComparisonOp::Lt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn keyword(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }
}

/// Moving aggregate over a trailing time range, evaluated in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Aggregate applied over the window. Only `sum` is evaluated.
    pub function: String,
    pub argument: Box<Expr>,
    pub partition_by: Vec<String>,
    pub order_by: String,
    /// Trailing range in milliseconds.
    pub window_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Identifier(String),
    Literal(Value),
    /// Point in time as epoch milliseconds; rendered by the dialect.
    Timestamp(i64),
    Comparison {
        op: ComparisonOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        operands: Vec<Expr>,
    },
    Not(Box<Expr>),
    In {
        expr: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
    RegexMatch {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Arithmetic {
        op: ArithmeticOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Window(WindowSpec),
}

/// Accepted argument counts, inclusive. Unknown functions are passed through
/// to the backend unchecked.
fn function_arity(name: &str) -> Option<(usize, usize)> {
    let arity = match name.to_ascii_lowercase().as_str() {
        "count" => (0, 1),
        "sum" | "min" | "max" | "avg" | "first" | "last" => (1, 1),
        "summerge" | "countmerge" => (1, 1),
        "argmin" | "argmax" => (2, 2),
        "startswith" | "endswith" | "contains" | "hastoken" => (2, 2),
        _ => return None,
    };
    Some(arity)
}

const AGGREGATES: &[&str] = &[
    "count", "sum", "min", "max", "avg", "first", "last", "argmin", "argmax", "summerge",
    "countmerge",
];

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Identifier(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn compare(op: ComparisonOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn equals(lhs: Expr, rhs: Expr) -> Expr {
        Expr::compare(ComparisonOp::Eq, lhs, rhs)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn matches(expr: Expr, pattern: impl Into<String>) -> Expr {
        Expr::RegexMatch {
            expr: Box::new(expr),
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn not_matches(expr: Expr, pattern: impl Into<String>) -> Expr {
        Expr::RegexMatch {
            expr: Box::new(expr),
            pattern: pattern.into(),
            negated: true,
        }
    }

    pub fn like(expr: Expr, pattern: impl Into<String>) -> Expr {
        Expr::Like {
            expr: Box::new(expr),
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn in_list(expr: Expr, values: Vec<Value>) -> Expr {
        Expr::In {
            expr: Box::new(expr),
            values,
            negated: false,
        }
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn or(operands: Vec<Expr>) -> Expr {
        Expr::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    /// AND-combine the operands, flattening nested conjunctions. A single
    /// operand is returned as is; none yields `None`.
    pub fn and_all(operands: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        let mut flat = Vec::new();
        for operand in operands {
            match operand {
                Expr::Logical {
                    op: LogicalOp::And,
                    operands,
                } => flat.extend(operands),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::Logical {
                op: LogicalOp::And,
                operands: flat,
            }),
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Expr::Window(_))
    }

    /// Every identifier referenced by the tree, in visiting order.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Identifier(name) => out.push(name),
            Expr::Literal(_) | Expr::Timestamp(_) => {}
            Expr::Comparison { lhs, rhs, .. } | Expr::Arithmetic { lhs, rhs, .. } => {
                lhs.collect_identifiers(out);
                rhs.collect_identifiers(out);
            }
            Expr::Logical { operands, .. } => {
                for operand in operands {
                    operand.collect_identifiers(out);
                }
            }
            Expr::Not(inner) => inner.collect_identifiers(out),
            Expr::In { expr, .. } | Expr::Like { expr, .. } | Expr::RegexMatch { expr, .. } => {
                expr.collect_identifiers(out)
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_identifiers(out);
                }
            }
            Expr::Window(spec) => {
                spec.argument.collect_identifiers(out);
                out.extend(spec.partition_by.iter().map(String::as_str));
                out.push(&spec.order_by);
            }
        }
    }

    /// Whether the expression contains an aggregate call (outside windows).
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Function { name, args } => {
                AGGREGATES.contains(&name.to_ascii_lowercase().as_str())
                    || args.iter().any(Expr::has_aggregate)
            }
            Expr::Comparison { lhs, rhs, .. } | Expr::Arithmetic { lhs, rhs, .. } => {
                lhs.has_aggregate() || rhs.has_aggregate()
            }
            Expr::Logical { operands, .. } => operands.iter().any(Expr::has_aggregate),
            Expr::Not(inner) => inner.has_aggregate(),
            Expr::In { expr, .. } | Expr::Like { expr, .. } | Expr::RegexMatch { expr, .. } => {
                expr.has_aggregate()
            }
            Expr::Identifier(_) | Expr::Literal(_) | Expr::Timestamp(_) | Expr::Window(_) => false,
        }
    }

    /// Structural checks: known function arities, windows only at the top
    /// level, positive window ranges.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(true)
    }

    fn validate_at(&self, top_level: bool) -> Result<()> {
        match self {
            Expr::Identifier(name) if name.is_empty() => {
                Err(QueryError::InvalidExpression("empty identifier".to_string()))
            }
            Expr::Identifier(_) | Expr::Literal(_) | Expr::Timestamp(_) => Ok(()),
            Expr::Comparison { lhs, rhs, .. } | Expr::Arithmetic { lhs, rhs, .. } => {
                lhs.validate_at(false)?;
                rhs.validate_at(false)
            }
            Expr::Logical { operands, .. } => {
                if operands.is_empty() {
                    return Err(QueryError::InvalidExpression(format!(
                        "empty logical expression: {}",
                        self
                    )));
                }
                operands.iter().try_for_each(|o| o.validate_at(false))
            }
            Expr::Not(inner) => inner.validate_at(false),
            Expr::In { expr, values, .. } => {
                if values.is_empty() {
                    return Err(QueryError::InvalidExpression(format!(
                        "IN list must not be empty: {}",
                        self
                    )));
                }
                expr.validate_at(false)
            }
            Expr::Like { expr, .. } | Expr::RegexMatch { expr, .. } => expr.validate_at(false),
            Expr::Function { name, args } => {
                if let Some((min, max)) = function_arity(name) {
                    if args.len() < min || args.len() > max {
                        let expected = if min == max {
                            format!("{}", min)
                        } else {
                            format!("{} to {}", min, max)
                        };
                        return Err(QueryError::InvalidExpression(format!(
                            "function {} expects {} argument(s), got {}: {}",
                            name,
                            expected,
                            args.len(),
                            self
                        )));
                    }
                }
                args.iter().try_for_each(|a| a.validate_at(false))
            }
            Expr::Window(spec) => {
                if !top_level {
                    return Err(QueryError::InvalidExpression(format!(
                        "window function must be a top-level selector: {}",
                        self
                    )));
                }
                if !spec.function.eq_ignore_ascii_case("sum") {
                    return Err(QueryError::InvalidExpression(format!(
                        "unsupported window aggregate '{}'",
                        spec.function
                    )));
                }
                if spec.window_ms <= 0 {
                    return Err(QueryError::InvalidExpression(format!(
                        "window range must be positive: {}",
                        self
                    )));
                }
                spec.argument.validate_at(false)
            }
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(name) => f.write_str(name),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Timestamp(ms) => write!(f, "timestamp({})", ms),
            Expr::Comparison { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::Arithmetic { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Logical { op, operands } => {
                f.write_str("(")?;
                write_list(f, operands, &format!(" {} ", op.keyword()))?;
                f.write_str(")")
            }
            Expr::Not(inner) => write!(f, "NOT ({})", inner),
            Expr::In {
                expr,
                values,
                negated,
            } => {
                write!(f, "{} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                write_list(f, values, ", ")?;
                f.write_str(")")
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{} {}LIKE {}",
                expr,
                if *negated { "NOT " } else { "" },
                Value::String(pattern.clone())
            ),
            Expr::RegexMatch {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{} {} {}",
                expr,
                if *negated { "!~" } else { "=~" },
                Value::String(pattern.clone())
            ),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Expr::Window(spec) => {
                write!(f, "{}({}) OVER (PARTITION BY ", spec.function, spec.argument)?;
                write_list(f, &spec.partition_by, ", ")?;
                write!(f, " ORDER BY {} RANGE {}ms PRECEDING)", spec.order_by, spec.window_ms)
            }
        }
    }
}
