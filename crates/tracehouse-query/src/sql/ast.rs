//! Dialect-neutral SELECT statement

use crate::expr::Expr;
use crate::query::{Limit, OrderBy};
use crate::value::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table(String),
    Subquery {
        statement: Box<SelectStatement>,
        alias: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub output: String,
    pub data_type: DataType,
}

impl SelectItem {
    /// Whether the item is a bare column selected under its own name, so no
    /// alias needs to be rendered.
    pub fn is_plain_column(&self) -> bool {
        self.expr.as_identifier() == Some(self.output.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub selectors: Vec<SelectItem>,
    pub from: FromClause,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
}

impl SelectStatement {
    pub fn new(from: FromClause) -> Self {
        Self {
            distinct: false,
            selectors: Vec::new(),
            from,
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().map(|s| s.output.as_str())
    }

    /// Wrap this statement as the FROM of a new outer statement selecting
    /// every output column by name.
    pub fn into_subquery(self, alias: &str) -> SelectStatement {
        let selectors = self
            .selectors
            .iter()
            .map(|s| SelectItem {
                expr: Expr::ident(s.output.clone()),
                output: s.output.clone(),
                data_type: s.data_type,
            })
            .collect();
        SelectStatement {
            selectors,
            ..SelectStatement::new(FromClause::Subquery {
                statement: Box::new(self),
                alias: alias.to_string(),
            })
        }
    }
}
