//! SQL statement construction and rendering
//!
//! [`StatementBuilder`] validates a [`Query`](crate::query::Query) against its
//! schema and lowers it to a [`SelectStatement`]. [`SqlGenerator`] renders
//! that statement through a [`SqlDialect`](crate::dialect::SqlDialect); the
//! same statement renders for every dialect.

pub mod ast;
mod builder;
mod generator;

pub use ast::{FromClause, SelectItem, SelectStatement};
pub use builder::StatementBuilder;
pub use generator::SqlGenerator;
