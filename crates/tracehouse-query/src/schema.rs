//! Table schemas known to the query layer

use serde::{Deserialize, Serialize};

use crate::value::DataType;

/// Partial aggregate stored in a materialized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Sum,
    Count,
}

impl AggregateKind {
    pub fn function_name(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Count => "count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    /// Set when the column holds partial aggregate states rather than raw
    /// values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateKind>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            aggregate: None,
        }
    }

    pub fn pre_aggregated(name: impl Into<String>, data_type: DataType, kind: AggregateKind) -> Self {
        Self {
            aggregate: Some(kind),
            ..Self::new(name, data_type)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Logical schema name, e.g. `jvm-metrics`.
    pub name: String,
    /// Backing table in the database.
    pub table: String,
    pub timestamp_column: String,
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        timestamp_column: impl Into<String>,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            timestamp_column: timestamp_column.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        name == self.timestamp_column || self.column(name).is_some()
    }

    pub fn pre_aggregate(&self, name: &str) -> Option<AggregateKind> {
        self.column(name).and_then(|c| c.aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let schema = Schema::new(
            "http-metrics",
            "http_metrics",
            "timestamp",
            vec![
                ColumnSpec::new("appName", DataType::String),
                ColumnSpec::pre_aggregated("requestCount", DataType::Long, AggregateKind::Sum),
            ],
        );
        assert!(schema.contains("timestamp"));
        assert!(schema.contains("appName"));
        assert_eq!(schema.pre_aggregate("requestCount"), Some(AggregateKind::Sum));
        assert_eq!(schema.pre_aggregate("appName"), None);
    }

    #[test]
    fn test_deserialize() {
        let schema: Schema = serde_json::from_str(
            r#"{
                "name": "logs",
                "table": "logs_table",
                "timestampColumn": "ts",
                "columns": [{"name": "body", "data_type": "string"}]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.columns[0].data_type, DataType::String);
        assert!(schema.columns[0].aggregate.is_none());
    }
}
