//! Columnar tables
//!
//! A [`ColumnarTable`] is an ordered set of equally sized, uniquely named
//! columns. Tables are append-only: new columns may be added, existing ones
//! are never modified in place. Row subsets are produced either physically
//! ([`ColumnarTable::filter`]) or logically ([`ColumnarTable::view`]).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::column::{ColumnExt, ColumnRef};
use crate::error::QueryError;
use crate::Result;

/// Row shape used when a table is turned into JSON rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// `{"column": value, ...}`
    #[default]
    Object,
    /// `[value, ...]` in schema order
    Array,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnarTable {
    columns: Vec<ColumnRef>,
    index: HashMap<String, usize>,
}

impl ColumnarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<ColumnRef>) -> Result<Self> {
        let mut table = Self::new();
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    /// Append a column. Its size must match the existing columns and its name
    /// must be new.
    pub fn add_column(&mut self, column: ColumnRef) -> Result<()> {
        let name = column.name().to_string();
        if self.index.contains_key(&name) {
            return Err(QueryError::DuplicateColumn(name));
        }
        if let Some(first) = self.columns.first() {
            if first.size() != column.size() {
                return Err(QueryError::ColumnSizeMismatch {
                    column: name,
                    expected: first.size(),
                    actual: column.size(),
                });
            }
        }
        self.index.insert(name, self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn with_column(mut self, column: ColumnRef) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name())
    }

    pub fn get(&self, name: &str) -> Option<&ColumnRef> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn column(&self, name: &str) -> Result<&ColumnRef> {
        self.get(name)
            .ok_or_else(|| QueryError::ColumnNotFound(name.to_string()))
    }

    /// Resolve several columns at once, preserving the requested order.
    pub fn columns_by_name(&self, names: &[String]) -> Result<Vec<ColumnRef>> {
        names.iter().map(|n| self.column(n).cloned()).collect()
    }

    /// Physically compact every column to the rows set in `mask`.
    pub fn filter(&self, mask: &[bool]) -> ColumnarTable {
        self.map_columns(|c| c.filter(mask))
    }

    /// New table over the same backing columns, re-indexed by `selections`.
    /// No column data is copied.
    pub fn view(&self, selections: Vec<usize>) -> ColumnarTable {
        let length = selections.len();
        let selections: Arc<[usize]> = Arc::from(selections);
        self.map_columns(|c| c.view(selections.clone(), length))
    }

    /// Keep only the named columns, in the given order.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<ColumnarTable> {
        let columns = names
            .iter()
            .map(|n| self.column(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        ColumnarTable::from_columns(columns)
    }

    /// New table with the same-named column swapped for `column`.
    pub fn replace_column(&self, column: ColumnRef) -> Result<ColumnarTable> {
        let position = *self
            .index
            .get(column.name())
            .ok_or_else(|| QueryError::ColumnNotFound(column.name().to_string()))?;
        if column.size() != self.row_count() {
            return Err(QueryError::ColumnSizeMismatch {
                column: column.name().to_string(),
                expected: self.row_count(),
                actual: column.size(),
            });
        }
        let mut columns = self.columns.clone();
        columns[position] = column;
        Ok(ColumnarTable {
            columns,
            index: self.index.clone(),
        })
    }

    fn map_columns(&self, f: impl Fn(&ColumnRef) -> ColumnRef) -> ColumnarTable {
        ColumnarTable {
            columns: self.columns.iter().map(f).collect(),
            index: self.index.clone(),
        }
    }

    /// Materialize rows as JSON, either as objects keyed by column name or as
    /// arrays in schema order.
    pub fn to_rows(&self, format: ResultFormat) -> Vec<serde_json::Value> {
        (0..self.row_count())
            .map(|row| match format {
                ResultFormat::Object => {
                    let mut object = serde_json::Map::with_capacity(self.columns.len());
                    for column in &self.columns {
                        object.insert(column.name().to_string(), column.get_value(row).to_json());
                    }
                    serde_json::Value::Object(object)
                }
                ResultFormat::Array => serde_json::Value::Array(
                    self.columns
                        .iter()
                        .map(|c| c.get_value(row).to_json())
                        .collect(),
                ),
            })
            .collect()
    }

    /// Convert into an Arrow `RecordBatch`, copying column data.
    #[cfg(feature = "arrow")]
    pub fn to_record_batch(&self) -> Result<arrow::record_batch::RecordBatch> {
        use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
        use arrow::datatypes::{DataType as ArrowType, Field, Schema, TimeUnit};

        use crate::value::DataType;

        let rows = self.row_count();
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let name = column.name();
            match column.data_type() {
                DataType::Long => {
                    let values = (0..rows)
                        .map(|r| column.get_long(r))
                        .collect::<Result<Vec<i64>>>()?;
                    fields.push(Field::new(name, ArrowType::Int64, false));
                    arrays.push(Arc::new(Int64Array::from(values)));
                }
                DataType::DateTimeMilli => {
                    let values = (0..rows)
                        .map(|r| column.get_long(r))
                        .collect::<Result<Vec<i64>>>()?;
                    fields.push(Field::new(
                        name,
                        ArrowType::Timestamp(TimeUnit::Millisecond, None),
                        false,
                    ));
                    arrays.push(Arc::new(TimestampMillisecondArray::from(values)));
                }
                DataType::Double => {
                    let values = (0..rows)
                        .map(|r| column.get_double(r))
                        .collect::<Result<Vec<f64>>>()?;
                    fields.push(Field::new(name, ArrowType::Float64, false));
                    arrays.push(Arc::new(Float64Array::from(values)));
                }
                DataType::String => {
                    let values = (0..rows)
                        .map(|r| column.get_string(r))
                        .collect::<Result<Vec<&str>>>()?;
                    fields.push(Field::new(name, ArrowType::Utf8, false));
                    arrays.push(Arc::new(StringArray::from(values)));
                }
                other => return Err(QueryError::UnsupportedType(other.to_string())),
            }
        }

        arrow::record_batch::RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| QueryError::Arrow(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{DoubleColumn, LongColumn, StringColumn};

    fn sample() -> ColumnarTable {
        let columns: Vec<ColumnRef> = vec![
            Arc::new(StringColumn::from_values("app", vec!["a", "b", "c"])),
            Arc::new(LongColumn::from_values("count", vec![1, 2, 3])),
            Arc::new(DoubleColumn::from_values("ratio", vec![0.5, 1.0, 1.5])),
        ];
        ColumnarTable::from_columns(columns).unwrap()
    }

    #[test]
    fn test_schema_order_and_row_count() {
        let table = sample();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["app", "count", "ratio"]);
    }

    #[test]
    fn test_rejects_mismatched_size() {
        let mut table = sample();
        let err = table
            .add_column(Arc::new(LongColumn::from_values("short", vec![1])))
            .unwrap_err();
        assert!(matches!(err, QueryError::ColumnSizeMismatch { expected: 3, actual: 1, .. }));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let mut table = sample();
        let err = table
            .add_column(Arc::new(LongColumn::from_values("count", vec![1, 2, 3])))
            .unwrap_err();
        assert!(matches!(err, QueryError::DuplicateColumn(name) if name == "count"));
    }

    #[test]
    fn test_view_shares_backing_columns() {
        let table = sample();
        let view = table.view(vec![2, 0]);
        assert_eq!(view.row_count(), 2);
        assert_eq!(view.column("app").unwrap().get_string(0).unwrap(), "c");
        assert_eq!(view.column("count").unwrap().get_long(1).unwrap(), 1);
        // the original table is unaffected
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_filter_table() {
        let table = sample();
        let filtered = table.filter(&[false, true, true]);
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(filtered.column("ratio").unwrap().get_double(0).unwrap(), 1.0);
    }

    #[test]
    fn test_to_rows() {
        let table = sample();
        let objects = table.to_rows(ResultFormat::Object);
        assert_eq!(objects[0], serde_json::json!({"app": "a", "count": 1, "ratio": 0.5}));
        let arrays = table.to_rows(ResultFormat::Array);
        assert_eq!(arrays[2], serde_json::json!(["c", 3, 1.5]));
    }

    #[test]
    fn test_project_and_replace() {
        let table = sample();
        let projected = table.project(&["ratio", "app"]).unwrap();
        assert_eq!(projected.names().collect::<Vec<_>>(), vec!["ratio", "app"]);

        let replaced = table
            .replace_column(Arc::new(LongColumn::from_values("count", vec![7, 8, 9])))
            .unwrap();
        assert_eq!(replaced.column("count").unwrap().get_long(2).unwrap(), 9);
        assert_eq!(table.column("count").unwrap().get_long(2).unwrap(), 3);
        assert!(table
            .replace_column(Arc::new(LongColumn::from_values("count", vec![1])))
            .is_err());
    }

    #[test]
    fn test_missing_column() {
        let table = sample();
        assert!(matches!(table.column("nope"), Err(QueryError::ColumnNotFound(_))));
    }

    #[cfg(feature = "arrow")]
    #[test]
    fn test_to_record_batch() {
        let batch = sample().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 3);
    }
}
