//! Sliding-window sum over grouped, time-ordered rows
//!
//! Input rows must already be sorted by `(key columns..., timestamp)`
//! ascending. The aggregator does not check this: unsorted input yields wrong
//! sums, not an error.
//!
//! For every row the output holds the sum of the values of all rows of the
//! same group whose timestamp lies in `[ts - window, ts]`. Both bounds are
//! inclusive: a row exactly `window` milliseconds older still counts, and it
//! leaves the window once the current row is strictly more than `window`
//! past it.

use std::sync::Arc;

use crate::column::{ColumnRef, DoubleColumn, LongColumn};
use crate::error::QueryError;
use crate::key::CompositeKey;
use crate::table::ColumnarTable;
use crate::value::DataType;
use crate::Result;

/// Running-sum arithmetic. Integer sums fail on overflow instead of
/// wrapping; float sums saturate to infinity as usual.
trait WindowSum: Copy + Default {
    fn checked_add(self, other: Self) -> Option<Self>;
    fn checked_sub(self, other: Self) -> Option<Self>;
}

impl WindowSum for i64 {
    fn checked_add(self, other: Self) -> Option<Self> {
        i64::checked_add(self, other)
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        i64::checked_sub(self, other)
    }
}

impl WindowSum for f64 {
    fn checked_add(self, other: Self) -> Option<Self> {
        Some(self + other)
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        Some(self - other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidingWindow {
    pub key_columns: Vec<String>,
    pub timestamp_column: String,
    pub value_column: String,
    pub window_ms: i64,
}

impl SlidingWindow {
    /// Compute the running sums, one per input row, as a column named like
    /// the value column. Long and datetime input sum to long, double input
    /// to double.
    pub fn aggregate(&self, table: &ColumnarTable) -> Result<ColumnRef> {
        if self.window_ms <= 0 {
            return Err(QueryError::InvalidExpression(format!(
                "window range must be positive, got {}ms",
                self.window_ms
            )));
        }
        let keys = table.columns_by_name(&self.key_columns)?;
        let timestamps = table.column(&self.timestamp_column)?;
        let values = table.column(&self.value_column)?;

        let column: ColumnRef = match values.data_type() {
            DataType::Long | DataType::DateTimeMilli => {
                let sums = self.running_sums(&keys, timestamps, |row| values.get_long(row))?;
                Arc::new(LongColumn::from_values(self.value_column.clone(), sums))
            }
            DataType::Double => {
                let sums = self.running_sums(&keys, timestamps, |row| values.get_double(row))?;
                Arc::new(DoubleColumn::from_values(self.value_column.clone(), sums))
            }
            other => {
                return Err(QueryError::UnsupportedOperation(format!(
                    "cannot sum {} column '{}'",
                    other, self.value_column
                )))
            }
        };
        Ok(column)
    }

    /// Two-pointer pass: `start` trails the current row and only ever moves
    /// forward, so the whole table is processed in O(n).
    fn running_sums<T>(
        &self,
        keys: &[ColumnRef],
        timestamps: &ColumnRef,
        value: impl Fn(usize) -> Result<T>,
    ) -> Result<Vec<T>>
    where
        T: WindowSum,
    {
        let rows = timestamps.size();
        let mut sums = Vec::with_capacity(rows);
        let mut group: Option<CompositeKey> = None;
        let mut start = 0;
        let mut sum = T::default();

        for row in 0..rows {
            let same_group = group
                .as_ref()
                .map_or(false, |key| key.matches_row(keys, row));
            if !same_group {
                group = Some(CompositeKey::from_row(keys, row));
                start = row;
                sum = T::default();
            }

            let cutoff = timestamps.get_long(row)?.saturating_sub(self.window_ms);
            while start < row && timestamps.get_long(start)? < cutoff {
                sum = sum
                    .checked_sub(value(start)?)
                    .ok_or_else(|| self.overflow(row))?;
                start += 1;
            }

            sum = sum.checked_add(value(row)?).ok_or_else(|| self.overflow(row))?;
            sums.push(sum);
        }
        Ok(sums)
    }

    fn overflow(&self, row: usize) -> QueryError {
        QueryError::InvalidValue {
            column: self.value_column.clone(),
            expected: "a running sum within the long range".to_string(),
            actual: format!("overflow at row {}", row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::StringColumn;

    fn window(window_ms: i64) -> SlidingWindow {
        SlidingWindow {
            key_columns: vec!["app".to_string()],
            timestamp_column: "ts".to_string(),
            value_column: "v".to_string(),
            window_ms,
        }
    }

    fn table(apps: Vec<&str>, ts: Vec<i64>, values: ColumnRef) -> ColumnarTable {
        let columns: Vec<ColumnRef> = vec![
            Arc::new(StringColumn::from_values("app", apps)),
            Arc::new(LongColumn::from_values("ts", ts)),
            values,
        ];
        ColumnarTable::from_columns(columns).unwrap()
    }

    fn longs(column: &ColumnRef) -> Vec<i64> {
        (0..column.size()).map(|i| column.get_long(i).unwrap()).collect()
    }

    #[test]
    fn test_boundary_row_is_included() {
        let t = table(
            vec!["a"; 4],
            vec![0, 1, 2, 3],
            Arc::new(LongColumn::from_values("v", vec![1, 1, 1, 1])),
        );
        let out = window(2).aggregate(&t).unwrap();
        assert_eq!(out.name(), "v");
        assert_eq!(longs(&out), vec![1, 2, 3, 3]);
    }

    #[test]
    fn test_group_change_resets_sum() {
        let t = table(
            vec!["a", "a", "b", "b", "b"],
            vec![0, 1, 1, 2, 10],
            Arc::new(LongColumn::from_values("v", vec![5, 5, 1, 2, 3])),
        );
        let out = window(2).aggregate(&t).unwrap();
        assert_eq!(longs(&out), vec![5, 10, 1, 3, 3]);
    }

    #[test]
    fn test_double_values() {
        let t = table(
            vec!["a"; 3],
            vec![0, 1000, 5000],
            Arc::new(DoubleColumn::from_values("v", vec![0.5, 0.25, 1.0])),
        );
        let out = window(1000).aggregate(&t).unwrap();
        assert_eq!(out.data_type(), DataType::Double);
        let sums: Vec<f64> = (0..3).map(|i| out.get_double(i).unwrap()).collect();
        assert_eq!(sums, vec![0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_duplicate_timestamps_accumulate() {
        let t = table(
            vec!["a"; 3],
            vec![5, 5, 5],
            Arc::new(LongColumn::from_values("v", vec![1, 2, 3])),
        );
        assert_eq!(longs(&window(1).aggregate(&t).unwrap()), vec![1, 3, 6]);
    }

    #[test]
    fn test_string_values_rejected() {
        let t = table(
            vec!["a"],
            vec![0],
            Arc::new(StringColumn::from_values("v", vec!["x"])),
        );
        assert!(matches!(
            window(1).aggregate(&t),
            Err(QueryError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_long_overflow_is_a_data_error() {
        let t = table(
            vec!["a"; 2],
            vec![0, 1],
            Arc::new(LongColumn::from_values("v", vec![i64::MAX, 1])),
        );
        let err = window(10).aggregate(&t).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { ref column, .. } if column == "v"));
        assert_eq!(err.kind(), "data");
    }

    #[test]
    fn test_removal_overflow_is_a_data_error() {
        // every prefix fits, but dropping the leading -5 leaves MAX + 3
        let t = table(
            vec!["a"; 4],
            vec![0, 10, 11, 25],
            Arc::new(LongColumn::from_values("v", vec![-5, i64::MAX, 3, 0])),
        );
        assert!(matches!(
            window(20).aggregate(&t),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_empty_table() {
        let t = table(vec![], vec![], Arc::new(LongColumn::from_values("v", vec![])));
        assert_eq!(window(10).aggregate(&t).unwrap().size(), 0);
    }

    #[test]
    fn test_missing_column() {
        let t = table(vec!["a"], vec![0], Arc::new(LongColumn::from_values("v", vec![1])));
        let mut w = window(1);
        w.value_column = "missing".to_string();
        assert!(matches!(w.aggregate(&t), Err(QueryError::ColumnNotFound(_))));
    }
}
