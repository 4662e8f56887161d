use chrono::NaiveDate;
use polars::prelude::{
    Column, DataFrame, DataType, JsonFormat, JsonWriter, PlSmallStr, PolarsResult, SerWriter,
};
use serde_json::Value;

use crate::error::{DataError, FolioError, FolioResult, IoError};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01, the epoch of polars `Date`.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) fn polars_to_folio_error(table: &str, e: polars::error::PolarsError) -> FolioError {
    FolioError::Data(DataError::DataFrame(format!(
        "Error while materializing {table} DataFrame: {e}"
    )))
}

/// Converts a calendar date into the physical representation of a polars `Date`.
pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    chrono::Datelike::num_days_from_ce(&date) - UNIX_EPOCH_DAYS_FROM_CE
}

/// Inverse of [`date_to_days`].
pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Builds a polars `Date` column from calendar dates.
pub(crate) fn date_column(
    name: impl Into<PlSmallStr>,
    dates: impl IntoIterator<Item = NaiveDate>,
) -> PolarsResult<Column> {
    let days = dates.into_iter().map(date_to_days).collect::<Vec<i32>>();
    Column::new(name.into(), days).cast(&DataType::Date)
}

pub trait DataFrameExt {
    fn to_json_rows(&self) -> FolioResult<Vec<serde_json::Map<String, Value>>>;

    /// Reads a non-null `Date` column back into calendar dates.
    fn dates(&self, name: &str) -> FolioResult<Vec<NaiveDate>>;

    /// Reads a non-null `Float64` column.
    fn f64_values(&self, name: &str) -> FolioResult<Vec<f64>>;

    /// Reads a non-null `String` column.
    fn str_values(&self, name: &str) -> FolioResult<Vec<String>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> FolioResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        // Heuristic: approx 2^6 bytes per cell
        let estimated_row_size = self.width() * (1 << 6);
        let mut buf = Vec::with_capacity(height * estimated_row_size);

        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        let json_val: Value = serde_json::from_slice(&buf).map_err(IoError::Json)?;

        match json_val {
            Value::Array(rows) => Ok(rows
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }

    fn dates(&self, name: &str) -> FolioResult<Vec<NaiveDate>> {
        let column = self
            .column(name)
            .map_err(|e| DataError::DataFrame(format!("Missing column '{name}': {e}")))?;
        let days = column
            .date()
            .map_err(|e| DataError::DataFrame(format!("Column '{name}' is not a date: {e}")))?;

        days.physical()
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.and_then(days_to_date).ok_or_else(|| {
                    DataError::DataFrame(format!("Null or invalid date in '{name}' at row {row}"))
                        .into()
                })
            })
            .collect()
    }

    fn f64_values(&self, name: &str) -> FolioResult<Vec<f64>> {
        let column = self
            .column(name)
            .map_err(|e| DataError::DataFrame(format!("Missing column '{name}': {e}")))?;
        let values = column
            .f64()
            .map_err(|e| DataError::DataFrame(format!("Column '{name}' is not f64: {e}")))?;

        values
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| {
                    DataError::DataFrame(format!("Null value in '{name}' at row {row}")).into()
                })
            })
            .collect()
    }

    fn str_values(&self, name: &str) -> FolioResult<Vec<String>> {
        let column = self
            .column(name)
            .map_err(|e| DataError::DataFrame(format!("Missing column '{name}': {e}")))?;
        let values = column
            .str()
            .map_err(|e| DataError::DataFrame(format!("Column '{name}' is not a string: {e}")))?;

        values
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.map(str::to_string).ok_or_else(|| {
                    DataError::DataFrame(format!("Null value in '{name}' at row {row}")).into()
                })
            })
            .collect()
    }
}
