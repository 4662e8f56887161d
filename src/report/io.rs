use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use polars::{
    frame::DataFrame,
    prelude::{CsvWriter, SchemaRef, SerWriter},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, FolioResult, IoError},
    report::polars_ext::DataFrameExt,
};

// ================================================================================================
// Traits
// ================================================================================================

/// Defines a common interface for all tables handed to the presentation layer.
///
/// Tables keep their rows as typed records; the `DataFrame` is a tidy,
/// row-per-observation view materialized on demand.
pub trait Report {
    fn to_df(&self) -> FolioResult<DataFrame>;
}

pub trait ReportName {
    fn base_name(&self) -> String;

    fn filename(&self, ext: FileExtension) -> String {
        format!("{}.{}", self.base_name(), ext)
    }
}

pub trait ToSchema {
    /// Returns the canonical schema for this table type.
    fn to_schema() -> SchemaRef;
}

pub trait ToJson {
    /// Serializes the table to a `Value::Array` of row objects.
    fn to_json(&self) -> FolioResult<Value>;
}

pub trait ToCsv {
    /// Writes the table to `<dir>/<base_name>.csv` and returns the written path.
    ///
    /// # Side Effects
    /// - Creates the directory if missing.
    /// - Overwrites the file if it exists.
    fn to_csv(&self, dir: impl AsRef<Path>) -> FolioResult<PathBuf>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> ToJson for T
where
    T: Report,
{
    fn to_json(&self) -> FolioResult<Value> {
        let rows = self.to_df()?.to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

impl<T> ToCsv for T
where
    T: Report + ReportName,
{
    fn to_csv(&self, dir: impl AsRef<Path>) -> FolioResult<PathBuf> {
        let dir = dir.as_ref();
        let file_path = dir.join(self.filename(FileExtension::Csv));

        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                IoError::FileSystem(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let mut df = self.to_df()?;
        let mut file = File::create(&file_path).map_err(|e| {
            IoError::WriteFailed(format!("Failed to create '{}': {e}", file_path.display()))
        })?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| {
                DataError::DataFrame(format!(
                    "Failed to write CSV to '{}': {e}",
                    file_path.display()
                ))
            })?;

        tracing::debug!(path = %file_path.display(), rows = df.height(), "Table written");
        Ok(file_path)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileExtension {
    Csv,
}
