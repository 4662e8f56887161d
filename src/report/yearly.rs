use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    calculator::segment::aggregate_by,
    data::domain::SeriesLabel,
    error::{FolioError, FolioResult},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        performance::PerformanceSeries,
        polars_ext::{date_column, polars_to_folio_error},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyRow {
    pub label: SeriesLabel,
    pub year: i32,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub first_cumulative: f64,
    pub last_cumulative: f64,
    /// `last_cumulative - first_cumulative`.
    pub performance: f64,
}

/// Year-by-year change of the cumulative return, per label.
///
/// Each year is measured from its first to its last observed row. With a
/// `window_start` the rows before it are dropped first, so the first year of
/// the window starts at the cumulative value of `window_start` rather than at
/// January 1st; this truncation is intended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyPerformance {
    window_start: Option<NaiveDate>,
    rows: Vec<YearlyRow>,
}

impl YearlyPerformance {
    pub fn from_performance(series: &PerformanceSeries, window_start: Option<NaiveDate>) -> Self {
        let windowed = match window_start {
            Some(from) => series.since(from),
            None => series.clone(),
        };

        let rows = aggregate_by(
            windowed.rows(),
            |r| (r.label, r.date.year()),
            |(label, year), mut group| -> Option<YearlyRow> {
                group.sort_by_key(|r| r.date);
                let (first, last) = (group.first()?, group.last()?);
                Some(YearlyRow {
                    label: *label,
                    year: *year,
                    first_date: first.date,
                    last_date: last.date,
                    first_cumulative: first.cumulative_return,
                    last_cumulative: last.cumulative_return,
                    performance: last.cumulative_return - first.cumulative_return,
                })
            },
        )
        .into_iter()
        .filter_map(|(_, row)| row)
        .collect();

        Self { window_start, rows }
    }

    pub fn window_start(&self) -> Option<NaiveDate> {
        self.window_start
    }

    pub fn rows(&self) -> &[YearlyRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, label: SeriesLabel, year: i32) -> Option<&YearlyRow> {
        self.rows.iter().find(|r| r.label == label && r.year == year)
    }
}

impl ReportName for YearlyPerformance {
    fn base_name(&self) -> String {
        "yearly_performance".to_string()
    }
}

impl Report for YearlyPerformance {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                YearlyCol::Label.name(),
                rows.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                YearlyCol::Year.name(),
                rows.iter().map(|r| r.year).collect::<Vec<_>>(),
            ),
            date_column(YearlyCol::FirstDate, rows.iter().map(|r| r.first_date))
                .map_err(convert_err)?,
            date_column(YearlyCol::LastDate, rows.iter().map(|r| r.last_date))
                .map_err(convert_err)?,
            Column::new(
                YearlyCol::FirstCumulative.name(),
                rows.iter().map(|r| r.first_cumulative).collect::<Vec<_>>(),
            ),
            Column::new(
                YearlyCol::LastCumulative.name(),
                rows.iter().map(|r| r.last_cumulative).collect::<Vec<_>>(),
            ),
            Column::new(
                YearlyCol::Performance.name(),
                rows.iter().map(|r| r.performance).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for YearlyPerformance {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = YearlyCol::iter()
            .map(|col| {
                let dtype = match col {
                    YearlyCol::Label => DataType::String,
                    YearlyCol::Year => DataType::Int32,
                    YearlyCol::FirstDate | YearlyCol::LastDate => DataType::Date,
                    YearlyCol::FirstCumulative
                    | YearlyCol::LastCumulative
                    | YearlyCol::Performance => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum YearlyCol {
    Label,
    Year,
    FirstDate,
    LastDate,
    FirstCumulative,
    LastCumulative,
    Performance,
}
impl_col_name!(YearlyCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("yearly performance", e)
}
