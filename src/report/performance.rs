use std::sync::Arc;

use chrono::NaiveDate;
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
    calculator::{aggregation::DailyReturn, segment::group_by_key},
    data::domain::{ReturnConvention, SeriesLabel},
    error::{FolioError, FolioResult, InputError},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::{date_column, polars_to_folio_error},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub label: SeriesLabel,
    pub date: NaiveDate,
    pub period_return: f64,
    pub cumulative_return: f64,
}

/// Portfolio and benchmark cumulative returns, sorted by `(label, date)`.
///
/// The cumulative value runs per label from the first date of that label and
/// never resets at calendar boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSeries {
    convention: ReturnConvention,
    rows: Vec<PerformanceRow>,
}

impl PerformanceSeries {
    /// Accumulates both daily series with `convention`.
    ///
    /// The daily returns must have been computed under the same convention.
    #[instrument(skip(portfolio, benchmark), fields(portfolio = portfolio.len(), benchmark = benchmark.len()))]
    pub fn build(
        portfolio: &[DailyReturn],
        benchmark: &[DailyReturn],
        convention: ReturnConvention,
    ) -> FolioResult<Self> {
        let labelled = portfolio
            .iter()
            .map(|d| (SeriesLabel::Portfolio, d))
            .chain(benchmark.iter().map(|d| (SeriesLabel::Benchmark, d)))
            .collect::<Vec<_>>();

        let mut rows = Vec::with_capacity(labelled.len());
        for (label, mut group) in group_by_key(labelled, |(label, _)| *label) {
            group.sort_by_key(|(_, d)| d.date);

            let mut cumulative = 0.0;
            let mut previous: Option<NaiveDate> = None;
            for (_, daily) in group {
                if let Some(prev) = previous.filter(|p| *p >= daily.date) {
                    return Err(InputError::UnsortedDates {
                        instrument: label.to_string(),
                        previous: prev,
                        current: daily.date,
                    }
                    .into());
                }
                previous = Some(daily.date);

                cumulative = convention.accumulate(cumulative, daily.value);
                rows.push(PerformanceRow {
                    label,
                    date: daily.date,
                    period_return: daily.value,
                    cumulative_return: cumulative,
                });
            }
        }

        debug!(rows = rows.len(), "Built performance series");
        Ok(Self { convention, rows })
    }

    pub fn convention(&self) -> ReturnConvention {
        self.convention
    }

    pub fn rows(&self) -> &[PerformanceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn label(&self, label: SeriesLabel) -> impl Iterator<Item = &PerformanceRow> {
        self.rows.iter().filter(move |r| r.label == label)
    }

    /// Rows on or after `from`.
    ///
    /// Cumulative values are kept as computed over the full history, so the
    /// first remaining row of a label generally does not start at zero.
    pub fn since(&self, from: NaiveDate) -> Self {
        Self {
            convention: self.convention,
            rows: self.rows.iter().filter(|r| r.date >= from).copied().collect(),
        }
    }
}

impl ReportName for PerformanceSeries {
    fn base_name(&self) -> String {
        "performance".to_string()
    }
}

impl Report for PerformanceSeries {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                PerformanceCol::Label.name(),
                rows.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            ),
            date_column(PerformanceCol::Date, rows.iter().map(|r| r.date)).map_err(convert_err)?,
            Column::new(
                PerformanceCol::PeriodReturn.name(),
                rows.iter().map(|r| r.period_return).collect::<Vec<_>>(),
            ),
            Column::new(
                PerformanceCol::CumulativeReturn.name(),
                rows.iter().map(|r| r.cumulative_return).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for PerformanceSeries {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PerformanceCol::iter()
            .map(|col| {
                let dtype = match col {
                    PerformanceCol::Label => DataType::String,
                    PerformanceCol::Date => DataType::Date,
                    PerformanceCol::PeriodReturn | PerformanceCol::CumulativeReturn => {
                        DataType::Float64
                    }
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
pub enum PerformanceCol {
    Label,
    Date,
    PeriodReturn,
    CumulativeReturn,
}
impl_col_name!(PerformanceCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("performance", e)
}
