use std::sync::Arc;

use chrono::NaiveDate;
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::instrument;

use crate::{
    calculator::volatility::{TRADING_DAYS_PER_YEAR, sample_std},
    data::domain::SeriesLabel,
    error::{DataError, FolioError, FolioResult},
    impl_col_name,
    report::{
        drawdown::DrawdownTable,
        io::{Report, ReportName, ToSchema},
        performance::PerformanceSeries,
        polars_ext::{date_column, polars_to_folio_error},
    },
};

/// Headline figures of one label over its whole history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub label: SeriesLabel,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub observations: usize,
    /// Cumulative return on `end_date`.
    pub total_return: f64,
    /// Sample standard deviation of daily period returns times `sqrt(252)`.
    pub annualized_volatility: f64,
    pub max_drawdown: f64,
    pub max_drawdown_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    rows: Vec<SummaryRow>,
}

impl PerformanceSummary {
    /// One row per label present in `series`, portfolio first.
    ///
    /// # Errors
    /// `DataError::InsufficientData` if a label has fewer than two rows.
    #[instrument(skip_all, fields(rows = series.len()))]
    pub fn compute(series: &PerformanceSeries, drawdowns: &DrawdownTable) -> FolioResult<Self> {
        let mut rows = Vec::new();

        for label in SeriesLabel::iter() {
            let history = series.label(label).collect::<Vec<_>>();
            let (Some(first), Some(last)) = (history.first(), history.last()) else {
                continue;
            };

            let returns = history.iter().map(|r| r.period_return).collect::<Vec<_>>();
            let std = sample_std(&returns).ok_or_else(|| DataError::InsufficientData {
                context: format!("annualized volatility of {label}"),
                required: 2,
                found: returns.len(),
            })?;
            let max_dd = drawdowns.max_drawdown(label).ok_or_else(|| {
                DataError::MissingSeries(format!("drawdowns of {label}"))
            })?;

            rows.push(SummaryRow {
                label,
                start_date: first.date,
                end_date: last.date,
                observations: history.len(),
                total_return: last.cumulative_return,
                annualized_volatility: std * TRADING_DAYS_PER_YEAR.sqrt(),
                max_drawdown: max_dd.drawdown,
                max_drawdown_date: max_dd.trough_date,
            });
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn get(&self, label: SeriesLabel) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

impl ReportName for PerformanceSummary {
    fn base_name(&self) -> String {
        "summary".to_string()
    }
}

impl Report for PerformanceSummary {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                SummaryCol::Label.name(),
                rows.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            ),
            date_column(SummaryCol::StartDate, rows.iter().map(|r| r.start_date))
                .map_err(convert_err)?,
            date_column(SummaryCol::EndDate, rows.iter().map(|r| r.end_date))
                .map_err(convert_err)?,
            Column::new(
                SummaryCol::Observations.name(),
                rows.iter()
                    .map(|r| r.observations as u32)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                SummaryCol::TotalReturn.name(),
                rows.iter().map(|r| r.total_return).collect::<Vec<_>>(),
            ),
            Column::new(
                SummaryCol::AnnualizedVolatility.name(),
                rows.iter()
                    .map(|r| r.annualized_volatility)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                SummaryCol::MaxDrawdown.name(),
                rows.iter().map(|r| r.max_drawdown).collect::<Vec<_>>(),
            ),
            date_column(
                SummaryCol::MaxDrawdownDate,
                rows.iter().map(|r| r.max_drawdown_date),
            )
            .map_err(convert_err)?,
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for PerformanceSummary {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = SummaryCol::iter()
            .map(|col| {
                let dtype = match col {
                    SummaryCol::Label => DataType::String,
                    SummaryCol::StartDate | SummaryCol::EndDate | SummaryCol::MaxDrawdownDate => {
                        DataType::Date
                    }
                    SummaryCol::Observations => DataType::UInt32,
                    SummaryCol::TotalReturn
                    | SummaryCol::AnnualizedVolatility
                    | SummaryCol::MaxDrawdown => DataType::Float64,
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
pub enum SummaryCol {
    Label,
    StartDate,
    EndDate,
    Observations,
    TotalReturn,
    AnnualizedVolatility,
    MaxDrawdown,
    MaxDrawdownDate,
}
impl_col_name!(SummaryCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("summary", e)
}
