use std::sync::Arc;

use chrono::Datelike;
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, instrument};

use crate::{
    calculator::{
        aggregation::{DailyReturn, instrument_daily, portfolio_daily},
        returns::ReturnTable,
        segment::aggregate_by,
    },
    data::domain::{ReturnConvention, Scope},
    error::{DataError, FolioError, FolioResult},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::polars_to_folio_error,
    },
};

/// Trading days used for square-root-of-time scaling.
pub const TRADING_DAYS_PER_WEEK: f64 = 5.0;
pub const TRADING_DAYS_PER_MONTH: f64 = 21.0;
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Realized volatility of one scope within one calendar year.
///
/// `daily` is the sample standard deviation (`n - 1`) of daily log returns;
/// the other horizons scale it by `sqrt(trading days)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityRecord {
    pub scope: Scope,
    pub year: i32,
    pub observations: usize,
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
    pub yearly: f64,
}

impl VolatilityRecord {
    fn from_daily(scope: Scope, year: i32, observations: usize, daily: f64) -> Self {
        Self {
            scope,
            year,
            observations,
            daily,
            weekly: daily * TRADING_DAYS_PER_WEEK.sqrt(),
            monthly: daily * TRADING_DAYS_PER_MONTH.sqrt(),
            yearly: daily * TRADING_DAYS_PER_YEAR.sqrt(),
        }
    }
}

/// Per-year volatility of every instrument and of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityTable {
    rows: Vec<VolatilityRecord>,
}

impl VolatilityTable {
    /// Computes volatility from log returns, whatever the table's convention.
    ///
    /// # Errors
    /// `DataError::InsufficientData` if any (scope, year) group has fewer than
    /// two observations; no partial table is returned.
    #[instrument(skip(table), fields(records = table.len()))]
    pub fn compute(table: &ReturnTable) -> FolioResult<Self> {
        let mut daily = instrument_daily(table, ReturnConvention::Log);
        daily.extend(portfolio_daily(table, ReturnConvention::Log));

        let rows = yearly_volatility(&daily)?;
        debug!(groups = rows.len(), "Computed yearly volatility");
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[VolatilityRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, scope: &Scope, year: i32) -> Option<&VolatilityRecord> {
        self.rows.iter().find(|r| &r.scope == scope && r.year == year)
    }
}

/// Groups daily returns by `(scope, year)` and scales their sample standard deviation.
pub fn yearly_volatility(daily: &[DailyReturn]) -> FolioResult<Vec<VolatilityRecord>> {
    aggregate_by(
        daily,
        |d| (d.scope.clone(), d.date.year()),
        |(scope, year), group| -> FolioResult<VolatilityRecord> {
            let values = group.iter().map(|d| d.value).collect::<Vec<_>>();
            let std = sample_std(&values).ok_or_else(|| DataError::InsufficientData {
                context: format!("volatility of {scope} in {year}"),
                required: 2,
                found: values.len(),
            })?;
            Ok(VolatilityRecord::from_daily(
                scope.clone(),
                *year,
                values.len(),
                std,
            ))
        },
    )
    .into_iter()
    .map(|(_, record)| record)
    .collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation with Bessel's correction; `None` below two values.
pub(crate) fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

// ================================================================================================
// Presentation
// ================================================================================================

impl ReportName for VolatilityTable {
    fn base_name(&self) -> String {
        "volatility".to_string()
    }
}

impl Report for VolatilityTable {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                VolatilityCol::ScopeKind.name(),
                rows.iter().map(|r| r.scope.kind()).collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::ScopeId.name(),
                rows.iter().map(|r| r.scope.id()).collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::Year.name(),
                rows.iter().map(|r| r.year).collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::Observations.name(),
                rows.iter()
                    .map(|r| r.observations as u32)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::DailyVol.name(),
                rows.iter().map(|r| r.daily).collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::WeeklyVol.name(),
                rows.iter().map(|r| r.weekly).collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::MonthlyVol.name(),
                rows.iter().map(|r| r.monthly).collect::<Vec<_>>(),
            ),
            Column::new(
                VolatilityCol::YearlyVol.name(),
                rows.iter().map(|r| r.yearly).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for VolatilityTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = VolatilityCol::iter()
            .map(|col| {
                let dtype = match col {
                    VolatilityCol::ScopeKind | VolatilityCol::ScopeId => DataType::String,
                    VolatilityCol::Year => DataType::Int32,
                    VolatilityCol::Observations => DataType::UInt32,
                    VolatilityCol::DailyVol
                    | VolatilityCol::WeeklyVol
                    | VolatilityCol::MonthlyVol
                    | VolatilityCol::YearlyVol => DataType::Float64,
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
pub enum VolatilityCol {
    ScopeKind,
    ScopeId,
    Year,
    Observations,
    DailyVol,
    WeeklyVol,
    MonthlyVol,
    YearlyVol,
}
impl_col_name!(VolatilityCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("volatility", e)
}
