use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    data::domain::SeriesLabel,
    error::{FolioError, FolioResult},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        performance::PerformanceSeries,
        polars_ext::{date_column, polars_to_folio_error},
    },
};

/// Portfolio against benchmark on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub date: NaiveDate,
    pub portfolio: f64,
    pub benchmark: f64,
    /// `portfolio - benchmark` cumulative return.
    pub difference: f64,
    /// `true` iff `difference > 0`; a tie is not outperformance.
    pub outperforming: bool,
}

/// Cumulative return spread on the dates both labels share.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonTable {
    rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn from_performance(series: &PerformanceSeries) -> Self {
        let benchmark = series
            .label(SeriesLabel::Benchmark)
            .map(|r| (r.date, r.cumulative_return))
            .collect::<BTreeMap<_, _>>();

        let mut rows = series
            .label(SeriesLabel::Portfolio)
            .filter_map(|p| {
                benchmark.get(&p.date).map(|b| {
                    let difference = p.cumulative_return - b;
                    ComparisonRow {
                        date: p.date,
                        portfolio: p.cumulative_return,
                        benchmark: *b,
                        difference,
                        outperforming: difference > 0.0,
                    }
                })
            })
            .collect::<Vec<_>>();
        rows.sort_by_key(|r| r.date);

        Self { rows }
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Share of compared dates on which the portfolio was ahead.
    pub fn outperformance_ratio(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let ahead = self.rows.iter().filter(|r| r.outperforming).count();
        Some(ahead as f64 / self.rows.len() as f64)
    }
}

impl ReportName for ComparisonTable {
    fn base_name(&self) -> String {
        "comparison".to_string()
    }
}

impl Report for ComparisonTable {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            date_column(ComparisonCol::Date, rows.iter().map(|r| r.date)).map_err(convert_err)?,
            Column::new(
                ComparisonCol::Portfolio.name(),
                rows.iter().map(|r| r.portfolio).collect::<Vec<_>>(),
            ),
            Column::new(
                ComparisonCol::Benchmark.name(),
                rows.iter().map(|r| r.benchmark).collect::<Vec<_>>(),
            ),
            Column::new(
                ComparisonCol::Difference.name(),
                rows.iter().map(|r| r.difference).collect::<Vec<_>>(),
            ),
            Column::new(
                ComparisonCol::Outperforming.name(),
                rows.iter().map(|r| r.outperforming).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for ComparisonTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = ComparisonCol::iter()
            .map(|col| {
                let dtype = match col {
                    ComparisonCol::Date => DataType::Date,
                    ComparisonCol::Portfolio
                    | ComparisonCol::Benchmark
                    | ComparisonCol::Difference => DataType::Float64,
                    ComparisonCol::Outperforming => DataType::Boolean,
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
pub enum ComparisonCol {
    Date,
    Portfolio,
    Benchmark,
    Difference,
    Outperforming,
}
impl_col_name!(ComparisonCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("comparison", e)
}
