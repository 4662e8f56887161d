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
    calculator::segment::group_by_key,
    data::domain::SeriesLabel,
    error::{FolioError, FolioResult},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        performance::PerformanceSeries,
        polars_ext::{date_column, polars_to_folio_error},
    },
};

/// Distance of a cumulative return from its running peak.
///
/// `drawdown = cumulative_return - running_peak`, always `<= 0`, and exactly
/// `0` on the rows that set a new peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownRecord {
    pub label: SeriesLabel,
    pub date: NaiveDate,
    pub cumulative_return: f64,
    pub running_peak: f64,
    pub drawdown: f64,
    /// Date on which `running_peak` was last reached.
    pub peak_date: NaiveDate,
}

/// The deepest trough of one label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxDrawdown {
    pub label: SeriesLabel,
    pub drawdown: f64,
    pub trough_date: NaiveDate,
    pub peak_date: NaiveDate,
}

/// Drawdowns derived from a [`PerformanceSeries`].
///
/// The running peak starts at the first cumulative value, not at zero, so a
/// loss on the first day is never counted as drawdown. For daily returns of
/// -5% and -5% the maximum drawdown is -4.75%, not -9.75%.
///
/// Never stored on its own: rebuild it whenever the parent series changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawdownTable {
    rows: Vec<DrawdownRecord>,
}

impl DrawdownTable {
    /// Running peak per label; the peak resets only when the label changes.
    #[instrument(skip(series), fields(rows = series.len()))]
    pub fn from_performance(series: &PerformanceSeries) -> Self {
        let mut rows = Vec::with_capacity(series.len());

        for (label, mut group) in group_by_key(series.rows(), |r| r.label) {
            group.sort_by_key(|r| r.date);

            let mut peak: Option<(f64, NaiveDate)> = None;
            for row in group {
                let (running_peak, peak_date) = match peak {
                    Some((value, date)) if value > row.cumulative_return => (value, date),
                    _ => (row.cumulative_return, row.date),
                };
                peak = Some((running_peak, peak_date));

                rows.push(DrawdownRecord {
                    label,
                    date: row.date,
                    cumulative_return: row.cumulative_return,
                    running_peak,
                    drawdown: row.cumulative_return - running_peak,
                    peak_date,
                });
            }
        }

        debug!(rows = rows.len(), "Computed drawdowns");
        Self { rows }
    }

    pub fn rows(&self) -> &[DrawdownRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn label(&self, label: SeriesLabel) -> impl Iterator<Item = &DrawdownRecord> {
        self.rows.iter().filter(move |r| r.label == label)
    }

    /// Deepest drawdown of `label`; the earliest one wins ties.
    ///
    /// `None` if the label has no rows.
    pub fn max_drawdown(&self, label: SeriesLabel) -> Option<MaxDrawdown> {
        self.label(label)
            .fold(None::<&DrawdownRecord>, |deepest, r| match deepest {
                Some(d) if d.drawdown <= r.drawdown => Some(d),
                _ => Some(r),
            })
            .map(|r| MaxDrawdown {
                label,
                drawdown: r.drawdown,
                trough_date: r.date,
                peak_date: r.peak_date,
            })
    }
}

impl ReportName for DrawdownTable {
    fn base_name(&self) -> String {
        "drawdown".to_string()
    }
}

impl Report for DrawdownTable {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                DrawdownCol::Label.name(),
                rows.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            ),
            date_column(DrawdownCol::Date, rows.iter().map(|r| r.date)).map_err(convert_err)?,
            Column::new(
                DrawdownCol::CumulativeReturn.name(),
                rows.iter().map(|r| r.cumulative_return).collect::<Vec<_>>(),
            ),
            Column::new(
                DrawdownCol::RunningPeak.name(),
                rows.iter().map(|r| r.running_peak).collect::<Vec<_>>(),
            ),
            Column::new(
                DrawdownCol::Drawdown.name(),
                rows.iter().map(|r| r.drawdown).collect::<Vec<_>>(),
            ),
            date_column(DrawdownCol::PeakDate, rows.iter().map(|r| r.peak_date))
                .map_err(convert_err)?,
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for DrawdownTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = DrawdownCol::iter()
            .map(|col| {
                let dtype = match col {
                    DrawdownCol::Label => DataType::String,
                    DrawdownCol::Date | DrawdownCol::PeakDate => DataType::Date,
                    DrawdownCol::CumulativeReturn
                    | DrawdownCol::RunningPeak
                    | DrawdownCol::Drawdown => DataType::Float64,
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
pub enum DrawdownCol {
    Label,
    Date,
    CumulativeReturn,
    RunningPeak,
    Drawdown,
    PeakDate,
}
impl_col_name!(DrawdownCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("drawdown", e)
}
