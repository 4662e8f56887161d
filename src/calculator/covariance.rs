use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, Schema, SchemaRef},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, instrument, warn};

use crate::{
    calculator::returns::ReturnTable,
    data::{allocation::AllocationSet, domain::InstrumentId},
    error::{DataError, FolioError, FolioResult},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::polars_to_folio_error,
    },
};

// ================================================================================================
// Wide Pivot
// ================================================================================================

/// Log returns pivoted into a `date x instrument` matrix.
///
/// A cell is `None` where the instrument has no return on that date.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPivot {
    instruments: Vec<InstrumentId>,
    dates: Vec<NaiveDate>,
    values: Array2<Option<f64>>,
}

impl ReturnPivot {
    pub fn from_table(table: &ReturnTable) -> Self {
        Self::from_observations(
            table
                .rows()
                .iter()
                .map(|r| (r.instrument_id.clone(), r.date, r.log_return)),
        )
    }

    /// Builds the pivot from `(instrument, date, value)` triples.
    ///
    /// Columns are ordered by instrument key, rows by date. A repeated
    /// `(instrument, date)` keeps the last value.
    pub fn from_observations(
        observations: impl IntoIterator<Item = (InstrumentId, NaiveDate, f64)>,
    ) -> Self {
        let mut by_instrument = BTreeMap::<InstrumentId, BTreeMap<NaiveDate, f64>>::new();
        for (id, date, value) in observations {
            by_instrument.entry(id).or_default().insert(date, value);
        }

        let dates = by_instrument
            .values()
            .flat_map(|series| series.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let instruments = by_instrument.keys().cloned().collect::<Vec<_>>();

        let values = Array2::from_shape_fn((dates.len(), instruments.len()), |(row, col)| {
            by_instrument
                .get(&instruments[col])
                .and_then(|series| series.get(&dates[row]))
                .copied()
        });

        Self {
            instruments,
            dates,
            values,
        }
    }

    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Values of two columns on the dates where both are observed.
    fn overlap(&self, a: usize, b: usize) -> Vec<(f64, f64)> {
        self.values
            .column(a)
            .iter()
            .zip(self.values.column(b).iter())
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .collect()
    }
}

// ================================================================================================
// Covariance
// ================================================================================================

/// Pairwise-complete sample covariance of instrument log returns.
///
/// Every entry `(i, j)` uses only the dates on which both instruments have a
/// return, with its own means and `n - 1` denominator. The matrix is symmetric
/// but not guaranteed to be positive semi-definite.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    instruments: Vec<InstrumentId>,
    matrix: Array2<f64>,
    overlaps: Array2<usize>,
}

impl CovarianceMatrix {
    #[instrument(skip(table), fields(records = table.len()))]
    pub fn compute(table: &ReturnTable) -> FolioResult<Self> {
        Self::from_pivot(&ReturnPivot::from_table(table))
    }

    /// # Errors
    /// `DataError::InsufficientData` if any pair overlaps on fewer than two dates.
    pub fn from_pivot(pivot: &ReturnPivot) -> FolioResult<Self> {
        let n = pivot.instruments.len();
        let mut matrix = Array2::<f64>::zeros((n, n));
        let mut overlaps = Array2::<usize>::zeros((n, n));

        for i in 0..n {
            for j in i..n {
                let pairs = pivot.overlap(i, j);
                let cov = pairwise_covariance(&pairs).ok_or_else(|| {
                    DataError::InsufficientData {
                        context: format!(
                            "covariance of {} and {}",
                            pivot.instruments[i], pivot.instruments[j]
                        ),
                        required: 2,
                        found: pairs.len(),
                    }
                })?;
                matrix[[i, j]] = cov;
                matrix[[j, i]] = cov;
                overlaps[[i, j]] = pairs.len();
                overlaps[[j, i]] = pairs.len();
            }
        }

        debug!(instruments = n, dates = pivot.dates.len(), "Computed covariance matrix");
        Ok(Self {
            instruments: pivot.instruments.clone(),
            matrix,
            overlaps,
        })
    }

    /// Column (and row) order of the matrix.
    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    fn index_of(&self, id: &InstrumentId) -> Option<usize> {
        self.instruments.iter().position(|i| i == id)
    }

    pub fn get(&self, a: &InstrumentId, b: &InstrumentId) -> Option<f64> {
        Some(self.matrix[[self.index_of(a)?, self.index_of(b)?]])
    }

    /// Number of dates the pair `(a, b)` was computed from.
    pub fn overlap(&self, a: &InstrumentId, b: &InstrumentId) -> Option<usize> {
        Some(self.overlaps[[self.index_of(a)?, self.index_of(b)?]])
    }

    /// The same matrix with rows and columns permuted into `order`.
    ///
    /// # Errors
    /// - `DataError::MisalignedOrder` if `order` repeats an id or has a
    ///   different length than the matrix.
    /// - `DataError::MissingSeries` if `order` names an unknown instrument.
    pub fn reordered(&self, order: &[InstrumentId]) -> FolioResult<Self> {
        let unique = order.iter().collect::<BTreeSet<_>>().len();
        if unique != order.len() || order.len() != self.instruments.len() {
            return Err(DataError::MisalignedOrder(format!(
                "{} ids ({unique} unique) for {} columns",
                order.len(),
                self.instruments.len()
            ))
            .into());
        }

        let idx = order
            .iter()
            .map(|id| {
                self.index_of(id)
                    .ok_or_else(|| DataError::MissingSeries(id.to_string()).into())
            })
            .collect::<FolioResult<Vec<_>>>()?;

        let n = idx.len();
        Ok(Self {
            instruments: order.to_vec(),
            matrix: Array2::from_shape_fn((n, n), |(i, j)| self.matrix[[idx[i], idx[j]]]),
            overlaps: Array2::from_shape_fn((n, n), |(i, j)| self.overlaps[[idx[i], idx[j]]]),
        })
    }
}

fn pairwise_covariance(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sum = pairs
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>();
    Some(sum / (n - 1.0))
}

// ================================================================================================
// Portfolio Risk
// ================================================================================================

/// `sqrt(w' Σ w)` of daily log returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRisk {
    pub variance: f64,
    pub volatility: f64,
}

impl PortfolioRisk {
    /// Aligns weights to the matrix columns by instrument key.
    ///
    /// # Errors
    /// - `DataError::MissingWeight` if a matrix column has no allocation.
    /// - `DataError::NegativeVariance` if `w' Σ w < 0`, which an indefinite
    ///   pairwise matrix can produce.
    #[instrument(skip_all, fields(instruments = covariance.instruments().len()))]
    pub fn compute(covariance: &CovarianceMatrix, allocations: &AllocationSet) -> FolioResult<Self> {
        let weights = covariance
            .instruments()
            .iter()
            .map(|id| {
                allocations
                    .weight_of(id)
                    .map(|w| w.value())
                    .ok_or_else(|| DataError::MissingWeight(id.to_string()).into())
            })
            .collect::<FolioResult<Vec<_>>>()?;

        for id in allocations
            .instrument_ids()
            .filter(|id| !covariance.instruments().contains(id))
        {
            warn!(instrument = %id, "Ignoring allocation absent from the covariance matrix");
        }

        let w = Array1::from(weights);
        let variance = w.dot(&covariance.matrix().dot(&w));
        if variance < 0.0 {
            return Err(DataError::NegativeVariance(variance).into());
        }

        Ok(Self {
            variance,
            volatility: variance.sqrt(),
        })
    }
}

// ================================================================================================
// Presentation
// ================================================================================================

impl ReportName for CovarianceMatrix {
    fn base_name(&self) -> String {
        "covariance".to_string()
    }
}

impl Report for CovarianceMatrix {
    /// Long format, one row per ordered instrument pair.
    fn to_df(&self) -> FolioResult<DataFrame> {
        let n = self.instruments.len();
        let pairs = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .collect::<Vec<_>>();

        let columns = vec![
            Column::new(
                CovarianceCol::InstrumentA.name(),
                pairs
                    .iter()
                    .map(|(i, _)| self.instruments[*i].as_str())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                CovarianceCol::InstrumentB.name(),
                pairs
                    .iter()
                    .map(|(_, j)| self.instruments[*j].as_str())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                CovarianceCol::Overlap.name(),
                pairs
                    .iter()
                    .map(|(i, j)| self.overlaps[[*i, *j]] as u32)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                CovarianceCol::Covariance.name(),
                pairs
                    .iter()
                    .map(|(i, j)| self.matrix[[*i, *j]])
                    .collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for CovarianceMatrix {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = CovarianceCol::iter()
            .map(|col| {
                let dtype = match col {
                    CovarianceCol::InstrumentA | CovarianceCol::InstrumentB => DataType::String,
                    CovarianceCol::Overlap => DataType::UInt32,
                    CovarianceCol::Covariance => DataType::Float64,
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
pub enum CovarianceCol {
    InstrumentA,
    InstrumentB,
    Overlap,
    Covariance,
}
impl_col_name!(CovarianceCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("covariance", e)
}
