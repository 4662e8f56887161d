use std::{collections::BTreeSet, sync::Arc};

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
    data::{
        domain::{Country, InstrumentId, ReturnConvention, Weight},
        prices::{PanelRow, PricePanel},
    },
    error::{FolioError, FolioResult, InputError},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::{date_column, polars_to_folio_error},
    },
};

/// Daily return of one instrument against its immediately preceding observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnRecord {
    pub instrument_id: InstrumentId,
    pub country: Option<Country>,
    pub date: NaiveDate,
    pub price: f64,
    pub weight: Weight,
    pub simple_return: f64,
    pub log_return: f64,
    /// `weight * return`, where the return follows the table's convention.
    pub weighted_return: f64,
}

impl ReturnRecord {
    /// The unweighted return under `convention`.
    pub fn value(&self, convention: ReturnConvention) -> f64 {
        match convention {
            ReturnConvention::Simple => self.simple_return,
            ReturnConvention::Log => self.log_return,
        }
    }
}

/// Per-instrument daily returns, sorted by `(instrument_id, date)`.
///
/// The first observation of every instrument has no predecessor and produces
/// no record. A missing first row is a boundary, never a data gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnTable {
    convention: ReturnConvention,
    rows: Vec<ReturnRecord>,
}

impl ReturnTable {
    /// Computes returns for every instrument of a joined price panel.
    pub fn compute(panel: &PricePanel, convention: ReturnConvention) -> FolioResult<Self> {
        compute_returns(panel.rows(), convention)
    }

    pub fn convention(&self) -> ReturnConvention {
        self.convention
    }

    pub fn rows(&self) -> &[ReturnRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn instrument_ids(&self) -> BTreeSet<&InstrumentId> {
        self.rows.iter().map(|r| &r.instrument_id).collect()
    }

    /// The records of one instrument, in date order.
    pub fn series<'a>(&'a self, id: &'a InstrumentId) -> impl Iterator<Item = &'a ReturnRecord> {
        self.rows.iter().filter(move |r| &r.instrument_id == id)
    }
}

/// Derives simple, log and weighted returns from panel rows in any order.
///
/// Rows are re-sorted by `(instrument_id, date)` before differencing. Fails on
/// the first non-positive price, since its logarithm is undefined.
#[instrument(skip(rows), fields(rows = rows.len(), convention = %convention))]
pub fn compute_returns(rows: &[PanelRow], convention: ReturnConvention) -> FolioResult<ReturnTable> {
    if let Some(bad) = rows.iter().find(|r| !r.price.is_finite() || r.price <= 0.0) {
        return Err(InputError::NonPositivePrice {
            instrument: bad.instrument_id.to_string(),
            date: bad.date,
            price: bad.price,
        }
        .into());
    }

    let mut sorted = rows.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| {
        a.instrument_id
            .cmp(&b.instrument_id)
            .then(a.date.cmp(&b.date))
    });

    let groups = group_by_key(sorted, by_instrument);
    let instruments = groups.len();

    let mut out = Vec::with_capacity(rows.len().saturating_sub(instruments));
    for (_, group) in groups {
        for pair in group.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if prev.date == curr.date {
                return Err(InputError::UnsortedDates {
                    instrument: curr.instrument_id.to_string(),
                    previous: prev.date,
                    current: curr.date,
                }
                .into());
            }

            let simple_return = curr.price / prev.price - 1.0;
            let log_return = curr.price.ln() - prev.price.ln();
            let value = match convention {
                ReturnConvention::Simple => simple_return,
                ReturnConvention::Log => log_return,
            };

            out.push(ReturnRecord {
                instrument_id: curr.instrument_id.clone(),
                country: curr.country.clone(),
                date: curr.date,
                price: curr.price,
                weight: curr.weight,
                simple_return,
                log_return,
                weighted_return: value * curr.weight.value(),
            });
        }
    }

    debug!(instruments, records = out.len(), "Computed daily returns");
    Ok(ReturnTable {
        convention,
        rows: out,
    })
}

fn by_instrument<'a>(row: &&'a PanelRow) -> &'a InstrumentId {
    &row.instrument_id
}

// ================================================================================================
// Presentation
// ================================================================================================

impl ReportName for ReturnTable {
    fn base_name(&self) -> String {
        "returns".to_string()
    }
}

impl Report for ReturnTable {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                ReturnCol::InstrumentId.name(),
                rows.iter().map(|r| r.instrument_id.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                ReturnCol::Country.name(),
                rows.iter()
                    .map(|r| r.country.as_ref().map(Country::as_str))
                    .collect::<Vec<_>>(),
            ),
            date_column(ReturnCol::Date, rows.iter().map(|r| r.date)).map_err(convert_err)?,
            Column::new(
                ReturnCol::Price.name(),
                rows.iter().map(|r| r.price).collect::<Vec<_>>(),
            ),
            Column::new(
                ReturnCol::Weight.name(),
                rows.iter().map(|r| r.weight.value()).collect::<Vec<_>>(),
            ),
            Column::new(
                ReturnCol::SimpleReturn.name(),
                rows.iter().map(|r| r.simple_return).collect::<Vec<_>>(),
            ),
            Column::new(
                ReturnCol::LogReturn.name(),
                rows.iter().map(|r| r.log_return).collect::<Vec<_>>(),
            ),
            Column::new(
                ReturnCol::WeightedReturn.name(),
                rows.iter().map(|r| r.weighted_return).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for ReturnTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = ReturnCol::iter()
            .map(|col| {
                let dtype = match col {
                    ReturnCol::InstrumentId | ReturnCol::Country => DataType::String,
                    ReturnCol::Date => DataType::Date,
                    ReturnCol::Price
                    | ReturnCol::Weight
                    | ReturnCol::SimpleReturn
                    | ReturnCol::LogReturn
                    | ReturnCol::WeightedReturn => DataType::Float64,
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
pub enum ReturnCol {
    InstrumentId,
    Country,
    Date,
    Price,
    Weight,
    SimpleReturn,
    LogReturn,
    WeightedReturn,
}
impl_col_name!(ReturnCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("returns", e)
}
