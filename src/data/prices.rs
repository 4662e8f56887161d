use std::{collections::BTreeSet, path::Path, sync::Arc};

use chrono::NaiveDate;
use polars::{
    frame::DataFrame,
    prelude::{
        Column, DataType, Field, LazyCsvReader, LazyFileListReader, PlPath, Schema, SchemaRef,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::warn;

use crate::{
    data::{
        allocation::AllocationSet,
        domain::{Country, InstrumentId, Weight},
    },
    error::{FolioError, FolioResult, InputError, IoError},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::{DataFrameExt, date_column, polars_to_folio_error},
    },
};

/// A single daily price of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub instrument_id: InstrumentId,
    pub date: NaiveDate,
    pub price: f64,
}

impl PriceObservation {
    pub fn new(instrument_id: impl Into<InstrumentId>, date: NaiveDate, price: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            date,
            price,
        }
    }
}

// ================================================================================================
// Price Table
// ================================================================================================

/// Validated price observations for any number of instruments.
///
/// # Invariants
/// - Rows are sorted by `(instrument_id, date)` ascending.
/// - Per instrument, dates are strictly increasing (no duplicates).
/// - Every price is finite and strictly positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceTable {
    rows: Vec<PriceObservation>,
}

impl PriceTable {
    pub fn new(observations: impl IntoIterator<Item = PriceObservation>) -> FolioResult<Self> {
        let mut rows = observations.into_iter().collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            a.instrument_id
                .cmp(&b.instrument_id)
                .then(a.date.cmp(&b.date))
        });

        for row in &rows {
            if !row.price.is_finite() || row.price <= 0.0 {
                return Err(InputError::NonPositivePrice {
                    instrument: row.instrument_id.to_string(),
                    date: row.date,
                    price: row.price,
                }
                .into());
            }
        }

        for pair in rows.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if prev.instrument_id == curr.instrument_id && prev.date >= curr.date {
                return Err(InputError::UnsortedDates {
                    instrument: curr.instrument_id.to_string(),
                    previous: prev.date,
                    current: curr.date,
                }
                .into());
            }
        }

        Ok(Self { rows })
    }

    /// Reads `instrument_id,date,price` rows (ISO dates) from a CSV file with a header.
    pub fn read_csv(path: impl AsRef<Path>) -> FolioResult<Self> {
        let path = path.as_ref();
        let uri = path.to_str().ok_or_else(|| {
            IoError::FileSystem(format!(
                "Path contains invalid UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let df = LazyCsvReader::new(PlPath::new(uri))
            .with_has_header(true)
            .with_schema(Some(Self::to_schema()))
            .with_try_parse_dates(true)
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;

        Self::try_from(&df)
    }

    /// Concatenates two tables, re-validating the combined rows.
    pub fn merge(self, other: PriceTable) -> FolioResult<Self> {
        Self::new(self.rows.into_iter().chain(other.rows))
    }

    pub fn rows(&self) -> &[PriceObservation] {
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

    /// The observations of one instrument, in date order.
    pub fn series<'a>(
        &'a self,
        id: &'a InstrumentId,
    ) -> impl Iterator<Item = &'a PriceObservation> + 'a {
        self.rows.iter().filter(move |r| &r.instrument_id == id)
    }

    /// Inner-joins the prices with static allocation metadata.
    ///
    /// Instruments without an allocation are dropped, as are allocations
    /// without prices; both cases are logged.
    pub fn join_allocations(&self, allocations: &AllocationSet) -> PricePanel {
        let priced = self.instrument_ids();

        for id in priced.iter().filter(|id| !allocations.contains(id)) {
            warn!(instrument = %id, "Dropping priced instrument without allocation");
        }
        for id in allocations.instrument_ids().filter(|id| !priced.contains(id)) {
            warn!(instrument = %id, "Dropping allocation without price observations");
        }

        let rows = self
            .rows
            .iter()
            .filter_map(|obs| {
                allocations.get(&obs.instrument_id).map(|a| PanelRow {
                    instrument_id: obs.instrument_id.clone(),
                    country: Some(a.country.clone()),
                    weight: a.weight,
                    date: obs.date,
                    price: obs.price,
                })
            })
            .collect();

        PricePanel { rows }
    }

    /// Treats every instrument as a standalone series with unit weight and no country.
    ///
    /// Used for the benchmark, whose returns are computed exactly like instrument returns.
    pub fn standalone(&self) -> FolioResult<PricePanel> {
        let rows = self
            .rows
            .iter()
            .map(|obs| {
                Ok(PanelRow {
                    instrument_id: obs.instrument_id.clone(),
                    country: None,
                    weight: Weight::new(&obs.instrument_id, 1.0)?,
                    date: obs.date,
                    price: obs.price,
                })
            })
            .collect::<FolioResult<Vec<_>>>()?;

        Ok(PricePanel { rows })
    }
}

impl TryFrom<&DataFrame> for PriceTable {
    type Error = FolioError;

    fn try_from(df: &DataFrame) -> FolioResult<Self> {
        let ids = df.str_values(PriceCol::InstrumentId.as_str())?;
        let dates = df.dates(PriceCol::Date.as_str())?;
        let prices = df.f64_values(PriceCol::Price.as_str())?;

        Self::new(
            ids.into_iter()
                .zip(dates)
                .zip(prices)
                .map(|((id, date), price)| PriceObservation::new(id, date, price)),
        )
    }
}

impl ReportName for PriceTable {
    fn base_name(&self) -> String {
        "prices".to_string()
    }
}

impl Report for PriceTable {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let columns = vec![
            Column::new(
                PriceCol::InstrumentId.name(),
                self.rows
                    .iter()
                    .map(|r| r.instrument_id.as_str())
                    .collect::<Vec<_>>(),
            ),
            date_column(PriceCol::Date, self.rows.iter().map(|r| r.date)).map_err(convert_err)?,
            Column::new(
                PriceCol::Price.name(),
                self.rows.iter().map(|r| r.price).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for PriceTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PriceCol::iter()
            .map(|col| {
                let dtype = match col {
                    PriceCol::InstrumentId => DataType::String,
                    PriceCol::Date => DataType::Date,
                    PriceCol::Price => DataType::Float64,
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
pub enum PriceCol {
    InstrumentId,
    Date,
    Price,
}
impl_col_name!(PriceCol);

// ================================================================================================
// Price Panel (prices joined with allocations)
// ================================================================================================

/// One price observation enriched with its allocation metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub instrument_id: InstrumentId,
    pub country: Option<Country>,
    pub weight: Weight,
    pub date: NaiveDate,
    pub price: f64,
}

/// Prices joined with allocations, sorted by `(instrument_id, date)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PricePanel {
    rows: Vec<PanelRow>,
}

impl PricePanel {
    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn instrument_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| &r.instrument_id)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl ReportName for PricePanel {
    fn base_name(&self) -> String {
        "price_panel".to_string()
    }
}

impl Report for PricePanel {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let columns = vec![
            Column::new(
                PanelCol::InstrumentId.name(),
                self.rows
                    .iter()
                    .map(|r| r.instrument_id.as_str())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                PanelCol::Country.name(),
                self.rows
                    .iter()
                    .map(|r| r.country.as_ref().map(Country::as_str))
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                PanelCol::Weight.name(),
                self.rows.iter().map(|r| r.weight.value()).collect::<Vec<_>>(),
            ),
            date_column(PanelCol::Date, self.rows.iter().map(|r| r.date)).map_err(convert_err)?,
            Column::new(
                PanelCol::Price.name(),
                self.rows.iter().map(|r| r.price).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for PricePanel {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PanelCol::iter()
            .map(|col| {
                let dtype = match col {
                    PanelCol::InstrumentId | PanelCol::Country => DataType::String,
                    PanelCol::Date => DataType::Date,
                    PanelCol::Weight | PanelCol::Price => DataType::Float64,
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
pub enum PanelCol {
    InstrumentId,
    Country,
    Weight,
    Date,
    Price,
}
impl_col_name!(PanelCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("price table", e)
}
