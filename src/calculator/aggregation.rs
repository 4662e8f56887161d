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
    calculator::{returns::ReturnTable, segment::aggregate_by},
    data::domain::{PeriodBucket, ReturnConvention, Scope},
    error::{FolioError, FolioResult},
    impl_col_name,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::{date_column, polars_to_folio_error},
    },
};

// ================================================================================================
// Daily Series
// ================================================================================================

/// One return per scope and date, before any temporal roll-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReturn {
    pub scope: Scope,
    pub date: NaiveDate,
    pub value: f64,
    /// Number of instrument records contributing to `value`.
    pub constituents: usize,
}

/// Unweighted daily returns of every instrument under `convention`.
pub fn instrument_daily(table: &ReturnTable, convention: ReturnConvention) -> Vec<DailyReturn> {
    table
        .rows()
        .iter()
        .map(|r| DailyReturn {
            scope: Scope::Instrument(r.instrument_id.clone()),
            date: r.date,
            value: r.value(convention),
            constituents: 1,
        })
        .collect()
}

/// Portfolio return per date: `sum(weight * return)` across all instruments priced that date.
pub fn portfolio_daily(table: &ReturnTable, convention: ReturnConvention) -> Vec<DailyReturn> {
    aggregate_by(
        table.rows(),
        |r| r.date,
        |date, group| DailyReturn {
            scope: Scope::Portfolio,
            date: *date,
            value: group
                .iter()
                .map(|r| r.weight.value() * r.value(convention))
                .sum(),
            constituents: group.len(),
        },
    )
    .into_iter()
    .map(|(_, daily)| daily)
    .collect()
}

/// Weighted return contribution per country and date.
///
/// Records without a country (e.g. a standalone benchmark) are skipped.
pub fn country_daily(table: &ReturnTable, convention: ReturnConvention) -> Vec<DailyReturn> {
    let with_country = table
        .rows()
        .iter()
        .filter_map(|r| r.country.as_ref().map(|c| (c, r)));

    aggregate_by(
        with_country,
        |(country, r)| ((*country).clone(), r.date),
        |(country, date), group| DailyReturn {
            scope: Scope::Country(country.clone()),
            date: *date,
            value: group
                .iter()
                .map(|(_, r)| r.weight.value() * r.value(convention))
                .sum(),
            constituents: group.len(),
        },
    )
    .into_iter()
    .map(|(_, daily)| daily)
    .collect()
}

// ================================================================================================
// Temporal Roll-up
// ================================================================================================

/// Compounded return of one scope over one calendar bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReturn {
    pub scope: Scope,
    pub bucket: PeriodBucket,
    pub year: i32,
    /// ISO week or month number; `None` for yearly buckets.
    pub period: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub observations: usize,
    pub compounded_return: f64,
}

/// Rolls daily returns up into `bucket`, compounding with `convention`.
///
/// Groups are defined by the data present: a week without observations
/// produces no row. Input order is irrelevant.
pub fn roll_up(
    daily: &[DailyReturn],
    bucket: PeriodBucket,
    convention: ReturnConvention,
) -> Vec<PeriodReturn> {
    aggregate_by(
        daily,
        |d| (d.scope.clone(), bucket.key(d.date)),
        |(scope, key), group| -> Option<PeriodReturn> {
            let start_date = group.iter().map(|d| d.date).min()?;
            let end_date = group.iter().map(|d| d.date).max()?;
            Some(PeriodReturn {
                scope: scope.clone(),
                bucket,
                year: key.year,
                period: key.period,
                start_date,
                end_date,
                observations: group.len(),
                compounded_return: convention.compound(group.iter().map(|d| d.value)),
            })
        },
    )
    .into_iter()
    .filter_map(|(_, period)| period)
    .collect()
}

/// Period returns per instrument, country and portfolio for a set of buckets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReturns {
    convention: ReturnConvention,
    rows: Vec<PeriodReturn>,
}

impl PeriodReturns {
    /// Rolls the table up into each of `buckets`.
    ///
    /// Portfolio and country periods compound the daily weighted sums; they are
    /// never built by weighting instrument period returns.
    #[instrument(skip(table), fields(records = table.len(), convention = %table.convention()))]
    pub fn compute(table: &ReturnTable, buckets: &[PeriodBucket]) -> FolioResult<Self> {
        let convention = table.convention();

        let mut daily = instrument_daily(table, convention);
        daily.extend(country_daily(table, convention));
        daily.extend(portfolio_daily(table, convention));

        let rows = buckets
            .iter()
            .flat_map(|bucket| roll_up(&daily, *bucket, convention))
            .collect::<Vec<_>>();

        debug!(periods = rows.len(), "Rolled up period returns");
        Ok(Self { convention, rows })
    }

    pub fn convention(&self) -> ReturnConvention {
        self.convention
    }

    pub fn rows(&self) -> &[PeriodReturn] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of one scope and bucket, in period order.
    pub fn select<'a>(
        &'a self,
        scope: &'a Scope,
        bucket: PeriodBucket,
    ) -> impl Iterator<Item = &'a PeriodReturn> {
        self.rows
            .iter()
            .filter(move |r| &r.scope == scope && r.bucket == bucket)
    }
}

impl ReportName for PeriodReturns {
    fn base_name(&self) -> String {
        "period_returns".to_string()
    }
}

impl Report for PeriodReturns {
    fn to_df(&self) -> FolioResult<DataFrame> {
        let rows = &self.rows;
        let columns = vec![
            Column::new(
                PeriodReturnCol::ScopeKind.name(),
                rows.iter().map(|r| r.scope.kind()).collect::<Vec<_>>(),
            ),
            Column::new(
                PeriodReturnCol::ScopeId.name(),
                rows.iter().map(|r| r.scope.id()).collect::<Vec<_>>(),
            ),
            Column::new(
                PeriodReturnCol::Bucket.name(),
                rows.iter().map(|r| r.bucket.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                PeriodReturnCol::Year.name(),
                rows.iter().map(|r| r.year).collect::<Vec<_>>(),
            ),
            Column::new(
                PeriodReturnCol::Period.name(),
                rows.iter().map(|r| r.period).collect::<Vec<_>>(),
            ),
            date_column(PeriodReturnCol::StartDate, rows.iter().map(|r| r.start_date))
                .map_err(convert_err)?,
            date_column(PeriodReturnCol::EndDate, rows.iter().map(|r| r.end_date))
                .map_err(convert_err)?,
            Column::new(
                PeriodReturnCol::Observations.name(),
                rows.iter()
                    .map(|r| r.observations as u32)
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                PeriodReturnCol::CompoundedReturn.name(),
                rows.iter().map(|r| r.compounded_return).collect::<Vec<_>>(),
            ),
        ];
        DataFrame::new(columns).map_err(convert_err)
    }
}

impl ToSchema for PeriodReturns {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PeriodReturnCol::iter()
            .map(|col| {
                let dtype = match col {
                    PeriodReturnCol::ScopeKind
                    | PeriodReturnCol::ScopeId
                    | PeriodReturnCol::Bucket => DataType::String,
                    PeriodReturnCol::Year => DataType::Int32,
                    PeriodReturnCol::Period | PeriodReturnCol::Observations => DataType::UInt32,
                    PeriodReturnCol::StartDate | PeriodReturnCol::EndDate => DataType::Date,
                    PeriodReturnCol::CompoundedReturn => DataType::Float64,
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
pub enum PeriodReturnCol {
    ScopeKind,
    ScopeId,
    Bucket,
    Year,
    Period,
    StartDate,
    EndDate,
    Observations,
    CompoundedReturn,
}
impl_col_name!(PeriodReturnCol);

fn convert_err(e: polars::error::PolarsError) -> FolioError {
    polars_to_folio_error("period returns", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calculator::returns::compute_returns,
        data::{
            domain::{Country, InstrumentId, Weight},
            prices::PanelRow,
        },
        sim::random_walk::{GbmParams, PriceSimulator},
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn rows(id: &str, country: &str, weight: f64, start: NaiveDate, prices: &[f64]) -> Vec<PanelRow> {
        let instrument_id = InstrumentId::from(id);
        let weight = Weight::new(&instrument_id, weight).expect("valid weight");
        prices
            .iter()
            .zip(start.iter_days())
            .map(|(p, d)| PanelRow {
                instrument_id: instrument_id.clone(),
                country: Some(Country::from(country)),
                weight,
                date: d,
                price: *p,
            })
            .collect()
    }

    // ============================================================================================
    // Daily Series
    // ============================================================================================

    #[test]
    fn test_identical_returns_with_unit_weights_give_that_return() {
        let start = date(2021, 1, 1);
        let mut panel = rows("A", "US", 0.4, start, &[100.0, 101.0]);
        panel.extend(rows("B", "US", 0.3, start, &[50.0, 50.5]));
        panel.extend(rows("C", "DE", 0.2, start, &[20.0, 20.2]));
        panel.extend(rows("D", "DE", 0.1, start, &[10.0, 10.1]));

        let table = compute_returns(&panel, ReturnConvention::Simple).expect("returns");
        let daily = portfolio_daily(&table, ReturnConvention::Simple);

        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].date, date(2021, 1, 2));
        assert_eq!(daily[0].constituents, 4);
        assert!((daily[0].value - 0.01).abs() < 1e-12, "got {}", daily[0].value);
    }

    #[test]
    fn test_country_daily_sums_weighted_contributions() {
        let start = date(2021, 1, 1);
        let mut panel = rows("A", "US", 0.5, start, &[100.0, 110.0]);
        panel.extend(rows("B", "US", 0.3, start, &[100.0, 90.0]));
        panel.extend(rows("C", "DE", 0.2, start, &[100.0, 105.0]));

        let table = compute_returns(&panel, ReturnConvention::Simple).expect("returns");
        let daily = country_daily(&table, ReturnConvention::Simple);

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].scope, Scope::Country(Country::from("DE")));
        assert!((daily[0].value - 0.01).abs() < 1e-12);
        assert_eq!(daily[1].scope, Scope::Country(Country::from("US")));
        assert!((daily[1].value - 0.02).abs() < 1e-12);
        assert_eq!(daily[1].constituents, 2);
    }

    // ============================================================================================
    // Roll-up
    // ============================================================================================

    #[test]
    fn test_roll_up_groups_only_present_periods() {
        let daily = [
            (date(2021, 1, 4), 0.01),
            (date(2021, 1, 5), 0.02),
            (date(2021, 3, 1), -0.01),
        ]
        .into_iter()
        .map(|(d, v)| DailyReturn {
            scope: Scope::Portfolio,
            date: d,
            value: v,
            constituents: 1,
        })
        .collect::<Vec<_>>();

        let months = roll_up(&daily, PeriodBucket::Month, ReturnConvention::Simple);
        assert_eq!(months.len(), 2, "February has no data and produces no row");

        assert_eq!((months[0].year, months[0].period), (2021, Some(1)));
        assert!((months[0].compounded_return - (1.01 * 1.02 - 1.0)).abs() < 1e-12);
        assert_eq!(months[0].observations, 2);
        assert_eq!(months[0].start_date, date(2021, 1, 4));
        assert_eq!(months[0].end_date, date(2021, 1, 5));

        assert_eq!((months[1].year, months[1].period), (2021, Some(3)));
        assert!((months[1].compounded_return - (-0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_weekly_roll_up_splits_on_iso_weeks() {
        // Sun 2021-01-03 closes ISO week 53 of 2020; Mon 2021-01-04 opens week 1.
        let daily = [date(2021, 1, 3), date(2021, 1, 4), date(2021, 1, 5)]
            .into_iter()
            .map(|d| DailyReturn {
                scope: Scope::Portfolio,
                date: d,
                value: 0.01,
                constituents: 1,
            })
            .collect::<Vec<_>>();

        let weeks = roll_up(&daily, PeriodBucket::Week, ReturnConvention::Log);
        let keys = weeks.iter().map(|w| (w.year, w.period)).collect::<Vec<_>>();
        assert_eq!(keys, vec![(2020, Some(53)), (2021, Some(1))]);
        assert!((weeks[1].compounded_return - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_portfolio_compounds_daily_sums_not_weighted_periods() {
        let start = date(2021, 1, 1);
        let mut panel = rows("A", "US", 0.5, start, &[100.0, 110.0, 121.0]);
        panel.extend(rows("B", "US", 0.5, start, &[100.0, 90.0, 81.0]));

        let periods =
            PeriodReturns::compute(&compute_returns(&panel, ReturnConvention::Simple).expect("returns"), &[
                PeriodBucket::Month,
            ])
            .expect("periods");

        let portfolio = periods
            .select(&Scope::Portfolio, PeriodBucket::Month)
            .collect::<Vec<_>>();
        assert_eq!(portfolio.len(), 1);
        // Daily portfolio returns are 0.0 and 0.0: (0.5 * 0.1 + 0.5 * -0.1).
        assert!(portfolio[0].compounded_return.abs() < 1e-12);

        // Weighting the instrument month returns instead gives 0.5 * 0.21 + 0.5 * -0.19 = 0.01.
        let scope_a = Scope::Instrument(InstrumentId::from("A"));
        let a = periods
            .select(&scope_a, PeriodBucket::Month)
            .next()
            .expect("instrument A month");
        assert!((a.compounded_return - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_yearly_log_sum_equals_log_price_ratio() {
        let id = InstrumentId::from("AAPL");
        let prices = PriceSimulator::new(11)
            .simulate_table([(&id, GbmParams::default())], date(2021, 1, 1), date(2021, 12, 31))
            .expect("prices");
        let panel = prices.standalone().expect("panel");
        let table = compute_returns(panel.rows(), ReturnConvention::Log).expect("returns");

        let periods = PeriodReturns::compute(&table, &[PeriodBucket::Year]).expect("periods");
        let scope = Scope::Instrument(id.clone());
        let year = periods
            .select(&scope, PeriodBucket::Year)
            .next()
            .expect("one year");

        let first = prices.rows().first().expect("first price").price;
        let last = prices.rows().last().expect("last price").price;
        assert!(
            (year.compounded_return - (last / first).ln()).abs() < 1e-10,
            "sum of logs {} != ln ratio {}",
            year.compounded_return,
            (last / first).ln()
        );
        assert_eq!(year.observations, 364);
    }

    #[test]
    fn test_to_df_matches_schema() {
        let start = date(2021, 1, 1);
        let panel = rows("A", "US", 1.0, start, &[100.0, 101.0, 102.0]);
        let table = compute_returns(&panel, ReturnConvention::Simple).expect("returns");
        let periods =
            PeriodReturns::compute(&table, &[PeriodBucket::Week, PeriodBucket::Year]).expect("periods");
        let df = periods.to_df().expect("frame");

        let expected = PeriodReturns::to_schema();
        for (name, dtype) in expected.iter() {
            let actual = df
                .column(name)
                .unwrap_or_else(|_| panic!("Column '{}' not found", name))
                .dtype();
            assert_eq!(actual, dtype, "Type mismatch for column '{}'", name);
        }
        assert_eq!(df.height(), periods.len());
    }
}
