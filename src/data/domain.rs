use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, IntoStaticStr};
use strum_macros::EnumString;

use crate::{
    error::{FolioResult, InputError},
    impl_from_primitive, impl_string_newtype,
};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// Identifies a single priced instrument (e.g., `AAPL`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub String);
impl_string_newtype!(InstrumentId);

/// Static grouping metadata attached to an allocation (e.g., `US`, `DE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Country(pub String);
impl_string_newtype!(Country);

/// A strictly positive portfolio weight.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Weight(f64);
impl_from_primitive!(Weight, f64);

impl Weight {
    /// Validates that `value` is finite and strictly positive.
    pub fn new(instrument: &InstrumentId, value: f64) -> FolioResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(InputError::NonPositiveWeight {
                instrument: instrument.to_string(),
                weight: value,
            }
            .into());
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Weight {
    type Error = InputError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value <= 0.0 {
            return Err(InputError::InvalidWeight(value));
        }
        Ok(Self(value))
    }
}

// ================================================================================================
// Return Conventions
// ================================================================================================

/// The return definition used for a whole analysis run.
///
/// The two conventions aggregate differently and are never mixed:
/// - `Simple`: `r = p(t) / p(t-1) - 1`, compounded as `prod(1 + r) - 1`.
/// - `Log`: `r = ln p(t) - ln p(t-1)`, aggregated as a plain sum.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[serde(rename_all = "snake_case")]
pub enum ReturnConvention {
    #[default]
    Simple,
    Log,
}

impl ReturnConvention {
    /// Combines sub-period returns into a single period return.
    ///
    /// An empty input yields `0.0` under both conventions.
    pub fn compound<I>(&self, returns: I) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        match self {
            Self::Simple => returns.into_iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0,
            Self::Log => returns.into_iter().sum(),
        }
    }

    /// Extends a running cumulative return by one more period return.
    pub fn accumulate(&self, cumulative: f64, period_return: f64) -> f64 {
        match self {
            Self::Simple => (1.0 + cumulative) * (1.0 + period_return) - 1.0,
            Self::Log => cumulative + period_return,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Temporal Buckets
// ================================================================================================

/// Calendar buckets used by the temporal roll-up.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PeriodBucket {
    /// ISO week, keyed by ISO week-year so that late-December days of week 1
    /// are not merged into the first week of the same calendar year.
    Week,
    Month,
    Year,
}

/// Identifies one bucket instance, e.g. `(2023, Some(14))` for ISO week 14 of 2023.
///
/// `period` is `None` for yearly buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub period: Option<u32>,
}

impl PeriodBucket {
    pub fn key(&self, date: NaiveDate) -> PeriodKey {
        match self {
            Self::Week => {
                let iso = date.iso_week();
                PeriodKey {
                    year: iso.year(),
                    period: Some(iso.week()),
                }
            }
            Self::Month => PeriodKey {
                year: date.year(),
                period: Some(date.month()),
            },
            Self::Year => PeriodKey {
                year: date.year(),
                period: None,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Series Labels & Scopes
// ================================================================================================

/// Label of a performance series in the portfolio vs. benchmark comparison.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum SeriesLabel {
    Portfolio,
    Benchmark,
}

impl SeriesLabel {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// The entity an aggregated row describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Instrument(InstrumentId),
    Country(Country),
    Portfolio,
}

impl Scope {
    /// The scope kind, used as a categorical column in exported tables.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Instrument(_) => "instrument",
            Self::Country(_) => "country",
            Self::Portfolio => "portfolio",
        }
    }

    /// The scope identifier; the portfolio scope has none.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Instrument(id) => Some(id.as_str()),
            Self::Country(c) => Some(c.as_str()),
            Self::Portfolio => None,
        }
    }

    pub fn instrument(&self) -> Option<&InstrumentId> {
        match self {
            Self::Instrument(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{}", self.kind(), id),
            None => f.write_str(self.kind()),
        }
    }
}
