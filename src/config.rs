use std::{fs, path::Path};

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        allocation::{Allocation, AllocationSet},
        domain::{Country, InstrumentId, ReturnConvention},
    },
    error::{ConfigError, DataError, FolioResult, InputError, IoError},
    sim::random_walk::GbmParams,
};

/// One portfolio constituent: allocation metadata plus its simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: InstrumentId,
    pub weight: f64,
    pub country: Country,
    #[serde(default)]
    pub params: GbmParams,
}

impl InstrumentSpec {
    pub fn new(id: impl Into<InstrumentId>, weight: f64, country: impl Into<Country>) -> Self {
        Self {
            id: id.into(),
            weight,
            country: country.into(),
            params: GbmParams::default(),
        }
    }

    pub fn with_params(self, params: GbmParams) -> Self {
        Self { params, ..self }
    }
}

/// The reference series the portfolio is compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub id: InstrumentId,
    #[serde(default = "GbmParams::benchmark")]
    pub params: GbmParams,
}

impl Default for BenchmarkSpec {
    fn default() -> Self {
        Self {
            id: InstrumentId::from("BENCHMARK"),
            params: GbmParams::benchmark(),
        }
    }
}

/// Everything one analysis run depends on.
///
/// Two runs with equal configs produce identical tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    seed: u64,
    start: NaiveDate,
    end: NaiveDate,
    instruments: Vec<InstrumentSpec>,

    #[serde(default)]
    benchmark: BenchmarkSpec,

    /// Return definition for roll-ups and cumulative series.
    #[serde(default)]
    convention: ReturnConvention,

    /// First date of the yearly performance window.
    #[serde(default)]
    window_start: Option<NaiveDate>,
}

impl PipelineConfig {
    /// Creates a config with no instruments, the default benchmark and simple returns.
    pub fn new(seed: u64, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            seed,
            start,
            end,
            instruments: Vec::new(),
            benchmark: BenchmarkSpec::default(),
            convention: ReturnConvention::default(),
            window_start: None,
        }
    }

    /// Four instruments over 2020-2023 with weights 0.4 / 0.3 / 0.2 / 0.1.
    pub fn demo() -> FolioResult<Self> {
        let config = Self::new(42, ymd(2020, 1, 1)?, ymd(2023, 12, 31)?)
            .with_instrument(InstrumentSpec::new("AAPL", 0.4, "US"))
            .with_instrument(
                InstrumentSpec::new("MSFT", 0.3, "US")
                    .with_params(GbmParams::default().with_drift(0.0006)),
            )
            .with_instrument(
                InstrumentSpec::new("SAP", 0.2, "DE")
                    .with_params(GbmParams::default().with_volatility(0.012)),
            )
            .with_instrument(
                InstrumentSpec::new("TM", 0.1, "JP").with_params(
                    GbmParams::default()
                        .with_drift(0.0003)
                        .with_volatility(0.009),
                ),
            )
            .with_benchmark(BenchmarkSpec {
                id: InstrumentId::from("WORLD"),
                params: GbmParams::benchmark(),
            })
            .with_window_start(ymd(2022, 1, 10)?);

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> FolioResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> FolioResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> FolioResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| IoError::Json(e).into())
    }

    // ============================================================================================
    // Builders
    // ============================================================================================

    pub fn with_instrument(mut self, spec: InstrumentSpec) -> Self {
        self.instruments.push(spec);
        self
    }

    pub fn with_instruments(self, instruments: Vec<InstrumentSpec>) -> Self {
        Self {
            instruments,
            ..self
        }
    }

    pub fn with_benchmark(self, benchmark: BenchmarkSpec) -> Self {
        Self { benchmark, ..self }
    }

    pub fn with_convention(self, convention: ReturnConvention) -> Self {
        Self { convention, ..self }
    }

    pub fn with_window_start(self, window_start: NaiveDate) -> Self {
        Self {
            window_start: Some(window_start),
            ..self
        }
    }

    // ============================================================================================
    // Accessors
    // ============================================================================================

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn instruments(&self) -> &[InstrumentSpec] {
        &self.instruments
    }

    pub fn benchmark(&self) -> &BenchmarkSpec {
        &self.benchmark
    }

    pub fn convention(&self) -> ReturnConvention {
        self.convention
    }

    pub fn window_start(&self) -> Option<NaiveDate> {
        self.window_start
    }

    /// Validated allocations of the configured instruments.
    pub fn allocations(&self) -> FolioResult<AllocationSet> {
        AllocationSet::new(
            self.instruments
                .iter()
                .map(|s| Allocation::new(s.id.clone(), s.weight, s.country.clone()))
                .collect::<FolioResult<Vec<_>>>()?,
        )
    }

    /// Fails fast on anything that would otherwise surface deep inside a stage.
    pub fn validate(&self) -> FolioResult<()> {
        if self.start > self.end {
            return Err(InputError::InvalidDateRange {
                start: self.start,
                end: self.end,
            }
            .into());
        }

        // Rejects empty sets, duplicates and non-positive weights.
        self.allocations()?;

        let per_year = returns_per_year(self.start, self.end);
        if per_year.is_empty() {
            return Err(DataError::InsufficientData {
                context: "daily returns in range".to_string(),
                required: 2,
                found: 0,
            }
            .into());
        }
        for (year, returns) in per_year {
            if returns < 2 {
                return Err(DataError::InsufficientData {
                    context: format!("daily returns in {year}"),
                    required: 2,
                    found: returns,
                }
                .into());
            }
        }

        for spec in &self.instruments {
            spec.params.validate()?;
        }
        self.benchmark.params.validate()?;

        if self.instruments.iter().any(|s| s.id == self.benchmark.id) {
            return Err(ConfigError::Invalid(format!(
                "Benchmark '{}' is also a portfolio instrument",
                self.benchmark.id
            ))
            .into());
        }

        if let Some(window_start) = self.window_start.filter(|w| *w > self.end) {
            return Err(ConfigError::Invalid(format!(
                "Window start {window_start} is after the end date {}",
                self.end
            ))
            .into());
        }

        Ok(())
    }
}

/// Number of daily returns per calendar year of a simulated `[start, end]` range.
///
/// The first day has no return. Years without any return are not listed.
fn returns_per_year(start: NaiveDate, end: NaiveDate) -> Vec<(i32, usize)> {
    start
        .iter_days()
        .skip(1)
        .take_while(|d| *d <= end)
        .chunk_by(|d| d.year())
        .into_iter()
        .map(|(year, days)| (year, days.count()))
        .collect()
}

fn ymd(year: i32, month: u32, day: u32) -> FolioResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ConfigError::Invalid(format!("Invalid calendar date {year}-{month:02}-{day:02}")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FolioError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_demo_config_is_valid() {
        let config = PipelineConfig::demo().expect("demo config");
        assert_eq!(config.instruments().len(), 4);
        assert_eq!(config.convention(), ReturnConvention::Simple);

        let allocations = config.allocations().expect("allocations");
        assert!((allocations.total_weight() - 1.0).abs() < 1e-12);
        assert_eq!(config.benchmark().params.base_price, 3000.0);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "seed": 7,
            "start": "2021-01-01",
            "end": "2021-06-30",
            "instruments": [
                { "id": "AAPL", "weight": 0.6, "country": "US" },
                { "id": "SAP", "weight": 0.4, "country": "DE",
                  "params": { "base_price": 50.0, "drift": 0.0, "volatility": 0.02 } }
            ]
        }"#;

        let config = PipelineConfig::from_json_str(json).expect("parsed config");
        assert_eq!(config.seed(), 7);
        assert_eq!(config.instruments()[0].params, GbmParams::default());
        assert_eq!(config.instruments()[1].params.base_price, 50.0);
        assert_eq!(config.benchmark(), &BenchmarkSpec::default());
        assert_eq!(config.convention(), ReturnConvention::Simple);
        assert_eq!(config.window_start(), None);
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig::demo()
            .expect("demo config")
            .with_convention(ReturnConvention::Log);
        let json = config.to_json_string().expect("serialized");
        assert!(json.contains("\"convention\": \"log\""));
        assert_eq!(PipelineConfig::from_json_str(&json).expect("parsed"), config);
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        let result = PipelineConfig::from_json_str("{ \"seed\": ");
        assert!(matches!(result, Err(FolioError::Config(ConfigError::Json(_)))));
    }

    #[test]
    fn test_start_after_end_is_rejected() {
        let config = PipelineConfig::new(1, date(2021, 2, 1), date(2021, 1, 1))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"));
        assert!(matches!(
            config.validate(),
            Err(FolioError::Input(InputError::InvalidDateRange { .. }))
        ));
    }

    #[test]
    fn test_non_positive_weight_is_rejected() {
        let config = PipelineConfig::new(1, date(2021, 1, 1), date(2021, 2, 1))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"))
            .with_instrument(InstrumentSpec::new("MSFT", 0.0, "US"));
        assert!(matches!(
            config.validate(),
            Err(FolioError::Input(InputError::NonPositiveWeight { .. }))
        ));
    }

    #[test]
    fn test_empty_and_duplicate_instruments_are_rejected() {
        let empty = PipelineConfig::new(1, date(2021, 1, 1), date(2021, 2, 1));
        assert!(matches!(
            empty.validate(),
            Err(FolioError::Input(InputError::EmptyInstrumentSet))
        ));

        let duplicate = empty
            .with_instrument(InstrumentSpec::new("AAPL", 0.5, "US"))
            .with_instrument(InstrumentSpec::new("AAPL", 0.5, "US"));
        assert!(matches!(
            duplicate.validate(),
            Err(FolioError::Input(InputError::DuplicateInstrument(_)))
        ));
    }

    #[test]
    fn test_year_with_a_single_return_is_rejected() {
        let config = PipelineConfig::new(1, date(2021, 1, 1), date(2022, 1, 1))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"));
        assert!(matches!(
            config.validate(),
            Err(FolioError::Data(DataError::InsufficientData { found: 1, .. }))
        ));

        // 2021-12-31 has no return of its own, so 2021 is simply absent.
        let late_start = PipelineConfig::new(1, date(2021, 12, 31), date(2022, 1, 2))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"));
        assert!(late_start.validate().is_ok());

        let two_days = PipelineConfig::new(1, date(2021, 1, 1), date(2022, 1, 2))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"));
        assert!(two_days.validate().is_ok());
    }

    #[test]
    fn test_single_day_range_is_rejected() {
        let config = PipelineConfig::new(1, date(2021, 3, 1), date(2021, 3, 1))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"));
        assert!(matches!(
            config.validate(),
            Err(FolioError::Data(DataError::InsufficientData { .. }))
        ));
    }

    #[test]
    fn test_benchmark_must_not_be_an_instrument() {
        let config = PipelineConfig::new(1, date(2021, 1, 1), date(2021, 2, 1))
            .with_instrument(InstrumentSpec::new("SPX", 1.0, "US"))
            .with_benchmark(BenchmarkSpec {
                id: InstrumentId::from("SPX"),
                params: GbmParams::benchmark(),
            });
        assert!(matches!(
            config.validate(),
            Err(FolioError::Config(ConfigError::Invalid(_)))
        ));
    }
}
