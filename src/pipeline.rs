use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{info, instrument};

use crate::{
    calculator::{
        aggregation::{PeriodReturns, instrument_daily, portfolio_daily},
        covariance::{CovarianceMatrix, PortfolioRisk},
        returns::ReturnTable,
        volatility::VolatilityTable,
    },
    config::PipelineConfig,
    data::{
        allocation::AllocationSet,
        domain::{PeriodBucket, SeriesLabel},
        prices::PriceTable,
    },
    error::{DataError, FolioResult, IoError},
    report::{
        comparison::ComparisonTable,
        drawdown::DrawdownTable,
        io::ToCsv,
        performance::PerformanceSeries,
        summary::PerformanceSummary,
        yearly::YearlyPerformance,
    },
    sim::random_walk::PriceSimulator,
};

/// Buckets produced by every run.
pub const ROLL_UP_BUCKETS: [PeriodBucket; 3] =
    [PeriodBucket::Week, PeriodBucket::Month, PeriodBucket::Year];

/// Every table of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub allocations: AllocationSet,
    pub prices: PriceTable,
    pub benchmark_prices: PriceTable,
    pub returns: ReturnTable,
    pub period_returns: PeriodReturns,
    pub volatility: VolatilityTable,
    pub covariance: CovarianceMatrix,
    pub risk: PortfolioRisk,
    pub performance: PerformanceSeries,
    pub drawdowns: DrawdownTable,
    pub comparison: ComparisonTable,
    pub yearly: YearlyPerformance,
    pub summary: PerformanceSummary,
}

impl AnalysisRun {
    /// Writes every table as CSV (plus the risk scalar as JSON) into `dir`.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn export_csv(&self, dir: impl AsRef<Path>) -> FolioResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let prices = self.prices.clone().merge(self.benchmark_prices.clone())?;

        let mut written = vec![
            prices.to_csv(dir)?,
            self.returns.to_csv(dir)?,
            self.period_returns.to_csv(dir)?,
            self.volatility.to_csv(dir)?,
            self.covariance.to_csv(dir)?,
            self.performance.to_csv(dir)?,
            self.drawdowns.to_csv(dir)?,
            self.comparison.to_csv(dir)?,
            self.yearly.to_csv(dir)?,
            self.summary.to_csv(dir)?,
        ];

        let risk_path = dir.join("portfolio_risk.json");
        let json = serde_json::to_string_pretty(&self.risk).map_err(IoError::Json)?;
        fs::write(&risk_path, json).map_err(|e| {
            IoError::WriteFailed(format!("Failed to write '{}': {e}", risk_path.display()))
        })?;
        written.push(risk_path);

        info!(files = written.len(), "Exported analysis run");
        Ok(written)
    }
}

/// Runs builder -> calculator -> aggregator -> analyzer in one pass.
///
/// Each stage consumes the previous stage's table and either returns a
/// complete table or fails the whole run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Simulates all prices from the configured seed, then analyzes them.
    ///
    /// Every calendar year in range needs at least two daily returns for its
    /// yearly statistics, so a range ending on 1 January is rejected up front
    /// with [`DataError::InsufficientData`](crate::error::DataError::InsufficientData).
    #[instrument(skip(self), fields(seed = self.config.seed(), instruments = self.config.instruments().len()))]
    pub fn run(&self) -> FolioResult<AnalysisRun> {
        self.config.validate()?;
        let (start, end) = (self.config.start(), self.config.end());
        info!(%start, %end, convention = %self.config.convention(), "Starting analysis run");

        let mut simulator = PriceSimulator::new(self.config.seed());
        let prices = simulator.simulate_table(
            self.config.instruments().iter().map(|s| (&s.id, s.params)),
            start,
            end,
        )?;
        let benchmark = self.config.benchmark();
        let benchmark_prices =
            simulator.simulate_table([(&benchmark.id, benchmark.params)], start, end)?;

        self.run_with_prices(prices, benchmark_prices)
    }

    /// Analyzes externally supplied prices, e.g. from [`PriceTable::read_csv`].
    ///
    /// Only the configured benchmark instrument of `benchmark_prices` is used.
    #[instrument(skip_all, fields(prices = prices.len(), benchmark = benchmark_prices.len()))]
    pub fn run_with_prices(
        &self,
        prices: PriceTable,
        benchmark_prices: PriceTable,
    ) -> FolioResult<AnalysisRun> {
        let convention = self.config.convention();
        let allocations = self.config.allocations()?;

        // Builder
        let panel = prices.join_allocations(&allocations);
        if panel.is_empty() {
            return Err(DataError::MissingSeries(
                "no priced instrument has an allocation".to_string(),
            )
            .into());
        }

        let benchmark_id = &self.config.benchmark().id;
        let benchmark_prices = PriceTable::new(benchmark_prices.series(benchmark_id).cloned())?;
        if benchmark_prices.is_empty() {
            return Err(DataError::MissingSeries(format!("benchmark '{benchmark_id}'")).into());
        }

        // Calculator
        let returns = ReturnTable::compute(&panel, convention)?;
        let benchmark_returns = ReturnTable::compute(&benchmark_prices.standalone()?, convention)?;

        // Aggregator
        let period_returns = PeriodReturns::compute(&returns, &ROLL_UP_BUCKETS)?;
        let volatility = VolatilityTable::compute(&returns)?;
        let covariance = CovarianceMatrix::compute(&returns)?;
        let risk = PortfolioRisk::compute(&covariance, &allocations)?;

        // Analyzer
        let performance = PerformanceSeries::build(
            &portfolio_daily(&returns, convention),
            &instrument_daily(&benchmark_returns, convention),
            convention,
        )?;
        let drawdowns = DrawdownTable::from_performance(&performance);
        let comparison = ComparisonTable::from_performance(&performance);
        let yearly = YearlyPerformance::from_performance(&performance, self.config.window_start());
        let summary = PerformanceSummary::compute(&performance, &drawdowns)?;

        if let Some(portfolio) = summary.get(SeriesLabel::Portfolio) {
            info!(
                total_return = portfolio.total_return,
                max_drawdown = portfolio.max_drawdown,
                risk = risk.volatility,
                "Finished analysis run"
            );
        }

        Ok(AnalysisRun {
            allocations,
            prices,
            benchmark_prices,
            returns,
            period_returns,
            volatility,
            covariance,
            risk,
            performance,
            drawdowns,
            comparison,
            yearly,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        config::InstrumentSpec,
        data::{domain::InstrumentId, prices::PriceObservation},
        error::FolioError,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig::new(5, date(2021, 1, 1), date(2021, 3, 31))
            .with_instrument(InstrumentSpec::new("AAPL", 0.6, "US"))
            .with_instrument(InstrumentSpec::new("SAP", 0.4, "DE"))
    }

    #[test]
    fn test_run_produces_every_table() {
        let run = Pipeline::new(small_config()).run().expect("run");

        // 90 days per instrument, one boundary row dropped each.
        assert_eq!(run.prices.len(), 180);
        assert_eq!(run.returns.len(), 178);
        assert_eq!(run.performance.len(), 2 * 89);
        assert_eq!(run.drawdowns.len(), run.performance.len());
        assert_eq!(run.comparison.len(), 89);
        assert_eq!(run.covariance.instruments().len(), 2);
        assert!(run.risk.volatility > 0.0);
        assert_eq!(run.summary.rows().len(), 2);
        assert!(!run.period_returns.is_empty());
        assert!(!run.volatility.is_empty());
    }

    #[test]
    fn test_run_is_deterministic() {
        let a = Pipeline::new(small_config()).run().expect("run");
        let b = Pipeline::new(small_config()).run().expect("run");
        assert_eq!(a.performance, b.performance);
        assert_eq!(a.risk, b.risk);
    }

    #[test]
    fn test_invalid_config_fails_before_any_stage() {
        let config = PipelineConfig::new(5, date(2021, 3, 1), date(2021, 1, 1))
            .with_instrument(InstrumentSpec::new("AAPL", 1.0, "US"));
        let result = Pipeline::new(config).run();
        assert!(matches!(
            result,
            Err(FolioError::Input(crate::error::InputError::InvalidDateRange { .. }))
        ));
    }

    #[test]
    fn test_missing_benchmark_series_fails() {
        let pipeline = Pipeline::new(small_config());
        let prices = PriceTable::new([
            PriceObservation::new("AAPL", date(2021, 1, 1), 10.0),
            PriceObservation::new("AAPL", date(2021, 1, 2), 11.0),
        ])
        .expect("prices");
        let other = PriceTable::new([PriceObservation::new("SPX", date(2021, 1, 1), 1.0)])
            .expect("prices");

        let result = pipeline.run_with_prices(prices, other);
        assert!(matches!(
            result,
            Err(FolioError::Data(DataError::MissingSeries(_)))
        ));
    }

    #[test]
    fn test_unallocated_prices_fail() {
        let pipeline = Pipeline::new(small_config());
        let prices = PriceTable::new([PriceObservation::new("TSLA", date(2021, 1, 1), 10.0)])
            .expect("prices");
        let benchmark = PriceTable::new([PriceObservation::new(
            InstrumentId::from("BENCHMARK"),
            date(2021, 1, 1),
            1.0,
        )])
        .expect("prices");

        let result = pipeline.run_with_prices(prices, benchmark);
        assert!(matches!(
            result,
            Err(FolioError::Data(DataError::MissingSeries(_)))
        ));
    }

    #[test]
    fn test_export_writes_all_files() {
        let run = Pipeline::new(small_config()).run().expect("run");
        let dir = std::env::temp_dir().join(format!("folio_pipeline_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let written = run.export_csv(&dir).expect("export");
        assert_eq!(written.len(), 11);
        assert!(written.iter().all(|p| p.exists()));
        assert!(dir.join("performance.csv").exists());
        assert!(dir.join("portfolio_risk.json").exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
