use chrono::NaiveDate;
use folio::prelude::*;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// Consecutive daily prices of one instrument starting at `start`.
pub fn price_series(id: &str, start: NaiveDate, prices: &[f64]) -> Vec<PriceObservation> {
    start
        .iter_days()
        .zip(prices)
        .map(|(d, p)| PriceObservation::new(id, d, *p))
        .collect()
}

/// Three instruments in two countries over two full calendar years.
pub fn two_year_config(seed: u64) -> PipelineConfig {
    PipelineConfig::new(seed, date(2021, 1, 1), date(2022, 12, 31))
        .with_instrument(InstrumentSpec::new("AAPL", 0.5, "US"))
        .with_instrument(
            InstrumentSpec::new("MSFT", 0.3, "US")
                .with_params(GbmParams::default().with_volatility(0.015)),
        )
        .with_instrument(
            InstrumentSpec::new("SAP", 0.2, "DE")
                .with_params(GbmParams::default().with_drift(-0.0002)),
        )
}

pub fn run(config: PipelineConfig) -> AnalysisRun {
    Pipeline::new(config).run().expect("analysis run")
}
