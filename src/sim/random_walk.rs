use chrono::NaiveDate;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    data::{
        domain::InstrumentId,
        prices::{PriceObservation, PriceTable},
    },
    error::{FolioResult, InputError},
};

/// Parameters of a discrete geometric random walk.
///
/// `price(t) = price(t-1) * (1 + eps)`, `eps ~ Normal(drift, volatility)`,
/// `price(start) = base_price`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    pub base_price: f64,
    pub drift: f64,
    pub volatility: f64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            base_price: 100.0,
            drift: 0.0005,
            volatility: 0.01,
        }
    }
}

impl GbmParams {
    /// Index-like defaults: higher base level, lower drift and volatility.
    pub fn benchmark() -> Self {
        Self {
            base_price: 3000.0,
            drift: 0.0003,
            volatility: 0.008,
        }
    }

    pub fn with_base_price(self, base_price: f64) -> Self {
        Self { base_price, ..self }
    }

    pub fn with_drift(self, drift: f64) -> Self {
        Self { drift, ..self }
    }

    pub fn with_volatility(self, volatility: f64) -> Self {
        Self { volatility, ..self }
    }

    pub fn validate(&self) -> FolioResult<()> {
        if !self.base_price.is_finite() || self.base_price <= 0.0 {
            return Err(InputError::InvalidDistribution(format!(
                "base price must be positive, got {}",
                self.base_price
            ))
            .into());
        }
        if !self.drift.is_finite() || !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(InputError::InvalidDistribution(format!(
                "drift {} / volatility {} must be finite with volatility >= 0",
                self.drift, self.volatility
            ))
            .into());
        }
        Ok(())
    }
}

/// Deterministic price generator; the same seed always yields the same series.
#[derive(Debug, Clone)]
pub struct PriceSimulator {
    rng: StdRng,
}

impl PriceSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Simulates one instrument, drawing from this simulator's generator.
    pub fn simulate(
        &mut self,
        instrument_id: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
        params: GbmParams,
    ) -> FolioResult<Vec<PriceObservation>> {
        simulate_series(&mut self.rng, instrument_id, start, end, params)
    }

    /// Simulates several instruments in the given order into one validated table.
    pub fn simulate_table<'a>(
        &mut self,
        specs: impl IntoIterator<Item = (&'a InstrumentId, GbmParams)>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FolioResult<PriceTable> {
        let mut observations = Vec::new();
        for (id, params) in specs {
            observations.extend(self.simulate(id, start, end, params)?);
        }
        PriceTable::new(observations)
    }
}

/// One observation per calendar day in `[start, end]`, inclusive.
pub fn simulate_series<R: Rng + ?Sized>(
    rng: &mut R,
    instrument_id: &InstrumentId,
    start: NaiveDate,
    end: NaiveDate,
    params: GbmParams,
) -> FolioResult<Vec<PriceObservation>> {
    if start > end {
        return Err(InputError::InvalidDateRange { start, end }.into());
    }
    params.validate()?;

    let normal = Normal::new(params.drift, params.volatility)
        .map_err(|e| InputError::InvalidDistribution(e.to_string()))?;

    let mut price = params.base_price;
    let observations = start
        .iter_days()
        .take_while(|d| *d <= end)
        .enumerate()
        .map(|(i, date)| {
            if i > 0 {
                price *= 1.0 + normal.sample(&mut *rng);
            }
            PriceObservation {
                instrument_id: instrument_id.clone(),
                date,
                price,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        instrument = %instrument_id,
        days = observations.len(),
        "Simulated price series"
    );
    Ok(observations)
}
