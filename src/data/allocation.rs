use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    data::domain::{Country, InstrumentId, Weight},
    error::{FolioResult, InputError},
};

/// Static allocation metadata for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub instrument_id: InstrumentId,
    pub weight: Weight,
    pub country: Country,
}

impl Allocation {
    pub fn new(
        instrument_id: impl Into<InstrumentId>,
        weight: f64,
        country: impl Into<Country>,
    ) -> FolioResult<Self> {
        let instrument_id = instrument_id.into();
        let weight = Weight::new(&instrument_id, weight)?;
        Ok(Self {
            instrument_id,
            weight,
            country: country.into(),
        })
    }
}

/// The set of allocations of one portfolio, keyed by instrument.
///
/// Iteration order is the instrument key order, never insertion order.
/// Anything that pairs weights with other per-instrument data must look
/// weights up by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationSet {
    by_instrument: BTreeMap<InstrumentId, Allocation>,
}

impl AllocationSet {
    /// Builds the set, rejecting duplicate instruments and empty input.
    pub fn new(allocations: impl IntoIterator<Item = Allocation>) -> FolioResult<Self> {
        let mut by_instrument = BTreeMap::new();
        for allocation in allocations {
            let id = allocation.instrument_id.clone();
            if by_instrument.insert(id.clone(), allocation).is_some() {
                return Err(InputError::DuplicateInstrument(id.to_string()).into());
            }
        }

        if by_instrument.is_empty() {
            return Err(InputError::EmptyInstrumentSet.into());
        }

        Ok(Self { by_instrument })
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&Allocation> {
        self.by_instrument.get(id)
    }

    pub fn weight_of(&self, id: &InstrumentId) -> Option<Weight> {
        self.by_instrument.get(id).map(|a| a.weight)
    }

    pub fn contains(&self, id: &InstrumentId) -> bool {
        self.by_instrument.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.by_instrument.values()
    }

    pub fn instrument_ids(&self) -> impl Iterator<Item = &InstrumentId> {
        self.by_instrument.keys()
    }

    pub fn len(&self) -> usize {
        self.by_instrument.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_instrument.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.by_instrument.values().map(|a| a.weight.value()).sum()
    }
}
