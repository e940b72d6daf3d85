//! Contract multiplier lookup.
//!
//! Resolution order for a contract key:
//! 1. an explicit multiplier carried by the key's executions (first in
//!    canonical order),
//! 2. an explicit table entry for the key,
//! 3. the option default (100 unless configured), options only.
//!
//! Futures have no default. A key that resolves to nothing (or to a
//! non-positive value) is reported as `MultiplierMissing` and no P&L is
//! computed for it; the engine never falls back to 1.

use std::collections::BTreeMap;

use crate::types::{ContractKey, Execution};

/// Standard equity-option contract multiplier.
pub const STANDARD_OPTION_MULTIPLIER: i64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiplierTable {
    option_default: i64,
    contracts: BTreeMap<ContractKey, i64>,
}

impl Default for MultiplierTable {
    fn default() -> Self {
        Self::new(STANDARD_OPTION_MULTIPLIER)
    }
}

impl MultiplierTable {
    pub fn new(option_default: i64) -> Self {
        Self {
            option_default,
            contracts: BTreeMap::new(),
        }
    }

    /// Builder-style explicit entry.
    pub fn with_contract(mut self, key: ContractKey, multiplier: i64) -> Self {
        self.insert(key, multiplier);
        self
    }

    pub fn insert(&mut self, key: ContractKey, multiplier: i64) {
        self.contracts.insert(key, multiplier);
    }

    pub fn option_default(&self) -> i64 {
        self.option_default
    }

    /// Resolve the multiplier for one contract key from its executions
    /// (already in canonical order). `None` means missing.
    pub fn resolve<'a, I>(&self, key: &ContractKey, executions: I) -> Option<i64>
    where
        I: IntoIterator<Item = &'a Execution>,
    {
        let mut is_option = false;
        for e in executions {
            if let Some(m) = e.multiplier {
                return positive(m);
            }
            is_option |= e.instrument.is_option();
        }
        if let Some(m) = self.contracts.get(key) {
            return positive(*m);
        }
        if is_option {
            return positive(self.option_default);
        }
        None
    }
}

fn positive(m: i64) -> Option<i64> {
    (m > 0).then_some(m)
}
