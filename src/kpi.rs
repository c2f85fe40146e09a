// src/kpi.rs

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Running weight totals per disposal route.
///
/// `diversion_rate` is derived; it is only ever written by
/// [`KpiState::recompute_diversion`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiState {
    pub recycle_kg: f64,
    pub compost_kg: f64,
    pub landfill_kg: f64,
    pub diversion_rate: f64,
}

impl KpiState {
    /// Add `weight_kg` to the total named by a route (`recycle`, `compost`,
    /// `landfill`) or an invoice line type (`recycling`, ...).
    ///
    /// Returns `false` and leaves the totals untouched for unknown keys and
    /// for weights that are negative or not finite.
    pub fn apply(&mut self, key: &str, weight_kg: f64) -> bool {
        if !weight_kg.is_finite() || weight_kg < 0.0 {
            debug!(key, weight_kg, "Ignoring unusable weight");
            return false;
        }
        let total = match key {
            "recycle" | "recycling" => &mut self.recycle_kg,
            "compost" => &mut self.compost_kg,
            "landfill" => &mut self.landfill_kg,
            _ => {
                debug!(key, "Ignoring unknown route");
                return false;
            }
        };
        *total += weight_kg;
        self.recompute_diversion();
        true
    }

    pub fn recompute_diversion(&mut self) {
        let diverted = self.recycle_kg + self.compost_kg;
        let total = diverted + self.landfill_kg;
        self.diversion_rate = if total > 0.0 { diverted / total } else { 0.0 };
    }

    pub fn reset(&mut self) {
        *self = KpiState::default();
    }
}

/// Process-wide KPI totals behind a mutex.
///
/// Every mutation goes through the lock, so concurrent submissions cannot
/// lose updates.
#[derive(Debug, Default)]
pub struct KpiAggregator {
    state: Mutex<KpiState>,
}

impl KpiAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, KpiState> {
        // The state is plain numbers; a panic mid-update cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn apply(&self, key: &str, weight_kg: f64) -> bool {
        self.lock().apply(key, weight_kg)
    }

    /// Apply a whole submission under one lock; returns how many entries
    /// were counted.
    pub fn apply_all<'a, I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut state = self.lock();
        entries
            .into_iter()
            .filter(|(key, weight)| state.apply(key, *weight))
            .count()
    }

    pub fn snapshot(&self) -> KpiState {
        *self.lock()
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Replace the totals wholesale (startup rehydration).
    pub fn seed(&self, recycle_kg: f64, compost_kg: f64, landfill_kg: f64) {
        let mut state = self.lock();
        state.reset();
        state.apply("recycle", recycle_kg);
        state.apply("compost", compost_kg);
        state.apply("landfill", landfill_kg);
    }
}
