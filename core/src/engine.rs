//! The time-series engine — one batch pass over every (entity,
//! granularity) unit.
//!
//! RULES:
//!   - The codebook is loaded once, owned by the engine, and read-only.
//!   - Each (entity, granularity) unit is independent of every other;
//!     results are merged only into the final ordered bundle. A caller
//!     wrapping the engine in a cancellable task should treat one unit
//!     as the smallest cancellable grain.
//!   - No I/O inside the engine; tables arrive loaded and typed.

use crate::{
    aggregate::{aggregate, AggregationOutcome},
    bucket::Granularity,
    codebook::Codebook,
    error::EngineResult,
    record::{Entity, RecordTable},
};
use std::collections::BTreeMap;

/// All aggregation outcomes of one run, keyed by (entity, granularity).
#[derive(Debug, Clone, Default)]
pub struct TsBundle {
    series: BTreeMap<(Entity, Granularity), AggregationOutcome>,
}

impl TsBundle {
    pub fn get(&self, entity: Entity, granularity: Granularity) -> Option<&AggregationOutcome> {
        self.series.get(&(entity, granularity))
    }

    /// Outcomes in deterministic (entity, granularity) order.
    pub fn iter(&self) -> impl Iterator<Item = &AggregationOutcome> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total records dropped for malformed timestamps across all units.
    pub fn total_excluded(&self) -> u64 {
        // Each granularity pass re-counts the same exclusions; report the
        // per-entity maximum rather than a five-fold sum.
        let mut by_entity: BTreeMap<Entity, u64> = BTreeMap::new();
        for outcome in self.series.values() {
            let slot = by_entity.entry(outcome.entity).or_insert(0);
            *slot = (*slot).max(outcome.excluded);
        }
        by_entity.values().sum()
    }
}

/// The engine: a read-only codebook plus the batch aggregation pass.
pub struct TsEngine {
    codebook: Codebook,
}

impl TsEngine {
    pub fn new(codebook: Codebook) -> Self {
        Self { codebook }
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    /// Run all five granularities for every supplied table.
    /// Restartable: same inputs, same bundle.
    pub fn run(&self, tables: &[RecordTable]) -> EngineResult<TsBundle> {
        let mut bundle = TsBundle::default();
        for table in tables {
            for granularity in Granularity::all() {
                let outcome = aggregate(table, &self.codebook, *granularity)?;
                log::info!(
                    "{} by {}: {} buckets ({} records, {} excluded)",
                    table.entity,
                    granularity,
                    outcome.rows.len(),
                    table.len(),
                    outcome.excluded,
                );
                bundle
                    .series
                    .insert((table.entity, *granularity), outcome);
            }
        }
        Ok(bundle)
    }
}
