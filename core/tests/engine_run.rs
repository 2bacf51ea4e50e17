//! End-to-end engine runs over the synthetic dataset: coverage of every
//! (entity, granularity) unit, determinism, and cross-granularity
//! consistency.

use octraffic_core::record::Entity;
use octraffic_core::synthetic::{demo_codebook, synthetic_tables};
use octraffic_core::{Granularity, TsEngine, TsStore};

fn run(seed: u64, cases: usize) -> (TsEngine, octraffic_core::TsBundle) {
    let engine = TsEngine::new(demo_codebook());
    let bundle = engine.run(&synthetic_tables(seed, cases)).unwrap();
    (engine, bundle)
}

/// Every entity × granularity unit produces an outcome.
#[test]
fn all_twenty_units_are_produced() {
    let (_, bundle) = run(42, 300);
    assert_eq!(bundle.len(), 20);
    for entity in Entity::all() {
        for granularity in Granularity::all() {
            let outcome = bundle.get(*entity, *granularity);
            assert!(
                outcome.is_some(),
                "missing outcome for {entity} by {granularity}"
            );
            assert!(!outcome.unwrap().rows.is_empty());
        }
    }
}

/// The same seed always reproduces the same bundle.
#[test]
fn engine_runs_are_deterministic() {
    let (_, a) = run(7, 200);
    let (_, b) = run(7, 200);
    for entity in Entity::all() {
        for granularity in Granularity::all() {
            assert_eq!(
                a.get(*entity, *granularity),
                b.get(*entity, *granularity),
                "{entity} by {granularity} diverged between identical runs"
            );
        }
    }
}

/// Bucketed record counts agree across granularities: the day series of
/// an entity accounts for exactly the records the year series does.
#[test]
fn granularities_agree_on_record_totals() {
    let (_, bundle) = run(3, 250);
    for entity in Entity::all() {
        let day: u64 = bundle
            .get(*entity, Granularity::Day)
            .unwrap()
            .rows
            .iter()
            .map(|r| r.records)
            .sum();
        let year: u64 = bundle
            .get(*entity, Granularity::Year)
            .unwrap()
            .rows
            .iter()
            .map(|r| r.records)
            .sum();
        assert_eq!(day, year, "{entity} day/year totals disagree");
    }
}

/// Exclusion tallies are identical at every granularity of one entity;
/// the bundle total counts each entity's exclusions once.
#[test]
fn exclusions_counted_once_per_entity() {
    let (_, bundle) = run(11, 400);
    let mut per_entity_total = 0;
    for entity in Entity::all() {
        let tallies: Vec<u64> = Granularity::all()
            .iter()
            .map(|g| bundle.get(*entity, *g).unwrap().excluded)
            .collect();
        assert!(
            tallies.windows(2).all(|w| w[0] == w[1]),
            "{entity} exclusion tally varies by granularity: {tallies:?}"
        );
        per_entity_total += tallies[0];
    }
    assert_eq!(bundle.total_excluded(), per_entity_total);
}

/// A full run persists and reloads through the store.
#[test]
fn full_run_persists_through_the_store() {
    let (_, bundle) = run(5, 150);
    let store = TsStore::in_memory().unwrap();
    store.migrate().unwrap();

    for outcome in bundle.iter() {
        store.save_outcome("e2e", outcome).unwrap();
    }
    for outcome in bundle.iter() {
        let rows = store
            .load_rows("e2e", outcome.entity, outcome.granularity)
            .unwrap();
        assert_eq!(rows, outcome.rows);
    }
}
