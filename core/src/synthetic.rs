//! Deterministic synthetic collision dataset.
//!
//! RULE: Nothing here may call a platform RNG. All randomness flows
//! through a single Pcg64Mcg stream derived from the caller's seed, so
//! the same (seed, cases) pair always produces byte-identical tables.
//! Used by the demo runner and by tests that need a realistic dataset.

use crate::{
    codebook::{Codebook, CodebookEntry, EntityFlags, FieldKind, StatsFlags},
    record::{Entity, Record, RecordTable, Value, TIMESTAMP_FIELD},
};
use chrono::NaiveDate;
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A seeded, deterministic RNG stream for dataset generation.
pub struct SynthRng {
    inner: Pcg64Mcg,
}

impl SynthRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Severity category labels, indexed by code.
const SEVERITY_LEVELS: [&str; 4] = ["Fatal", "Severe Injury", "Minor Injury", "Complaint of Pain"];

/// Injury-degree category labels for victims, indexed by code.
const INJURY_LEVELS: [&str; 5] = [
    "No Injury",
    "Complaint of Pain",
    "Visible Injury",
    "Severe Injury",
    "Killed",
];

const COLLISION_TYPES: [&str; 5] = ["Rear End", "Broadside", "Sideswipe", "Head-On", "Hit Object"];

fn entry(
    name: &str,
    label: &str,
    kind: FieldKind,
    order: u32,
    time_series: EntityFlags,
    stats: StatsFlags,
) -> CodebookEntry {
    CodebookEntry {
        name: name.into(),
        label: label.into(),
        description: String::new(),
        kind,
        order: Some(order),
        time_series,
        stats,
        summary: true,
        categories: None,
    }
}

/// The codebook describing the synthetic schema. Every column of every
/// generated table has an entry here.
pub fn demo_codebook() -> Codebook {
    let crash = EntityFlags {
        crashes: true,
        collisions: true,
        ..EntityFlags::default()
    };
    let party = EntityFlags {
        parties: true,
        ..EntityFlags::default()
    };
    let victim = EntityFlags {
        victims: true,
        ..EntityFlags::default()
    };
    let sum = StatsFlags {
        sum: true,
        ..StatsFlags::default()
    };
    let sum_mean = StatsFlags {
        sum: true,
        mean: true,
        ..StatsFlags::default()
    };
    let full = StatsFlags {
        sum: true,
        mean: true,
        median: true,
    };
    let mean_median = StatsFlags {
        mean: true,
        median: true,
        ..StatsFlags::default()
    };

    let mut entries = vec![
        CodebookEntry {
            name: TIMESTAMP_FIELD.into(),
            label: "Crash Date and Time".into(),
            description: "Collision date and time of day".into(),
            kind: FieldKind::Timestamp,
            order: None,
            time_series: EntityFlags::default(),
            stats: StatsFlags::default(),
            summary: false,
            categories: None,
        },
        entry("crash_tag", "Crash Indicator", FieldKind::Count, 1, crash, sum),
        entry("party_count", "Party Count", FieldKind::Count, 2, crash, full),
        entry("victim_count", "Victim Count", FieldKind::Count, 3, crash, full),
        entry("killed_count", "Number Killed", FieldKind::Count, 4, crash, sum),
        entry("injured_count", "Number Injured", FieldKind::Count, 5, crash, sum),
    ];

    let mut severity = entry(
        "coll_severity",
        "Collision Severity",
        FieldKind::Ordinal,
        6,
        crash,
        mean_median,
    );
    severity.categories = Some(SEVERITY_LEVELS.iter().map(ToString::to_string).collect());
    entries.push(severity);

    entries.push(entry(
        "hit_and_run",
        "Hit and Run",
        FieldKind::Binary,
        7,
        crash,
        sum_mean,
    ));
    entries.push(entry(
        "alcohol_involved",
        "Alcohol Involved",
        FieldKind::Binary,
        8,
        crash,
        sum_mean,
    ));

    // Nominal label column: carried on records and summary tables, but
    // excluded from numeric aggregation (no stats flags).
    let mut coll_type = entry(
        "type_of_coll",
        "Type of Collision",
        FieldKind::Nominal,
        9,
        EntityFlags::default(),
        StatsFlags::default(),
    );
    coll_type.categories = Some(COLLISION_TYPES.iter().map(ToString::to_string).collect());
    entries.push(coll_type);

    entries.push(entry("party_tag", "Party Indicator", FieldKind::Count, 10, party, sum));
    entries.push(entry(
        "party_age",
        "Party Age",
        FieldKind::Continuous,
        11,
        party,
        mean_median,
    ));
    entries.push(entry(
        "at_fault",
        "Party at Fault",
        FieldKind::Binary,
        12,
        party,
        sum_mean,
    ));
    entries.push(entry(
        "victim_tag",
        "Victim Indicator",
        FieldKind::Count,
        13,
        victim,
        sum,
    ));
    entries.push(entry(
        "victim_age",
        "Victim Age",
        FieldKind::Continuous,
        14,
        victim,
        mean_median,
    ));

    let mut injury = entry(
        "victim_degree_of_injury",
        "Degree of Injury",
        FieldKind::Ordinal,
        15,
        victim,
        mean_median,
    );
    injury.categories = Some(INJURY_LEVELS.iter().map(ToString::to_string).collect());
    entries.push(injury);

    Codebook::from_entries(entries)
}

/// Severity label for a generated code.
pub fn severity_label(code: i64) -> &'static str {
    SEVERITY_LEVELS
        .get(code as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// Generate the four entity tables for `cases` synthetic crashes.
/// Deterministic in (seed, cases).
pub fn synthetic_tables(seed: u64, cases: usize) -> Vec<RecordTable> {
    let mut rng = SynthRng::new(seed);

    let mut crashes = RecordTable::new(
        Entity::Crashes,
        vec![
            TIMESTAMP_FIELD.into(),
            "crash_tag".into(),
            "party_count".into(),
            "victim_count".into(),
            "killed_count".into(),
            "injured_count".into(),
            "coll_severity".into(),
            "hit_and_run".into(),
            "alcohol_involved".into(),
            "type_of_coll".into(),
        ],
    );
    let mut parties = RecordTable::new(
        Entity::Parties,
        vec![
            TIMESTAMP_FIELD.into(),
            "party_tag".into(),
            "party_age".into(),
            "at_fault".into(),
        ],
    );
    let mut victims = RecordTable::new(
        Entity::Victims,
        vec![
            TIMESTAMP_FIELD.into(),
            "victim_tag".into(),
            "victim_age".into(),
            "victim_degree_of_injury".into(),
        ],
    );

    let epoch = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default();

    for case in 0..cases {
        let case_id = format!("case-{case:06}");

        // A small fraction of source records carries an unusable date;
        // keep that so exclusion tallies stay exercised end to end.
        let ts = if rng.chance(0.005) {
            Value::Null
        } else {
            let day = epoch + chrono::Duration::days(rng.below(2191) as i64);
            day.and_hms_opt(rng.below(24) as u32, rng.below(60) as u32, 0)
                .map_or(Value::Null, Value::Timestamp)
        };

        let roll = rng.next_f64();
        let severity: i64 = if roll < 0.02 {
            0
        } else if roll < 0.10 {
            1
        } else if roll < 0.45 {
            2
        } else {
            3
        };

        let party_count = 1 + rng.below(3) as i64;
        let victim_count = match severity {
            0 | 1 => 1 + rng.below(4) as i64,
            2 => rng.below(3) as i64,
            _ => rng.below(2) as i64,
        };
        let killed = if severity == 0 { 1 + rng.below(2) as i64 } else { 0 };
        let injured = (victim_count - killed).max(0);

        let mut crash = Record::new(case_id.clone());
        crash.set(TIMESTAMP_FIELD, ts.clone());
        crash.set("crash_tag", Value::Int(1));
        crash.set("party_count", Value::Int(party_count));
        crash.set("victim_count", Value::Int(victim_count));
        crash.set("killed_count", Value::Int(killed));
        crash.set("injured_count", Value::Int(injured));
        crash.set("coll_severity", Value::Int(severity));
        crash.set("hit_and_run", Value::Int(i64::from(rng.chance(0.10))));
        crash.set("alcohol_involved", Value::Int(i64::from(rng.chance(0.12))));
        crash.set(
            "type_of_coll",
            Value::Text(COLLISION_TYPES[rng.below(5) as usize].to_string()),
        );
        crashes.push(crash);

        for p in 0..party_count {
            let mut party = Record::new(format!("{case_id}-p{p}"));
            party.set(TIMESTAMP_FIELD, ts.clone());
            party.set("party_tag", Value::Int(1));
            party.set("party_age", Value::Real(16.0 + rng.below(70) as f64));
            party.set("at_fault", Value::Int(i64::from(p == 0)));
            parties.push(party);
        }

        for v in 0..victim_count {
            let degree: i64 = match severity {
                0 => {
                    if v < killed {
                        4
                    } else {
                        2 + rng.below(2) as i64
                    }
                }
                1 => 3,
                2 => 2,
                _ => 1,
            };
            let mut victim = Record::new(format!("{case_id}-v{v}"));
            victim.set(TIMESTAMP_FIELD, ts.clone());
            victim.set("victim_tag", Value::Int(1));
            victim.set("victim_age", Value::Real(5.0 + rng.below(85) as f64));
            victim.set("victim_degree_of_injury", Value::Int(degree));
            victims.push(victim);
        }
    }

    // Collisions: the crash-level joined view with party/victim tags.
    let mut collisions = RecordTable::new(
        Entity::Collisions,
        vec![
            TIMESTAMP_FIELD.into(),
            "crash_tag".into(),
            "party_count".into(),
            "victim_count".into(),
            "killed_count".into(),
            "injured_count".into(),
            "coll_severity".into(),
            "party_tag".into(),
            "victim_tag".into(),
        ],
    );
    for crash in &crashes.records {
        let mut joined = Record::new(crash.case_id.clone());
        for field in [
            TIMESTAMP_FIELD,
            "crash_tag",
            "party_count",
            "victim_count",
            "killed_count",
            "injured_count",
            "coll_severity",
        ] {
            if let Some(value) = crash.get(field) {
                joined.set(field, value.clone());
            }
        }
        let has_victims = crash
            .get("victim_count")
            .and_then(Value::as_f64)
            .is_some_and(|v| v > 0.0);
        joined.set("party_tag", Value::Int(1));
        joined.set("victim_tag", Value::Int(i64::from(has_victims)));
        collisions.push(joined);
    }

    vec![crashes, parties, victims, collisions]
}
