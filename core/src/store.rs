//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The engine stays pure; the runner and tests persist results here.

use crate::{
    aggregate::{AggregatedRow, AggregationOutcome, FieldAggregate},
    bucket::{Granularity, TimeBucket},
    describe::StatSummary,
    error::EngineResult,
    hypothesis::{TestKind, TestResult},
    record::Entity,
    types::FieldName,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

pub struct TsStore {
    conn: Connection,
}

impl TsStore {
    /// Open (or create) the results database at `path`.
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_time_series.sql"))?;
        Ok(())
    }

    // ── Aggregates ───────────────────────────────────────────────────────────

    /// Persist every row of one (entity, granularity) outcome.
    pub fn save_outcome(&self, run_id: &str, outcome: &AggregationOutcome) -> EngineResult<()> {
        for row in &outcome.rows {
            self.conn.execute(
                "INSERT OR REPLACE INTO ts_aggregate
                   (run_id, entity, granularity, bucket_start, records, fields_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id,
                    outcome.entity.name(),
                    outcome.granularity.name(),
                    row.bucket.start.to_string(),
                    row.records as i64,
                    serde_json::to_string(&row.fields)?,
                ],
            )?;
        }
        Ok(())
    }

    pub fn aggregate_row_count(
        &self,
        run_id: &str,
        entity: Entity,
        granularity: Granularity,
    ) -> EngineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM ts_aggregate
             WHERE run_id = ?1 AND entity = ?2 AND granularity = ?3",
            params![run_id, entity.name(), granularity.name()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Reload one series, ordered by ascending bucket start.
    pub fn load_rows(
        &self,
        run_id: &str,
        entity: Entity,
        granularity: Granularity,
    ) -> EngineResult<Vec<AggregatedRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT bucket_start, records, fields_json FROM ts_aggregate
             WHERE run_id = ?1 AND entity = ?2 AND granularity = ?3
             ORDER BY bucket_start ASC",
        )?;
        let raw: Vec<(String, i64, String)> = stmt
            .query_map(params![run_id, entity.name(), granularity.name()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<_, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (start, records, fields_json) in raw {
            let start = start
                .parse::<chrono::NaiveDate>()
                .map_err(|e| anyhow::anyhow!("bad bucket_start '{start}': {e}"))?;
            let fields: BTreeMap<FieldName, FieldAggregate> = serde_json::from_str(&fields_json)?;
            rows.push(AggregatedRow {
                entity,
                bucket: TimeBucket {
                    granularity,
                    start,
                },
                records: records as u64,
                fields,
            });
        }
        Ok(rows)
    }

    // ── Descriptive statistics ───────────────────────────────────────────────

    pub fn save_stat_summaries(
        &self,
        run_id: &str,
        variable: &str,
        summaries: &[(String, StatSummary)],
    ) -> EngineResult<()> {
        for (level, summary) in summaries {
            self.conn.execute(
                "INSERT OR REPLACE INTO stat_summary
                   (run_id, variable, group_level, summary_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, variable, level, serde_json::to_string(summary)?],
            )?;
        }
        Ok(())
    }

    pub fn stat_summary(
        &self,
        run_id: &str,
        variable: &str,
        level: &str,
    ) -> EngineResult<Option<StatSummary>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT summary_json FROM stat_summary
                 WHERE run_id = ?1 AND variable = ?2 AND group_level = ?3",
                params![run_id, variable, level],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // ── Hypothesis tests ─────────────────────────────────────────────────────

    pub fn save_test_result(
        &self,
        run_id: &str,
        variable: &str,
        result: &TestResult,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO test_result
               (run_id, variable, test_kind, observations, statistic, p_value, p_display)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                variable,
                result.kind.name(),
                result.observations as i64,
                result.statistic,
                result.p_value,
                result.p_display,
            ],
        )?;
        Ok(())
    }

    pub fn test_result(
        &self,
        run_id: &str,
        variable: &str,
        kind: TestKind,
    ) -> EngineResult<Option<TestResult>> {
        let row: Option<(i64, f64, f64, String)> = self
            .conn
            .query_row(
                "SELECT observations, statistic, p_value, p_display FROM test_result
                 WHERE run_id = ?1 AND variable = ?2 AND test_kind = ?3",
                params![run_id, variable, kind.name()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        Ok(row.map(|(observations, statistic, p_value, p_display)| TestResult {
            kind,
            observations: observations as u64,
            statistic,
            p_value,
            p_display,
        }))
    }

    pub fn test_result_count(&self, run_id: &str) -> EngineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM test_result WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
