//! Codebook — field-level metadata for every column of every entity table.
//!
//! RULES:
//!   - The codebook is loaded once per run and never mutated afterwards.
//!   - Every field the aggregation engine or the summary assembler touches
//!     must have an entry. Lookups for unknown fields fail — they never
//!     fall back to a default entry.
//!   - Insertion order is preserved; downstream ordering uses the explicit
//!     `order` attribute, falling back to insertion position.

use crate::{
    error::{EngineError, EngineResult},
    record::Entity,
    types::FieldName,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Field semantics ──────────────────────────────────────────────────────────

/// Semantic class of a field. Closed set — an unhandled kind is a compile
/// error, not a silent pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Additive event counts (victims, parties, killed, injured).
    Count,
    /// Continuous measurements.
    Continuous,
    /// Ordered categorical codes (collision severity).
    Ordinal,
    /// Unordered categorical codes (collision type, weather).
    Nominal,
    /// 0/1 indicator flags (hit-and-run, alcohol involved).
    Binary,
    /// The record timestamp used for bucketing.
    Timestamp,
}

/// Which per-bucket statistics a field participates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsFlags {
    #[serde(default)]
    pub sum: bool,
    #[serde(default)]
    pub mean: bool,
    #[serde(default)]
    pub median: bool,
}

impl StatsFlags {
    pub fn any(&self) -> bool {
        self.sum || self.mean || self.median
    }
}

/// Per-entity time-series inclusion flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFlags {
    #[serde(default)]
    pub crashes: bool,
    #[serde(default)]
    pub parties: bool,
    #[serde(default)]
    pub victims: bool,
    #[serde(default)]
    pub collisions: bool,
}

impl EntityFlags {
    pub fn includes(&self, entity: Entity) -> bool {
        match entity {
            Entity::Crashes => self.crashes,
            Entity::Parties => self.parties,
            Entity::Victims => self.victims,
            Entity::Collisions => self.collisions,
        }
    }
}

/// One codebook entry — everything the engine knows about a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodebookEntry {
    /// Filled from the map key when parsed from the on-disk JSON; the
    /// key is authoritative and wins over any inner value.
    #[serde(default)]
    pub name: FieldName,
    /// Human-readable display label.
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub kind: FieldKind,
    /// Explicit display sequence for summary tables.
    #[serde(default)]
    pub order: Option<u32>,
    /// Which entity tables this field is aggregated for.
    #[serde(default)]
    pub time_series: EntityFlags,
    /// Which aggregation statistics apply.
    #[serde(default)]
    pub stats: StatsFlags,
    /// Whether the field appears in assembled summary tables.
    #[serde(default = "default_true")]
    pub summary: bool,
    /// Ordered category labels for ordinal fields (index = code).
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl CodebookEntry {
    /// Label for an ordinal/nominal code, when the entry carries categories.
    pub fn category_label(&self, code: usize) -> Option<&str> {
        self.categories
            .as_ref()
            .and_then(|c| c.get(code))
            .map(String::as_str)
    }
}

// ── Codebook ─────────────────────────────────────────────────────────────────

/// The full field dictionary. Read-only after load; safe to share across
/// concurrent readers without locking.
#[derive(Debug, Clone, Default)]
pub struct Codebook {
    names: Vec<FieldName>,
    entries: HashMap<FieldName, CodebookEntry>,
}

impl Codebook {
    /// Build a codebook from entries, preserving the given order.
    pub fn from_entries(entries: Vec<CodebookEntry>) -> Self {
        let mut cb = Self::default();
        for entry in entries {
            cb.insert(entry);
        }
        cb
    }

    /// Parse the on-disk codebook JSON: a map keyed by field name.
    /// Key order in the file is the codebook's insertion order.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut cb = Self::default();
        for (name, value) in raw {
            let mut entry: CodebookEntry = serde_json::from_value(value)?;
            entry.name = name;
            cb.insert(entry);
        }
        log::debug!("codebook loaded: {} fields", cb.len());
        Ok(cb)
    }

    fn insert(&mut self, entry: CodebookEntry) {
        if !self.entries.contains_key(&entry.name) {
            self.names.push(entry.name.clone());
        }
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Resolve a field name to its entry. Fails for unknown fields —
    /// callers must never receive a defaulted entry.
    pub fn classify(&self, name: &str) -> EngineResult<&CodebookEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| EngineError::UnknownField {
                name: name.to_string(),
            })
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CodebookEntry> {
        self.names.iter().map(|n| &self.entries[n])
    }

    /// Fields aggregated for the given entity, in insertion order.
    pub fn time_series_fields(&self, entity: Entity) -> Vec<&CodebookEntry> {
        self.iter()
            .filter(|e| e.time_series.includes(entity) && e.stats.any())
            .collect()
    }

    /// Display position for summary ordering. Explicitly ordered fields
    /// sort ahead of unordered ones, which keep insertion order; the
    /// leading discriminant keeps the two ranges from ever colliding.
    pub fn display_rank(&self, name: &str) -> EngineResult<(u8, u64)> {
        let entry = self.classify(name)?;
        if let Some(order) = entry.order {
            return Ok((0, u64::from(order)));
        }
        let pos = self
            .names
            .iter()
            .position(|n| n == name)
            .unwrap_or(self.names.len());
        Ok((1, pos as u64))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
