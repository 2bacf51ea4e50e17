//! Shared primitive types used across the entire engine.

/// The SWITRS-style case identifier carried by every raw record.
pub type CaseId = String;

/// A raw column / codebook field name (case-sensitive).
pub type FieldName = String;
