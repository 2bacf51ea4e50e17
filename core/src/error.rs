use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown field '{name}': no codebook entry")]
    UnknownField { name: String },

    #[error("Malformed timestamp for case '{case_id}': {raw:?}")]
    MalformedTimestamp { case_id: String, raw: String },

    #[error("Test '{test}' not applicable: {reason}")]
    TestNotApplicable { test: String, reason: String },

    #[error("Aggregation of {entity} by {granularity} produced zero buckets")]
    EmptyAggregation {
        entity: String,
        granularity: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
