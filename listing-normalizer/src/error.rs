use thiserror::Error;

/// A payload that cannot be read as a flat listing record.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("field {field} holds a nested value")]
    NestedValue { field: String },
}

/// A vocabulary pattern that failed to compile. These are logged and skipped, never fatal.
#[derive(Error, Debug)]
#[error("invalid pattern {pattern:?} for {owner}: {error}")]
pub struct PatternError {
    pub owner: String,
    pub pattern: String,
    #[source]
    pub error: regex::Error,
}

/// Failure to load the vocabulary document itself.
#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("failed to read vocabulary file {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to parse vocabulary document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to compute an identity key. A record that reaches hashing without a URL has
/// bypassed pre-validation, so callers drop it from every sink.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HashingError {
    #[error("record has no {0} field")]
    MissingField(&'static str),
    #[error("{0:?} is not a 32 character hex identity key")]
    InvalidKey(String),
}
