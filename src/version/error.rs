use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version format: {input:?}")]
    InvalidVersionFormat { input: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Invalid client version: {0}")]
    InvalidClientVersion(#[source] VersionError),

    #[error("Version record {record_id} is malformed: {source}")]
    InvalidRecordVersion {
        record_id: i64,
        #[source]
        source: VersionError,
    },
}

/// Validation failures for administrator-supplied record drafts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("Unknown platform: {0:?}")]
    UnknownPlatform(String),

    #[error("Unknown update type: {0:?}")]
    UnknownUpdateType(String),

    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error("Invalid build number: {0:?}")]
    InvalidBuildNumber(String),

    #[error("Priority must be between 0 and 100, got {0}")]
    PriorityOutOfRange(i64),

    #[error("Force update threshold precedes the release date")]
    ThresholdBeforeRelease,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Version record not found: {0}")]
    NotFound(i64),

    #[error("Stored version record {id} is corrupt: {detail}")]
    CorruptRow { id: i64, detail: String },

    #[error("Invalid version record: {0}")]
    Invalid(#[from] IngestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Gate(#[from] GateError),
}
