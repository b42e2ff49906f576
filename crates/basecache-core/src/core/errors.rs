/// Errors surfaced by the image cache engine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("[BC101] invalid value for {key}: {value:?} ({reason})")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },
    #[error("[BC102] failed to parse config file {path}: {error}")]
    ConfigParse { path: String, error: String },
    #[error("[BC103] instance snapshot {path} is malformed: {error}")]
    MalformedSnapshot { path: String, error: String },
    #[error("[BC201] base file {path} failed verification (expected {expected}, found {actual})")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("[BC301] lock {name} unavailable: {error}")]
    LockUnavailable { name: String, error: String },
    #[error("[BC401] base directory {path} could not be listed: {error}")]
    BaseDirUnreadable { path: String, error: String },
}

impl CacheError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSetting { .. } => "BC101",
            Self::ConfigParse { .. } => "BC102",
            Self::MalformedSnapshot { .. } => "BC103",
            Self::DigestMismatch { .. } => "BC201",
            Self::LockUnavailable { .. } => "BC301",
            Self::BaseDirUnreadable { .. } => "BC401",
        }
    }

    /// Errors the operator can fix by changing input or configuration.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSetting { .. } | Self::ConfigParse { .. } | Self::MalformedSnapshot { .. }
        )
    }
}
