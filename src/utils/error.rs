use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration '{field}'")]
    MissingConfigError { field: String },

    #[error("Invalid pattern '{pattern}': {source}")]
    PatternError {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Malformed document {document}: {reason}")]
    MalformedDocument { document: String, reason: String },

    #[error("Failed to fetch {document}: {message}")]
    FetchError { document: String, message: String },

    #[error("Resolution input violates contract: {message}")]
    ContractViolation { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Document,
    Data,
    Storage,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MappingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::PatternError { .. } => ErrorCategory::Configuration,
            Self::HttpError(_) | Self::FetchError { .. } => ErrorCategory::Network,
            Self::MalformedDocument { .. } => ErrorCategory::Document,
            Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ContractViolation { .. } => ErrorCategory::Data,
            Self::ZipError(_) | Self::IoError(_) => ErrorCategory::Storage,
            Self::TaskError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Per-document problems never abort a batch.
            Self::MalformedDocument { .. } => ErrorSeverity::Low,
            Self::HttpError(_) | Self::FetchError { .. } => ErrorSeverity::Medium,
            Self::ContractViolation { .. } | Self::TaskError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the configuration file and command line flags"
            }
            ErrorCategory::Network => {
                "Check connectivity and the EDGAR user agent, then re-run; cached filings are reused"
            }
            ErrorCategory::Document => "The document was skipped; no action is required",
            ErrorCategory::Data => {
                "Inspect the extracted raw pairs; an upstream stage produced an invalid record"
            }
            ErrorCategory::Storage => "Check that the output path exists and is writable",
            ErrorCategory::Internal => "Re-run with --verbose and report the log output",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ContractViolation { message } => {
                format!("Resolution halted, the mapping would be corrupted: {}", message)
            }
            Self::MissingConfigError { field } => {
                format!("The setting '{}' is required", field)
            }
            other => other.to_string(),
        }
    }

    pub(crate) fn pattern(pattern: &str, source: regex::Error) -> Self {
        Self::PatternError {
            pattern: pattern.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_errors_are_low_severity() {
        let err = MappingError::MalformedDocument {
            document: "a.txt".to_string(),
            reason: "empty".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.category(), ErrorCategory::Document);
    }

    #[test]
    fn test_contract_violation_is_critical() {
        let err = MappingError::ContractViolation {
            message: "raw pair without CIK".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("raw pair without CIK"));
    }
}
