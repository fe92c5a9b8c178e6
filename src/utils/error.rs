use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Workbook decoding error: {0}")]
    WorkbookError(#[from] calamine::Error),

    #[error("Workbook encoding error: {0}")]
    XlsxWriteError(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("The file appears to be empty")]
    EmptyFile,

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Template references unknown columns: {}", placeholders.join(", "))]
    InvalidPlaceholders { placeholders: Vec<String> },

    #[error("Daily send limit exceeded: {requested} requested, {remaining} remaining today")]
    QuotaExceeded { remaining: u32, requested: usize },

    #[error("{provider} provider error: {message}")]
    ProviderError { provider: String, message: String },

    #[error("Persistence error during {operation}: {message}")]
    PersistenceError { operation: String, message: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Validation,
    Quota,
    Provider,
    Persistence,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ParseError { .. }
            | EtlError::EmptyFile
            | EtlError::CsvError(_)
            | EtlError::WorkbookError(_) => ErrorCategory::Input,
            EtlError::ValidationError { .. }
            | EtlError::InvalidPlaceholders { .. }
            | EtlError::InvalidStatusTransition { .. } => ErrorCategory::Validation,
            EtlError::QuotaExceeded { .. } => ErrorCategory::Quota,
            EtlError::ProviderError { .. } | EtlError::ApiError(_) => ErrorCategory::Provider,
            EtlError::PersistenceError { .. } => ErrorCategory::Persistence,
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::ZipError(_)
            | EtlError::XlsxWriteError(_)
            | EtlError::IoError(_)
            | EtlError::SerializationError(_)
            | EtlError::PatternError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 使用者修正輸入後即可重來
            ErrorCategory::Input | ErrorCategory::Validation | ErrorCategory::Configuration => {
                ErrorSeverity::High
            }
            // 稍後重試即可
            ErrorCategory::Quota | ErrorCategory::Provider | ErrorCategory::Persistence => {
                ErrorSeverity::Medium
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::EmptyFile => {
                "Upload a file whose first sheet has a header row and at least one data row"
                    .to_string()
            }
            EtlError::ParseError { .. } | EtlError::CsvError(_) | EtlError::WorkbookError(_) => {
                "Check that the file is a valid spreadsheet (xlsx, xls, ods) or delimited text and re-upload it".to_string()
            }
            EtlError::ValidationError { .. } => "Correct the selection and try again".to_string(),
            EtlError::InvalidPlaceholders { .. } => {
                "Rename the placeholders to match the dataset columns".to_string()
            }
            EtlError::QuotaExceeded { remaining, .. } => format!(
                "Select at most {} recipients or wait until the daily limit resets",
                remaining
            ),
            EtlError::ProviderError { .. } | EtlError::ApiError(_) => {
                "Check the provider API key and endpoint, then retry the failed items".to_string()
            }
            EtlError::PersistenceError { .. } => {
                "Retry the operation; rows already written are kept".to_string()
            }
            EtlError::InvalidStatusTransition { .. } => {
                "Sent pitches are final; create a new pitch instead".to_string()
            }
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => {
                "Review the configuration file and command line arguments".to_string()
            }
            _ => "Check file permissions and available disk space, then retry".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::EmptyFile => "The file appears to be empty".to_string(),
            EtlError::QuotaExceeded {
                remaining,
                requested,
            } => format!(
                "You can only send {} more emails today. Selected: {}",
                remaining, requested
            ),
            EtlError::InvalidPlaceholders { placeholders } => format!(
                "These placeholders do not match any column: {}",
                placeholders.join(", ")
            ),
            EtlError::ProviderError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_names_remaining_allowance() {
        let err = EtlError::QuotaExceeded {
            remaining: 3,
            requested: 5,
        };
        assert_eq!(err.category(), ErrorCategory::Quota);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().contains("3 more emails"));
        assert!(err.recovery_suggestion().contains("at most 3"));
    }

    #[test]
    fn test_input_errors_are_high_severity() {
        assert_eq!(EtlError::EmptyFile.category(), ErrorCategory::Input);
        assert_eq!(EtlError::EmptyFile.severity(), ErrorSeverity::High);
        let err = EtlError::InvalidPlaceholders {
            placeholders: vec!["Address".to_string()],
        };
        assert_eq!(err.to_string(), "Template references unknown columns: Address");
    }
}
