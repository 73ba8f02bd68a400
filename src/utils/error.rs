use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParcelError {
    #[error("Network error after {attempts} attempt(s): {source}")]
    NetworkError {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Feature service error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    ServiceError {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("No cached data for scope '{scope}'")]
    CacheNotFound { scope: String },
}

pub type Result<T> = std::result::Result<T, ParcelError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Service,
    Storage,
    Configuration,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ParcelError {
    pub fn network(source: reqwest::Error) -> Self {
        Self::NetworkError {
            attempts: 1,
            source,
        }
    }

    pub fn service(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ServiceError {
            status,
            attempts: 1,
            message: message.into(),
        }
    }

    /// 回應內容無法解析 (非 JSON 或結構不符)
    pub fn malformed(err: serde_json::Error) -> Self {
        Self::service(None, format!("malformed response body: {}", err))
    }

    /// 連線逾時、連線失敗、5xx 與 429 視為暫時性錯誤，可重試
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError { .. } => true,
            Self::ServiceError {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::NetworkError { attempts, .. } | Self::ServiceError { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// 重試結束後記錄實際嘗試次數
    pub fn with_attempts(self, total: u32) -> Self {
        match self {
            Self::NetworkError { source, .. } => Self::NetworkError {
                attempts: total,
                source,
            },
            Self::ServiceError {
                status, message, ..
            } => Self::ServiceError {
                status,
                attempts: total,
                message,
            },
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NetworkError { .. } => ErrorCategory::Network,
            Self::ServiceError { .. } => ErrorCategory::Service,
            Self::ZipError(_) | Self::IoError(_) | Self::CacheNotFound { .. } => {
                ErrorCategory::Storage
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::CsvError(_) | Self::SerializationError(_) | Self::ValidationError { .. } => {
                ErrorCategory::Data
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CacheNotFound { .. } => ErrorSeverity::Low,
            Self::NetworkError { .. } => ErrorSeverity::Medium,
            Self::ServiceError { .. } if self.is_transient() => ErrorSeverity::Medium,
            Self::ServiceError { .. }
            | Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ValidationError { .. }
            | Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::High,
            Self::ZipError(_) | Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NetworkError { attempts, .. } => format!(
                "Could not reach the parcel service after {} attempt(s)",
                attempts
            ),
            Self::ServiceError {
                status: Some(status),
                message,
                ..
            } => format!("The parcel service rejected the request (HTTP {}): {}", status, message),
            Self::ServiceError { message, .. } => {
                format!("The parcel service returned an unusable response: {}", message)
            }
            Self::CacheNotFound { scope } => {
                format!("Nothing cached yet for {}", scope)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            Self::MissingConfigError { field } => format!("Setting '{}' is required", field),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check your internet connection and try again; the service may be temporarily down"
            }
            ErrorCategory::Service if self.is_transient() => {
                "The service is overloaded or failing; wait a few minutes and retry"
            }
            ErrorCategory::Service => {
                "Verify the endpoint URL and the municipality name (use --list to see valid names)"
            }
            ErrorCategory::Storage => {
                "Check that the data directory exists and is writable, or fetch the scope first"
            }
            ErrorCategory::Configuration => "Review the command line flags or the TOML config file",
            ErrorCategory::Data => {
                "The stored data looks corrupted; run with --invalidate and fetch again"
            }
        }
    }
}
