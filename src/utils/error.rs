use crate::domain::model::PortCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerouteError {
    #[error("Port {code} is not present in the port graph")]
    PortNotFound { code: PortCode },

    #[error("Port {code} has no known coordinates")]
    MissingCoordinates { code: PortCode },

    #[error("No routes available: no usable trade-flow records were loaded")]
    NoRoutesAvailable,

    #[error("Upstream fetch of {url} failed after {attempts} attempt(s): {message}")]
    UpstreamFetch {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Archive {path} is not ready for extraction: {reason}")]
    IncompleteArchive { path: String, reason: String },

    #[error("Malformed record in {file} at line {line}: {reason}")]
    MalformedRecord {
        file: String,
        line: u64,
        reason: String,
    },

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

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Data,
    Network,
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

impl RerouteError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RerouteError::PortNotFound { .. } => ErrorCategory::Input,
            RerouteError::MissingCoordinates { .. }
            | RerouteError::NoRoutesAvailable
            | RerouteError::MalformedRecord { .. }
            | RerouteError::IncompleteArchive { .. }
            | RerouteError::CsvError(_)
            | RerouteError::ZipError(_)
            | RerouteError::SerializationError(_) => ErrorCategory::Data,
            RerouteError::UpstreamFetch { .. } | RerouteError::HttpError(_) => {
                ErrorCategory::Network
            }
            RerouteError::ConfigValidationError { .. }
            | RerouteError::InvalidConfigValueError { .. }
            | RerouteError::MissingConfigError { .. } => ErrorCategory::Configuration,
            RerouteError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RerouteError::MissingCoordinates { .. } | RerouteError::MalformedRecord { .. } => {
                ErrorSeverity::Low
            }
            RerouteError::UpstreamFetch { .. }
            | RerouteError::HttpError(_)
            | RerouteError::IncompleteArchive { .. } => ErrorSeverity::Medium,
            RerouteError::PortNotFound { .. }
            | RerouteError::NoRoutesAvailable
            | RerouteError::CsvError(_)
            | RerouteError::ZipError(_)
            | RerouteError::SerializationError(_) => ErrorSeverity::High,
            RerouteError::IoError(_)
            | RerouteError::ConfigValidationError { .. }
            | RerouteError::InvalidConfigValueError { .. }
            | RerouteError::MissingConfigError { .. } => ErrorSeverity::Critical,
        }
    }

    /// Process exit code for the CLI binaries.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RerouteError::PortNotFound { .. } => {
                "Check the port code against the trade-flow files; the port may have no recorded shipments"
            }
            RerouteError::MissingCoordinates { .. } => {
                "Add latitude/longitude to the port directory or run with --geocode"
            }
            RerouteError::NoRoutesAvailable => {
                "Download trade-flow sources (--download) or point --data-dir at a directory with declaration files"
            }
            RerouteError::UpstreamFetch { .. } | RerouteError::HttpError(_) => {
                "Check network connectivity and the source URL, then retry"
            }
            RerouteError::IncompleteArchive { .. } => {
                "Delete the partial archive files and download them again"
            }
            RerouteError::MalformedRecord { .. } | RerouteError::CsvError(_) => {
                "Verify the trade-flow layout (delimiter and column selection) in the configuration"
            }
            RerouteError::ZipError(_) => "The archive may be corrupt; download it again",
            RerouteError::SerializationError(_) => "Check the JSON payload returned by the service",
            RerouteError::IoError(_) => "Check file permissions and available disk space",
            RerouteError::ConfigValidationError { .. }
            | RerouteError::InvalidConfigValueError { .. }
            | RerouteError::MissingConfigError { .. } => {
                "Fix the configuration file or command-line arguments"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            RerouteError::PortNotFound { code } => {
                format!("Port {} does not appear in the historical trade flows", code)
            }
            RerouteError::NoRoutesAvailable => {
                "No routes available: no trade-flow records could be loaded".to_string()
            }
            RerouteError::UpstreamFetch { url, .. } => format!("Could not download {}", url),
            RerouteError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            RerouteError::MissingConfigError { field } => {
                format!("Missing setting '{}'", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RerouteError>;
