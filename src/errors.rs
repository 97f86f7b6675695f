//! Error types for dataset acquisition, alignment and reporting

use thiserror::Error;

/// Result type alias for consistent error handling throughout the crate
pub type Result<T> = std::result::Result<T, PairDatasetError>;

/// Main error type for the pair dataset pipeline
#[derive(Debug, Error)]
pub enum PairDatasetError {
    /// Error returned by the exchange API
    #[error("Hyperliquid API error: {0}")]
    HyperliquidApi(String),

    /// Error during data conversion between formats
    #[error("Data conversion error: {0}")]
    DataConversion(String),

    /// Unsupported candle resolution
    #[error("Unsupported resolution: {0}")]
    UnsupportedResolution(String),

    /// Network or HTTP related errors
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// The exchange refused the request (401/403), retrying cannot help
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A transient fault persisted past the configured retry budget
    #[error("{operation} gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<PairDatasetError>,
    },

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    /// CSV processing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet encoding/decoding errors
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow array/schema errors
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Date/time parsing errors
    #[error("DateTime parsing error: {0}")]
    DateTimeParsing(#[from] chrono::ParseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Data integrity errors: the dataset must not be published
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}

impl PairDatasetError {
    /// Get user-friendly error message with suggestions for resolution
    pub fn user_message(&self) -> String {
        match self {
            Self::HyperliquidApi(msg) => {
                format!(
                    "Hyperliquid API Error: {}\n\n\
                    💡 Suggestions:\n\
                    • Check your internet connection\n\
                    • Verify the coin symbols in the instrument mapping (e.g. 'ETH', 'SOL')\n\
                    • Try again in a few moments if rate limited",
                    msg
                )
            }
            Self::UnsupportedResolution(resolution) => {
                format!(
                    "Unsupported resolution: '{}'\n\n\
                    💡 Supported resolutions: 1m, 5m, 15m, 1h, 4h, 1d\n\
                    The aligned dataset is built from '1d' candles.",
                    resolution
                )
            }
            Self::RetryExhausted {
                operation,
                attempts,
                last_error,
            } => {
                format!(
                    "{} failed {} times in a row: {}\n\n\
                    💡 Suggestions:\n\
                    • Check that the instrument is still listed\n\
                    • Raise fetch.retry.max_attempts or the backoff ceiling",
                    operation, attempts, last_error
                )
            }
            Self::DataIntegrity(msg) => {
                format!(
                    "Data integrity error: {}\n\n\
                    💡 The dataset was NOT written. This indicates corrupt upstream data:\n\
                    • Non-positive close prices cannot be log-transformed\n\
                    • Duplicate timestamps would double count rows",
                    msg
                )
            }
            Self::Configuration(msg) => {
                format!(
                    "Configuration error: {}\n\n\
                    💡 Please verify:\n\
                    • At least two instruments with distinct prefixes are configured\n\
                    • The start timestamp is in the past\n\
                    • The output path is writable",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Whether the fault is transient and the same request may simply be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimit(_) | Self::HyperliquidApi(_)
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Self::HyperliquidApi(_) => "api",
            Self::DataConversion(_) => "data",
            Self::UnsupportedResolution(_) => "validation",
            Self::Network(_) => "network",
            Self::RateLimit(_) => "rate_limit",
            Self::Authentication(_) => "auth",
            Self::RetryExhausted { .. } => "retry",
            Self::JsonParsing(_) => "parsing",
            Self::Csv(_) => "csv",
            Self::Parquet(_) => "storage",
            Self::Arrow(_) => "storage",
            Self::Io(_) => "io",
            Self::DateTimeParsing(_) => "parsing",
            Self::Configuration(_) => "config",
            Self::Validation(_) => "validation",
            Self::DataIntegrity(_) => "data",
        }
    }

    /// Create a new HyperliquidApi error
    pub fn hyperliquid_api<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::HyperliquidApi(msg.into())
    }

    /// Create a new DataConversion error
    pub fn data_conversion<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::DataConversion(msg.into())
    }

    /// Create a new UnsupportedResolution error
    pub fn unsupported_resolution<S: Into<String>>(resolution: S) -> Self {
        PairDatasetError::UnsupportedResolution(resolution.into())
    }

    /// Create a new Validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::Validation(msg.into())
    }

    /// Create a new Configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::Configuration(msg.into())
    }

    /// Create a new DataIntegrity error
    pub fn data_integrity<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::DataIntegrity(msg.into())
    }

    /// Create a new Network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::Network(msg.into())
    }

    /// Create a new RateLimit error
    pub fn rate_limit<S: Into<String>>(msg: S) -> Self {
        PairDatasetError::RateLimit(msg.into())
    }

    /// Classify a 4xx response of the exchange by status code
    pub fn client_request<S: Into<String>>(status_code: u16, error_message: S, detail: S) -> Self {
        match status_code {
            429 => PairDatasetError::RateLimit(error_message.into()),
            401 | 403 => PairDatasetError::Authentication(format!(
                "status {}: {}",
                status_code,
                error_message.into()
            )),
            _ => PairDatasetError::HyperliquidApi(detail.into()),
        }
    }
}

// Conversion for hyperliquid_rust_sdk errors
impl From<hyperliquid_rust_sdk::Error> for PairDatasetError {
    fn from(err: hyperliquid_rust_sdk::Error) -> Self {
        match err {
            hyperliquid_rust_sdk::Error::ClientRequest {
                status_code,
                error_code,
                error_message,
                error_data,
            } => {
                let detail = format!(
                    "Client error: status {}, code {:?}, message: {}, data: {:?}",
                    status_code, error_code, error_message, error_data
                );
                PairDatasetError::client_request(status_code, error_message, detail)
            }
            hyperliquid_rust_sdk::Error::ServerRequest {
                status_code,
                error_message,
            } => PairDatasetError::HyperliquidApi(format!(
                "Server error: status {}, message: {}",
                status_code, error_message
            )),
            hyperliquid_rust_sdk::Error::GenericRequest(msg) => PairDatasetError::Network(msg),
            hyperliquid_rust_sdk::Error::JsonParse(msg) => PairDatasetError::DataConversion(
                format!("Malformed JSON payload: {:?}", msg),
            ),
            hyperliquid_rust_sdk::Error::Websocket(msg) => {
                PairDatasetError::Network(format!("WebSocket error: {}", msg))
            }
            _ => PairDatasetError::HyperliquidApi(format!("Hyperliquid SDK error: {:?}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_faults_are_classified() {
        assert!(PairDatasetError::network("reset by peer").is_transient());
        assert!(PairDatasetError::rate_limit("429").is_transient());
        assert!(PairDatasetError::hyperliquid_api("502").is_transient());
        assert!(!PairDatasetError::data_integrity("close <= 0").is_transient());
        assert!(!PairDatasetError::configuration("no instruments").is_transient());
    }

    #[test]
    fn retry_exhausted_reports_inner_error() {
        let err = PairDatasetError::RetryExhausted {
            operation: "candles ETH".to_string(),
            attempts: 3,
            last_error: Box::new(PairDatasetError::network("timeout")),
        };
        assert_eq!(err.category(), "retry");
        assert!(err.to_string().contains("timeout"));
        assert!(err.user_message().contains("3 times"));
    }

    #[test]
    fn client_status_codes_are_classified() {
        let limited = PairDatasetError::client_request(429, "slow down", "429 detail");
        assert!(matches!(limited, PairDatasetError::RateLimit(_)));
        assert!(limited.is_transient());

        for status in [401, 403] {
            let refused = PairDatasetError::client_request(status, "forbidden", "detail");
            assert!(matches!(refused, PairDatasetError::Authentication(_)));
            assert!(!refused.is_transient());
            assert_eq!(refused.category(), "auth");
        }

        let other = PairDatasetError::client_request(400, "bad coin", "400 detail");
        assert!(matches!(other, PairDatasetError::HyperliquidApi(ref m) if m == "400 detail"));
    }
}
