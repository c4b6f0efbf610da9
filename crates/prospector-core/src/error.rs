use thiserror::Error;

/// Application-wide error types for Prospector.
#[derive(Error, Debug)]
pub enum AppError {
    /// A run was requested while another run is active.
    #[error("Another run is already active")]
    Busy,

    /// The content source could not create a render surface.
    #[error("Failed to create render surface: {0}")]
    ResourceCreationFailure(String),

    /// The surface has not rendered its content container yet.
    #[error("Content not ready")]
    NotReady,

    /// The readiness poll ran out of attempts or time.
    #[error("Timed out waiting for content after {attempts} polls ({elapsed_ms} ms)")]
    TimeoutWaitingForReady { attempts: u32, elapsed_ms: u64 },

    /// Field extraction faulted while traversing the snapshot.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Content was ready but carried no identifying field.
    #[error("No matching place found")]
    NotFound,

    /// HTTP request failed (fetching a rendered page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Tabular input or output could not be read or written.
    #[error("CSV error: {0}")]
    CsvError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth another poll.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NotReady | AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Short status text shown next to a failed job.
    pub fn status_label(&self) -> &'static str {
        match self {
            AppError::Busy => "Busy",
            AppError::NotFound => "Not found",
            AppError::TimeoutWaitingForReady { .. } | AppError::Timeout(_) => "Timeout",
            _ => "Error",
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::CsvError(e.to_string())
    }
}
