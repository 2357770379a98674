use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API request failed with status {status} after {retries} retries")]
    ApiAfterRetries { status: u16, retries: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected notification payload: {0}")]
    Payload(String),

    #[error("Unsupported duration value: {0}")]
    UnsupportedDuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Artifacts archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
