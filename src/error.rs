use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("DB error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Time parse error: {0}")]
    Time(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A reading handed to a characterisation window falls outside `(start, end]`.
    #[error(
        "reading for {point} at {measurement_time_ms} is outside range boundaries ({window_start_ms}, {window_end_ms}]"
    )]
    OutsideRange {
        point: String,
        measurement_time_ms: i64,
        window_start_ms: i64,
        window_end_ms: i64,
    },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
