use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeycastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, KeycastError>;
