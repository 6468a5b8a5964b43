use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The completion service answered, but not with something usable.
    #[error("Completion service returned {status}: {message}")]
    Completion { status: u16, message: String },

    #[error("No API key configured (set MINDHUB_API_KEY or completion.api_key)")]
    MissingApiKey,

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
