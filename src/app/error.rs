use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarksError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("{0}")]
    Validation(String),

    #[error("Not signed in")]
    NotSignedIn,
}

impl From<tokio_tungstenite::tungstenite::Error> for MarksError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        MarksError::WebSocket(Box::new(e))
    }
}

impl MarksError {
    /// Whether the backend rejected the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            MarksError::Backend { status, .. } => *status == 401 || *status == 403,
            MarksError::Http(e) => e
                .status()
                .is_some_and(|s| s.as_u16() == 401 || s.as_u16() == 403),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MarksError>;
