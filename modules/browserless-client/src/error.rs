use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl BrowserlessError {
    /// Errors that describe the page or connection state right now rather
    /// than a broken setup.
    pub fn is_transient(&self) -> bool {
        match self {
            BrowserlessError::Network(_)
            | BrowserlessError::Timeout(_)
            | BrowserlessError::Script(_) => true,
            BrowserlessError::Api { status, .. } => *status == 429 || *status >= 500,
            BrowserlessError::Endpoint(_) | BrowserlessError::Cdp(_) => false,
        }
    }
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        BrowserlessError::Network(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserlessError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserlessError::Cdp(err.to_string())
    }
}
