use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run failed with status: {0}")]
    RunFailed(String),
}

impl ApifyError {
    /// The token was rejected or lacks access to the actor.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApifyError::Api { status: 401 | 403, .. })
    }

    /// Worth retrying or skipping: the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            ApifyError::Network(_) | ApifyError::Timeout(_) => true,
            ApifyError::Api { status, .. } => *status == 429 || *status >= 500,
            ApifyError::RunFailed(status) => status == "TIMED-OUT",
            ApifyError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApifyError::Timeout(err.to_string())
        } else {
            ApifyError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_and_forbidden_are_auth_errors() {
        for status in [401, 403] {
            let err = ApifyError::Api {
                status,
                message: String::new(),
            };
            assert!(err.is_auth());
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let throttled = ApifyError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let unavailable = ApifyError::Api {
            status: 503,
            message: String::new(),
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(!ApifyError::Api { status: 404, message: String::new() }.is_transient());
    }

    #[test]
    fn timed_out_run_is_transient_but_failed_run_is_not() {
        assert!(ApifyError::RunFailed("TIMED-OUT".to_string()).is_transient());
        assert!(!ApifyError::RunFailed("FAILED".to_string()).is_transient());
    }
}
