//! Identity provider error types.

use thiserror::Error;

/// Postgres unique-violation code surfaced by the provider's REST layer.
const DUPLICATE_ROW_CODE: &str = "23505";

/// Identity provider error type.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The provider rejected the request (bad credentials, expired code,
    /// invalid OTP, …). Always carries an explicit code and message rather
    /// than a duck-typed error shape.
    #[error("Provider rejected request ({code}): {message}")]
    Provider { code: String, message: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl IdentityError {
    /// Returns true if this error is transient and the operation can be
    /// retried (connection failures, timeouts, 5xx responses).
    pub fn is_transient(&self) -> bool {
        match self {
            IdentityError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            IdentityError::Provider { code, .. } => {
                code.parse::<u16>().map(|s| s >= 500).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Returns true if the provider reported a duplicate-row conflict.
    ///
    /// Tolerated during profile creation: the row may already exist when a
    /// user signs up again after an interrupted flow.
    pub fn is_duplicate_row(&self) -> bool {
        match self {
            IdentityError::Provider { code, .. } => code == DUPLICATE_ROW_CODE || code == "409",
            _ => false,
        }
    }
}

/// Result type alias using IdentityError.
pub type IdentityResult<T> = Result<T, IdentityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = IdentityError::Provider {
            code: "invalid_grant".to_string(),
            message: "Invalid login credentials".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider rejected request (invalid_grant): Invalid login credentials"
        );
    }

    #[test]
    fn test_duplicate_row_detection() {
        let dup = IdentityError::Provider {
            code: "23505".to_string(),
            message: "duplicate key value".to_string(),
        };
        assert!(dup.is_duplicate_row());

        let other = IdentityError::Provider {
            code: "invalid_grant".to_string(),
            message: "nope".to_string(),
        };
        assert!(!other.is_duplicate_row());
    }

    #[test]
    fn test_server_error_is_transient() {
        let err = IdentityError::Provider {
            code: "503".to_string(),
            message: "service unavailable".to_string(),
        };
        assert!(err.is_transient());

        let err = IdentityError::Provider {
            code: "400".to_string(),
            message: "bad request".to_string(),
        };
        assert!(!err.is_transient());
    }
}
