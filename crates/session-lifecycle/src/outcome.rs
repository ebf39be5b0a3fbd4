//! Uniform operation result shape.

/// Result shape returned by every public manager operation.
///
/// Provider rejections are surfaced here as `error`, never as a Rust error:
/// the caller is UI code that renders the message and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Sign-up succeeded but the provider withheld the session pending
    /// email verification.
    pub needs_verification: bool,
}

impl AuthOutcome {
    /// A successful outcome.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            needs_verification: false,
        }
    }

    /// A failed outcome carrying a user-facing message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            needs_verification: false,
        }
    }

    /// Sign-up accepted; the user must verify their email first.
    pub fn verification_required() -> Self {
        Self {
            success: true,
            error: None,
            needs_verification: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_shapes() {
        assert!(AuthOutcome::ok().success);
        assert!(AuthOutcome::ok().error.is_none());

        let failed = AuthOutcome::failure("Invalid login credentials");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Invalid login credentials"));

        let pending = AuthOutcome::verification_required();
        assert!(pending.success);
        assert!(pending.needs_verification);
    }
}
