use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Invalid Vault configuration: {0}")]
    Config(String),

    #[error("Vault request error: {0}")]
    Network(String),

    #[error("Vault responded with status {status}: {}", .errors.join("; "))]
    Http { status: u16, errors: Vec<String> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid Vault response: {0}")]
    Decode(String),

    #[error("Timed out waiting for a Vault token")]
    Timeout,

    #[error("Token manager is closed")]
    Closed,
}

impl VaultError {
    /// Failures worth retrying with backoff: network trouble, 5xx, timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            VaultError::Network(_) | VaultError::Timeout => true,
            VaultError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, VaultError::Http { status, .. } if (400..500).contains(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VaultError::Network("refused".to_string()).is_transient());
        assert!(VaultError::Timeout.is_transient());
        assert!(
            VaultError::Http {
                status: 503,
                errors: vec![]
            }
            .is_transient()
        );
        assert!(
            !VaultError::Http {
                status: 403,
                errors: vec![]
            }
            .is_transient()
        );
        assert!(!VaultError::Auth("denied".to_string()).is_transient());
        assert!(!VaultError::Decode("bad json".to_string()).is_transient());
        assert!(!VaultError::Closed.is_transient());
    }

    #[test]
    fn test_client_error_only_for_4xx() {
        let forbidden = VaultError::Http {
            status: 403,
            errors: vec!["permission denied".to_string()],
        };
        assert!(forbidden.is_client_error());
        assert!(
            !VaultError::Http {
                status: 500,
                errors: vec![]
            }
            .is_client_error()
        );
        assert!(!VaultError::Auth("x".to_string()).is_client_error());
    }

    #[test]
    fn test_http_error_display_joins_messages() {
        let err = VaultError::Http {
            status: 400,
            errors: vec!["missing role".to_string(), "invalid jwt".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Vault responded with status 400: missing role; invalid jwt"
        );
    }
}
