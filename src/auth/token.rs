use super::AuthMethod;
use crate::VaultError;
use crate::lease::Lease;
use crate::transport::VaultTransport;
use async_trait::async_trait;
use secrecy::SecretString;

/// Static token authentication
pub struct StaticTokenAuth {
    token: SecretString,
}

impl StaticTokenAuth {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthMethod for StaticTokenAuth {
    async fn authenticate(&self, _transport: &VaultTransport) -> Result<Lease, VaultError> {
        Ok(Lease::static_token(self.token.clone()))
    }

    fn supports_renewal(&self) -> bool {
        false
    }

    fn performs_login(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthBackendConfig, AuthConfig};
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_static_token_auth() {
        // Nothing listens here; the static backend must not connect.
        let config = AuthConfig::new("http://127.0.0.1:1", AuthBackendConfig::static_token("x"));
        let transport = VaultTransport::new(&config).unwrap();

        let auth = StaticTokenAuth::new(SecretString::from("my-token"));
        let lease = auth.authenticate(&transport).await.unwrap();

        assert_eq!(lease.token.expose_secret(), "my-token");
        assert!(lease.unbounded());
        assert!(!lease.renewable);
        assert!(!auth.supports_renewal());
        assert!(!auth.performs_login());
    }
}
