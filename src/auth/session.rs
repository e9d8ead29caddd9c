use super::{AuthMethod, LoginResponse};
use crate::VaultError;
use crate::lease::Lease;
use crate::transport::{HttpMethod, VaultTransport};
use async_trait::async_trait;
use std::sync::Arc;

const RENEW_SELF_PATH: &str = "/v1/auth/token/renew-self";

/// Where the token manager gets leases from.
#[async_trait]
pub trait LeaseSource: Send + Sync {
    /// Obtain a brand new lease.
    async fn login(&self) -> Result<Lease, VaultError>;

    /// Extend `lease`. A client error (4xx) means the token is gone.
    async fn renew(&self, lease: &Lease) -> Result<Lease, VaultError>;

    /// False for sources that hand out a fixed token.
    fn performs_login(&self) -> bool;
}

/// Lease source backed by a live Vault server.
pub struct VaultSession {
    transport: Arc<VaultTransport>,
    method: Arc<dyn AuthMethod>,
}

impl VaultSession {
    pub fn new(transport: Arc<VaultTransport>, method: Arc<dyn AuthMethod>) -> Self {
        Self { transport, method }
    }
}

#[async_trait]
impl LeaseSource for VaultSession {
    async fn login(&self) -> Result<Lease, VaultError> {
        let lease = self.method.authenticate(&self.transport).await?;
        tracing::debug!(
            method = self.method.name(),
            accessor = %lease.accessor,
            lease_duration = lease.lease_duration.as_secs(),
            renewable = lease.renewable,
            "Logged in to Vault"
        );
        Ok(lease)
    }

    async fn renew(&self, lease: &Lease) -> Result<Lease, VaultError> {
        if !self.method.supports_renewal() {
            return Err(VaultError::Auth(format!(
                "{} tokens cannot be renewed",
                self.method.name()
            )));
        }

        let response: LoginResponse = self
            .transport
            .send(
                HttpMethod::Post,
                RENEW_SELF_PATH,
                Some(&serde_json::json!({})),
                Some(&lease.token),
            )
            .await?;

        response.into_auth()?.into_lease()
    }

    fn performs_login(&self) -> bool {
        self.method.performs_login()
    }
}
