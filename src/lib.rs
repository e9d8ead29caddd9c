//! vault-auth - HashiCorp Vault authentication client
//!
//! Obtains a Vault token through one backend and keeps it fresh:
//! 1. VAULT_TOKEN → static token, never renewed
//! 2. KUBERNETES_SERVICE_HOST → K8s auth with the pod service account JWT
//! 3. AppRole or userpass when configured explicitly
//!
//! Tokens are renewed in the background ahead of expiry and re-acquired by
//! a fresh login when renewal is refused. Concurrent callers share a single
//! in-flight login.

pub mod auth;
mod client;
mod config;
mod error;
mod lease;
mod redact;
mod transport;

pub use auth::{
    AppRoleAuth, AuthMethod, KubernetesAuth, LoginRequest, LoginResponse, StaticTokenAuth,
    MAX_LEASE_DURATION, TokenManager, TokenManagerConfig, UserpassAuth, VaultAuth,
};
pub use client::{VaultClient, VaultClientBuilder};
pub use config::{
    AuthBackendConfig, AuthConfig, DEFAULT_APP_ROLE_MOUNT, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_JWT_PATH, DEFAULT_KUBERNETES_MOUNT, DEFAULT_READ_TIMEOUT, DEFAULT_RENEW_GRACE_PERIOD,
    DEFAULT_RETRY_INTERVAL, DEFAULT_USERPASS_MOUNT, MountPaths,
};
pub use error::VaultError;
pub use lease::{Lease, LeaseSummary};
pub use redact::{ConfidentialityLevel, Redacted, redact, scrub};
pub use secrecy::{ExposeSecret, SecretString};
pub use transport::{HttpMethod, VaultTransport};
