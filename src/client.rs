use crate::auth::{
    AppRoleAuth, AuthMethod, KubernetesAuth, StaticTokenAuth, TokenManager, TokenManagerConfig,
    UserpassAuth, VaultAuth, VaultSession,
};
use crate::config::{
    AuthBackendConfig, AuthConfig, DEFAULT_APP_ROLE_MOUNT, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_JWT_PATH, DEFAULT_KUBERNETES_MOUNT, DEFAULT_READ_TIMEOUT, DEFAULT_RENEW_GRACE_PERIOD,
    DEFAULT_RETRY_INTERVAL, DEFAULT_USERPASS_MOUNT, MountPaths,
};
use crate::error::VaultError;
use crate::lease::Lease;
use crate::redact::ConfidentialityLevel;
use crate::transport::VaultTransport;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ROLE: &str = "app";

pub struct VaultClientBuilder {
    base_url: Option<String>,
    token: Option<String>,
    kubernetes_role: Option<String>,
    kubernetes_jwt_path: Option<PathBuf>,
    kubernetes_mount: Option<String>,
    app_role_id: Option<String>,
    app_role_secret_id: Option<String>,
    app_role_mount: Option<String>,
    username: Option<String>,
    password: Option<String>,
    userpass_mount: Option<String>,
    namespace: Option<String>,
    application_name: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    tls_skip_verify: bool,
    renew_grace_period: Duration,
    retry_interval: Duration,
    confidentiality: ConfidentialityLevel,
}

impl Default for VaultClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            token: None,
            kubernetes_role: None,
            kubernetes_jwt_path: None,
            kubernetes_mount: None,
            app_role_id: None,
            app_role_secret_id: None,
            app_role_mount: None,
            username: None,
            password: None,
            userpass_mount: None,
            namespace: None,
            application_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            tls_skip_verify: false,
            renew_grace_period: DEFAULT_RENEW_GRACE_PERIOD,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            confidentiality: ConfidentialityLevel::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a fixed client token; no login, no renewal.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn kubernetes(mut self, role: impl Into<String>, jwt_path: impl Into<PathBuf>) -> Self {
        self.kubernetes_role = Some(role.into());
        self.kubernetes_jwt_path = Some(jwt_path.into());
        self
    }

    pub fn kubernetes_mount(mut self, mount: impl Into<String>) -> Self {
        self.kubernetes_mount = Some(mount.into());
        self
    }

    pub fn app_role(mut self, role_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        self.app_role_id = Some(role_id.into());
        self.app_role_secret_id = Some(secret_id.into());
        self
    }

    pub fn app_role_mount(mut self, mount: impl Into<String>) -> Self {
        self.app_role_mount = Some(mount.into());
        self
    }

    pub fn userpass(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn userpass_mount(mut self, mount: impl Into<String>) -> Self {
        self.userpass_mount = Some(mount.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    pub fn renew_grace_period(mut self, grace: Duration) -> Self {
        self.renew_grace_period = grace;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn log_confidentiality_level(mut self, level: ConfidentialityLevel) -> Self {
        self.confidentiality = level;
        self
    }

    fn explicit_backends(&self) -> Result<Vec<AuthBackendConfig>, VaultError> {
        let mut backends = Vec::new();

        if let Some(ref token) = self.token {
            backends.push(AuthBackendConfig::static_token(token.clone()));
        }
        if let Some(ref role) = self.kubernetes_role {
            let jwt_path = self
                .kubernetes_jwt_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JWT_PATH));
            backends.push(AuthBackendConfig::Kubernetes {
                mount_path: mount_or(&self.kubernetes_mount, DEFAULT_KUBERNETES_MOUNT),
                role: role.clone(),
                jwt_path,
            });
        }
        match (&self.app_role_id, &self.app_role_secret_id) {
            (Some(role_id), Some(secret_id)) => backends.push(
                AuthBackendConfig::app_role(role_id.clone(), secret_id.clone())
                    .with_mount_path(mount_or(&self.app_role_mount, DEFAULT_APP_ROLE_MOUNT)),
            ),
            (None, None) => {}
            _ => {
                return Err(VaultError::Config(
                    "approle needs both role-id and secret-id".to_string(),
                ));
            }
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => backends.push(
                AuthBackendConfig::userpass(username.clone(), password.clone())
                    .with_mount_path(mount_or(&self.userpass_mount, DEFAULT_USERPASS_MOUNT)),
            ),
            (None, None) => {}
            _ => {
                return Err(VaultError::Config(
                    "userpass needs both username and password".to_string(),
                ));
            }
        }

        Ok(backends)
    }

    /// Backend from the environment when nothing was configured explicitly:
    /// `VAULT_TOKEN` first, then Kubernetes when running in a pod.
    fn env_backend(&self, env: &impl Fn(&str) -> Option<String>) -> Option<AuthBackendConfig> {
        if let Some(token) = env("VAULT_TOKEN") {
            return Some(AuthBackendConfig::static_token(token));
        }

        env("KUBERNETES_SERVICE_HOST")?;
        let mount = self
            .kubernetes_mount
            .clone()
            .or_else(|| env("VAULT_AUTH_METHOD"))
            .unwrap_or_else(|| DEFAULT_KUBERNETES_MOUNT.to_string());
        let role = env("VAULT_ROLE").unwrap_or_else(|| DEFAULT_ROLE.to_string());
        let jwt_path = env("K8S_JWT_TOKEN_PATH").unwrap_or_else(|| DEFAULT_JWT_PATH.to_string());

        Some(AuthBackendConfig::kubernetes(role, jwt_path).with_mount_path(mount))
    }

    fn resolve_config(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<AuthConfig, VaultError> {
        let base_url = self
            .base_url
            .clone()
            .or_else(|| env("VAULT_ADDR"))
            .ok_or_else(|| VaultError::Config("VAULT_ADDR not set".to_string()))?;

        let mut backends = self.explicit_backends()?;
        let backend = match backends.len() {
            0 => self.env_backend(&env).ok_or_else(|| {
                VaultError::Config("no authentication method configured".to_string())
            })?,
            1 => backends.remove(0),
            _ => {
                let names: Vec<_> = backends.iter().map(AuthBackendConfig::name).collect();
                return Err(VaultError::Config(format!(
                    "ambiguous authentication: {} configured",
                    names.join(", ")
                )));
            }
        };

        let mut config = AuthConfig::new(base_url, backend)
            .with_connect_timeout(self.connect_timeout)
            .with_read_timeout(self.read_timeout)
            .with_tls_skip_verify(self.tls_skip_verify)
            .with_renew_grace_period(self.renew_grace_period)
            .with_retry_interval(self.retry_interval)
            .with_confidentiality(self.confidentiality);
        config.namespace = self.namespace.clone().or_else(|| env("VAULT_NAMESPACE"));
        config.application_name = self.application_name.clone();
        config.mounts = MountPaths {
            kubernetes: mount_or(&self.kubernetes_mount, DEFAULT_KUBERNETES_MOUNT),
            app_role: mount_or(&self.app_role_mount, DEFAULT_APP_ROLE_MOUNT),
            userpass: mount_or(&self.userpass_mount, DEFAULT_USERPASS_MOUNT),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and create an idle client. Must be called
    /// within a Tokio runtime.
    pub fn build(self) -> Result<VaultClient, VaultError> {
        let config = self.resolve_config(|key| std::env::var(key).ok())?;
        VaultClient::new(config)
    }
}

fn mount_or(mount: &Option<String>, default: &str) -> String {
    mount.clone().unwrap_or_else(|| default.to_string())
}

/// Vault client handle: keeps a token fresh and exposes one-shot logins.
pub struct VaultClient {
    config: AuthConfig,
    transport: Arc<VaultTransport>,
    token_manager: TokenManager,
}

impl VaultClient {
    pub fn new(config: AuthConfig) -> Result<Self, VaultError> {
        config.validate()?;

        let transport = Arc::new(VaultTransport::new(&config)?);
        let method = auth_method(&config.backend);
        tracing::debug!(
            url = %transport.base_url(),
            method = method.name(),
            "Creating Vault client"
        );

        let session = VaultSession::new(Arc::clone(&transport), method);
        let token_manager = TokenManager::new(Arc::new(session), TokenManagerConfig::from(&config));

        Ok(Self {
            config,
            transport,
            token_manager,
        })
    }

    pub fn from_env() -> Result<Self, VaultError> {
        VaultClientBuilder::new().build()
    }

    pub fn builder() -> VaultClientBuilder {
        VaultClientBuilder::new()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn current_token(&self) -> Result<SecretString, VaultError> {
        self.token_manager.current_token().await
    }

    pub async fn current_token_within(
        &self,
        deadline: Duration,
    ) -> Result<SecretString, VaultError> {
        self.token_manager.current_token_within(deadline).await
    }

    pub async fn current_lease(&self) -> Result<Arc<Lease>, VaultError> {
        self.token_manager.current_lease().await
    }

    pub async fn invalidate(&self) {
        self.token_manager.invalidate().await;
    }

    pub async fn close(&self) {
        self.token_manager.close().await;
    }

    /// One-shot Kubernetes login that bypasses the token manager.
    pub async fn login_kubernetes(
        &self,
        role: &str,
        jwt_path: impl AsRef<Path>,
    ) -> Result<VaultAuth, VaultError> {
        KubernetesAuth::new(role)
            .with_mount_path(self.mount_for("kubernetes", DEFAULT_KUBERNETES_MOUNT))
            .with_jwt_path(jwt_path.as_ref())
            .login(&self.transport)
            .await
    }

    /// One-shot AppRole login that bypasses the token manager.
    pub async fn login_app_role(
        &self,
        role_id: &str,
        secret_id: &str,
    ) -> Result<VaultAuth, VaultError> {
        AppRoleAuth::new(role_id, SecretString::from(secret_id))
            .with_mount_path(self.mount_for("approle", DEFAULT_APP_ROLE_MOUNT))
            .login(&self.transport)
            .await
    }

    /// One-shot userpass login that bypasses the token manager.
    pub async fn login_userpass(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VaultAuth, VaultError> {
        UserpassAuth::new(username, SecretString::from(password))
            .with_mount_path(self.mount_for("userpass", DEFAULT_USERPASS_MOUNT))
            .login(&self.transport)
            .await
    }

    fn mount_for(&self, name: &str, default: &str) -> String {
        self.config.mount_path(name).unwrap_or(default).to_string()
    }
}

fn auth_method(backend: &AuthBackendConfig) -> Arc<dyn AuthMethod> {
    match backend.clone() {
        AuthBackendConfig::Kubernetes {
            mount_path,
            role,
            jwt_path,
        } => Arc::new(
            KubernetesAuth::new(role)
                .with_mount_path(mount_path)
                .with_jwt_path(jwt_path),
        ),
        AuthBackendConfig::AppRole {
            mount_path,
            role_id,
            secret_id,
        } => Arc::new(AppRoleAuth::new(role_id, secret_id).with_mount_path(mount_path)),
        AuthBackendConfig::Userpass {
            mount_path,
            username,
            password,
        } => Arc::new(UserpassAuth::new(username, password).with_mount_path(mount_path)),
        AuthBackendConfig::StaticToken { token } => Arc::new(StaticTokenAuth::new(token)),
    }
}
