use crate::VaultError;
use crate::redact::ConfidentialityLevel;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_KUBERNETES_MOUNT: &str = "kubernetes";
pub const DEFAULT_APP_ROLE_MOUNT: &str = "approle";
pub const DEFAULT_USERPASS_MOUNT: &str = "userpass";
pub const DEFAULT_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_RENEW_GRACE_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Credentials for exactly one authentication method.
#[derive(Debug, Clone)]
pub enum AuthBackendConfig {
    Kubernetes {
        mount_path: String,
        role: String,
        jwt_path: PathBuf,
    },
    AppRole {
        mount_path: String,
        role_id: String,
        secret_id: SecretString,
    },
    Userpass {
        mount_path: String,
        username: String,
        password: SecretString,
    },
    StaticToken {
        token: SecretString,
    },
}

impl AuthBackendConfig {
    pub fn kubernetes(role: impl Into<String>, jwt_path: impl Into<PathBuf>) -> Self {
        Self::Kubernetes {
            mount_path: DEFAULT_KUBERNETES_MOUNT.to_string(),
            role: role.into(),
            jwt_path: jwt_path.into(),
        }
    }

    pub fn app_role(role_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Self::AppRole {
            mount_path: DEFAULT_APP_ROLE_MOUNT.to_string(),
            role_id: role_id.into(),
            secret_id: SecretString::from(secret_id.into()),
        }
    }

    pub fn userpass(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Userpass {
            mount_path: DEFAULT_USERPASS_MOUNT.to_string(),
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn static_token(token: impl Into<String>) -> Self {
        Self::StaticToken {
            token: SecretString::from(token.into()),
        }
    }

    /// Override the mount path. No effect on a static token.
    pub fn with_mount_path(mut self, path: impl Into<String>) -> Self {
        match &mut self {
            Self::Kubernetes { mount_path, .. }
            | Self::AppRole { mount_path, .. }
            | Self::Userpass { mount_path, .. } => *mount_path = path.into(),
            Self::StaticToken { .. } => {}
        }
        self
    }

    pub fn mount_path(&self) -> Option<&str> {
        match self {
            Self::Kubernetes { mount_path, .. }
            | Self::AppRole { mount_path, .. }
            | Self::Userpass { mount_path, .. } => Some(mount_path),
            Self::StaticToken { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kubernetes { .. } => "kubernetes",
            Self::AppRole { .. } => "approle",
            Self::Userpass { .. } => "userpass",
            Self::StaticToken { .. } => "token",
        }
    }

    fn validate(&self) -> Result<(), VaultError> {
        if let Some(mount) = self.mount_path() {
            if mount.trim_matches('/').is_empty() {
                return Err(VaultError::Config(format!(
                    "{} mount path must not be empty",
                    self.name()
                )));
            }
        }

        let missing = match self {
            Self::Kubernetes { role, .. } if role.is_empty() => Some("kubernetes role"),
            Self::AppRole { role_id, .. } if role_id.is_empty() => Some("approle role-id"),
            Self::AppRole { secret_id, .. } if secret_id.expose_secret().is_empty() => {
                Some("approle secret-id")
            }
            Self::Userpass { username, .. } if username.is_empty() => Some("userpass username"),
            Self::Userpass { password, .. } if password.expose_secret().is_empty() => {
                Some("userpass password")
            }
            Self::StaticToken { token } if token.expose_secret().is_empty() => {
                Some("client token")
            }
            _ => None,
        };

        match missing {
            Some(what) => Err(VaultError::Config(format!("{what} must not be empty"))),
            None => Ok(()),
        }
    }
}

/// Mount path of every login backend, including the inactive ones, for the
/// one-shot logins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPaths {
    pub kubernetes: String,
    pub app_role: String,
    pub userpass: String,
}

impl Default for MountPaths {
    fn default() -> Self {
        Self {
            kubernetes: DEFAULT_KUBERNETES_MOUNT.to_string(),
            app_role: DEFAULT_APP_ROLE_MOUNT.to_string(),
            userpass: DEFAULT_USERPASS_MOUNT.to_string(),
        }
    }
}

impl MountPaths {
    /// Look up by backend name (`kubernetes`, `approle`, `userpass`).
    pub fn get(&self, backend: &str) -> Option<&str> {
        match backend {
            "kubernetes" => Some(self.kubernetes.as_str()),
            "approle" => Some(self.app_role.as_str()),
            "userpass" => Some(self.userpass.as_str()),
            _ => None,
        }
    }
}

/// Immutable client configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub tls_skip_verify: bool,
    pub renew_grace_period: Duration,
    pub retry_interval: Duration,
    pub log_confidentiality_level: ConfidentialityLevel,
    pub namespace: Option<String>,
    pub application_name: Option<String>,
    pub mounts: MountPaths,
    pub backend: AuthBackendConfig,
}

impl AuthConfig {
    pub fn new(url: impl Into<String>, backend: AuthBackendConfig) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            tls_skip_verify: false,
            renew_grace_period: DEFAULT_RENEW_GRACE_PERIOD,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            log_confidentiality_level: ConfidentialityLevel::default(),
            namespace: None,
            application_name: None,
            mounts: MountPaths::default(),
            backend,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    #[must_use]
    pub fn with_renew_grace_period(mut self, grace: Duration) -> Self {
        self.renew_grace_period = grace;
        self
    }

    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub fn with_confidentiality(mut self, level: ConfidentialityLevel) -> Self {
        self.log_confidentiality_level = level;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_mounts(mut self, mounts: MountPaths) -> Self {
        self.mounts = mounts;
        self
    }

    /// Mount path for the named backend. The active backend's own mount wins
    /// over `mounts`.
    pub fn mount_path(&self, backend: &str) -> Option<&str> {
        match self.backend.mount_path() {
            Some(mount) if self.backend.name() == backend => Some(mount),
            _ => self.mounts.get(backend),
        }
    }

    /// Check the invariants: absolute URL, positive durations, complete backend.
    pub fn validate(&self) -> Result<(), VaultError> {
        let url = Url::parse(&self.url)
            .map_err(|e| VaultError::Config(format!("invalid url {}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(VaultError::Config(format!(
                "url must be an absolute http(s) url: {}",
                self.url
            )));
        }

        for (name, value) in [
            ("connect timeout", self.connect_timeout),
            ("read timeout", self.read_timeout),
            ("renew grace period", self.renew_grace_period),
            ("retry interval", self.retry_interval),
        ] {
            if value.is_zero() {
                return Err(VaultError::Config(format!("{name} must be positive")));
            }
        }

        for (name, mount) in [
            ("kubernetes", &self.mounts.kubernetes),
            ("approle", &self.mounts.app_role),
            ("userpass", &self.mounts.userpass),
        ] {
            if mount.trim_matches('/').is_empty() {
                return Err(VaultError::Config(format!(
                    "{name} mount path must not be empty"
                )));
            }
        }

        self.backend.validate()
    }
}
