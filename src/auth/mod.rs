mod approle;
mod kubernetes;
mod manager;
mod session;
mod token;
mod userpass;

pub use approle::AppRoleAuth;
pub use kubernetes::KubernetesAuth;
pub use manager::{TokenManager, TokenManagerConfig};
pub use session::{LeaseSource, VaultSession};
pub use token::StaticTokenAuth;
pub use userpass::UserpassAuth;

use crate::VaultError;
use crate::lease::Lease;
use crate::transport::{HttpMethod, VaultTransport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Longest lease honoured; anything beyond is clamped. Vault's own TTL
/// ceiling is far below this.
pub const MAX_LEASE_DURATION: Duration = Duration::from_secs(32 * 365 * 24 * 60 * 60);

/// Trait for authentication methods
#[async_trait]
pub trait AuthMethod: Send + Sync {
    /// Perform a fresh login
    async fn authenticate(&self, transport: &VaultTransport) -> Result<Lease, VaultError>;

    /// Whether the issued token can be extended via renew-self
    fn supports_renewal(&self) -> bool;

    /// Whether `authenticate` talks to Vault at all
    fn performs_login(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Login call for one backend: endpoint path plus JSON body.
pub struct LoginRequest {
    pub path: String,
    pub body: serde_json::Value,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("path", &self.path)
            .field("body", &"[REDACTED]")
            .finish()
    }
}

impl LoginRequest {
    pub(crate) fn new(mount_path: &str, suffix: &str, body: serde_json::Value) -> Self {
        Self {
            path: format!("/v1/auth/{}/{}", mount_path.trim_matches('/'), suffix),
            body,
        }
    }

    /// Send the login and parse the `auth` block. A 4xx from a login endpoint
    /// means the credentials were rejected.
    pub async fn send(&self, transport: &VaultTransport) -> Result<VaultAuth, VaultError> {
        let response: LoginResponse = transport
            .send(HttpMethod::Post, &self.path, Some(&self.body), None)
            .await
            .map_err(|e| match e {
                VaultError::Http { status, errors } if (400..500).contains(&status) => {
                    VaultError::Auth(format!("login rejected ({status}): {}", errors.join("; ")))
                }
                other => other,
            })?;
        response.into_auth()
    }
}

/// Percent-encode a single path segment, so `/`, `?` and `#` stay inside it.
pub(crate) fn encode_path_segment(segment: &str) -> Result<String, VaultError> {
    let mut url = reqwest::Url::parse("http://localhost/")
        .map_err(|e| VaultError::Config(format!("cannot encode path segment: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| VaultError::Config("cannot encode path segment".to_string()))?
        .pop_if_empty()
        .push(segment);
    Ok(url.path().trim_start_matches('/').to_string())
}

/// Envelope of a Vault login or renew-self response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub auth: Option<VaultAuth>,
}

impl LoginResponse {
    pub fn into_auth(self) -> Result<VaultAuth, VaultError> {
        for warning in self.warnings.iter().flatten() {
            tracing::warn!(request_id = %self.request_id, warning = %warning, "Vault returned a warning");
        }
        let auth = self
            .auth
            .ok_or_else(|| VaultError::Auth("response has no auth block".to_string()))?;
        if auth.client_token.as_deref().is_none_or(str::is_empty) {
            return Err(VaultError::Auth(
                "response has no client_token".to_string(),
            ));
        }
        Ok(auth)
    }
}

/// The `auth` block returned by every login endpoint.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub token_policies: Vec<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default)]
    pub orphan: bool,
}

impl fmt::Debug for VaultAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultAuth")
            .field("client_token", &"[REDACTED]")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("token_policies", &self.token_policies)
            .field("metadata", &self.metadata)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("entity_id", &self.entity_id)
            .field("token_type", &self.token_type)
            .field("orphan", &self.orphan)
            .finish()
    }
}

impl VaultAuth {
    /// Build a lease starting now.
    pub fn into_lease(self) -> Result<Lease, VaultError> {
        let token = self
            .client_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Auth("response has no client_token".to_string()))?;

        if self.renewable && self.lease_duration == 0 {
            tracing::warn!(
                accessor = %self.accessor,
                "Vault reported a renewable token with zero lease duration, treating it as non-expiring"
            );
        }

        let mut lease_duration = Duration::from_secs(self.lease_duration);
        if lease_duration > MAX_LEASE_DURATION {
            tracing::warn!(
                accessor = %self.accessor,
                lease_duration = self.lease_duration,
                "Vault reported an implausible lease duration, clamping it"
            );
            lease_duration = MAX_LEASE_DURATION;
        }

        Ok(Lease {
            token: token.into(),
            accessor: self.accessor,
            policies: self.policies.into_iter().collect::<BTreeSet<_>>(),
            created_at: Instant::now(),
            lease_duration,
            renewable: self.renewable,
            entity_id: self.entity_id,
            token_type: self.token_type,
            orphan: self.orphan,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn login_response(token: &str, lease_duration: u64) -> serde_json::Value {
        serde_json::json!({
            "request_id": "0493dbdf-b07a-a6be-7b67-dc6d2f682fcd",
            "lease_id": "",
            "renewable": false,
            "lease_duration": 0,
            "data": null,
            "wrap_info": null,
            "warnings": null,
            "auth": {
                "client_token": token,
                "accessor": "PAwVe79bWN0uoGCLrWdfYsIR",
                "policies": ["default", "mypolicy"],
                "token_policies": ["default", "mypolicy"],
                "metadata": {"username": "bob"},
                "lease_duration": lease_duration,
                "renewable": true,
                "entity_id": "939a217d-9172-0ba8-1b6a-7594213f1fad",
                "token_type": "service",
                "orphan": true
            }
        })
    }

    #[test]
    fn test_parse_login_response() {
        let response: LoginResponse =
            serde_json::from_value(login_response("s.tmaYRmdXqKVF810aYOinWgMd", 604800)).unwrap();
        let lease = response.into_auth().unwrap().into_lease().unwrap();

        assert_eq!(
            secrecy::ExposeSecret::expose_secret(&lease.token),
            "s.tmaYRmdXqKVF810aYOinWgMd"
        );
        assert_eq!(lease.accessor, "PAwVe79bWN0uoGCLrWdfYsIR");
        assert!(lease.policies.contains("default"));
        assert!(lease.policies.contains("mypolicy"));
        assert_eq!(lease.lease_duration, Duration::from_secs(604800));
        assert!(lease.renewable);
        assert_eq!(lease.entity_id, "939a217d-9172-0ba8-1b6a-7594213f1fad");
        assert_eq!(lease.token_type.as_deref(), Some("service"));
        assert!(lease.orphan);
        assert_eq!(lease.metadata.get("username").map(String::as_str), Some("bob"));
    }

    #[test]
    fn test_huge_lease_duration_is_clamped() {
        let json = r#"{"auth": {"client_token": "s.huge", "lease_duration": 18446744073709551615, "renewable": true}}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let lease = response.into_auth().unwrap().into_lease().unwrap();

        assert_eq!(lease.lease_duration, MAX_LEASE_DURATION);
        let expires_at = lease.expires_at().unwrap();
        assert!(lease.renew_at(Duration::from_secs(60)).unwrap() < expires_at);
        assert!(!lease.expired(Instant::now()));
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("bob").unwrap(), "bob");
        assert_eq!(encode_path_segment("a/b?c#d").unwrap(), "a%2Fb%3Fc%23d");
        assert_eq!(encode_path_segment("j doe").unwrap(), "j%20doe");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = r#"{"auth": {"client_token": "t", "mfa_requirement": null, "num_uses": 0}}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let auth = response.into_auth().unwrap();
        assert_eq!(auth.client_token.as_deref(), Some("t"));
        assert_eq!(auth.lease_duration, 0);
    }

    #[test]
    fn test_missing_client_token_is_auth_error() {
        let json = r#"{"auth": {"accessor": "a", "lease_duration": 60}}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(response.into_auth(), Err(VaultError::Auth(_))));
    }

    #[test]
    fn test_null_auth_is_auth_error() {
        let json = r#"{"request_id": "r", "auth": null, "warnings": ["deprecated"]}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(response.into_auth(), Err(VaultError::Auth(_))));
    }

    #[test]
    fn test_auth_block_survives_reencoding() {
        let original = login_response("s.round", 3600);
        let response: LoginResponse = serde_json::from_value(original.clone()).unwrap();
        let auth = response.into_auth().unwrap();

        let encoded = serde_json::to_value(&auth).unwrap();
        for field in [
            "client_token",
            "accessor",
            "policies",
            "token_policies",
            "metadata",
            "lease_duration",
            "renewable",
            "entity_id",
            "token_type",
            "orphan",
        ] {
            assert_eq!(encoded[field], original["auth"][field], "field {field}");
        }
        let decoded: VaultAuth = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, auth);
    }

    #[test]
    fn test_debug_hides_client_token() {
        let response: LoginResponse =
            serde_json::from_value(login_response("s.hidden", 60)).unwrap();
        let debug = format!("{response:?}");
        assert!(!debug.contains("s.hidden"));
    }

    #[test]
    fn test_login_request_path_trims_slashes() {
        let request = LoginRequest::new(
            "/kubernetes_custom/",
            "login",
            serde_json::json!({"password": "hunter2"}),
        );
        assert_eq!(request.path, "/v1/auth/kubernetes_custom/login");
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
