use super::{AuthMethod, LoginRequest, VaultAuth};
use crate::VaultError;
use crate::config::DEFAULT_APP_ROLE_MOUNT;
use crate::lease::Lease;
use crate::transport::VaultTransport;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// AppRole authentication
pub struct AppRoleAuth {
    pub mount_path: String,
    pub role_id: String,
    secret_id: SecretString,
}

impl AppRoleAuth {
    pub fn new(role_id: impl Into<String>, secret_id: SecretString) -> Self {
        Self {
            mount_path: DEFAULT_APP_ROLE_MOUNT.to_string(),
            role_id: role_id.into(),
            secret_id,
        }
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    pub fn login_request(&self) -> LoginRequest {
        LoginRequest::new(
            &self.mount_path,
            "login",
            serde_json::json!({
                "role_id": self.role_id,
                "secret_id": self.secret_id.expose_secret(),
            }),
        )
    }

    pub async fn login(&self, transport: &VaultTransport) -> Result<VaultAuth, VaultError> {
        self.login_request().send(transport).await
    }
}

#[async_trait]
impl AuthMethod for AppRoleAuth {
    async fn authenticate(&self, transport: &VaultTransport) -> Result<Lease, VaultError> {
        self.login(transport).await?.into_lease()
    }

    fn supports_renewal(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "approle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::login_response;
    use crate::config::{AuthBackendConfig, AuthConfig};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_login_request_shape() {
        let auth = AppRoleAuth::new("role-1", SecretString::from("secret-1"))
            .with_mount_path("approle_ci");
        let request = auth.login_request();

        assert_eq!(request.path, "/v1/auth/approle_ci/login");
        assert_eq!(
            request.body,
            serde_json::json!({"role_id": "role-1", "secret_id": "secret-1"})
        );
    }

    #[tokio::test]
    async fn test_login() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .and(body_json(serde_json::json!({"role_id": "role-1", "secret_id": "secret-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response("s.approle", 3600)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = AuthConfig::new(mock_server.uri(), AuthBackendConfig::static_token("unused"));
        let transport = VaultTransport::new(&config).unwrap();
        let auth = AppRoleAuth::new("role-1", SecretString::from("secret-1"));

        let lease = auth.authenticate(&transport).await.unwrap();
        assert_eq!(lease, Lease::new("s.approle", std::time::Duration::ZERO, false));
        assert_eq!(lease.lease_duration.as_secs(), 3600);
    }
}
