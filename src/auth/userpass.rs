use super::{AuthMethod, LoginRequest, VaultAuth, encode_path_segment};
use crate::VaultError;
use crate::config::DEFAULT_USERPASS_MOUNT;
use crate::lease::Lease;
use crate::transport::VaultTransport;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// Username and password authentication
pub struct UserpassAuth {
    pub mount_path: String,
    pub username: String,
    password: SecretString,
}

impl UserpassAuth {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            mount_path: DEFAULT_USERPASS_MOUNT.to_string(),
            username: username.into(),
            password,
        }
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    /// The username travels in the path and is percent-encoded.
    pub fn login_request(&self) -> Result<LoginRequest, VaultError> {
        Ok(LoginRequest::new(
            &self.mount_path,
            &format!("login/{}", encode_path_segment(&self.username)?),
            serde_json::json!({ "password": self.password.expose_secret() }),
        ))
    }

    pub async fn login(&self, transport: &VaultTransport) -> Result<VaultAuth, VaultError> {
        self.login_request()?.send(transport).await
    }
}

#[async_trait]
impl AuthMethod for UserpassAuth {
    async fn authenticate(&self, transport: &VaultTransport) -> Result<Lease, VaultError> {
        self.login(transport).await?.into_lease()
    }

    fn supports_renewal(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "userpass"
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
    fn test_login_request_puts_username_in_path() {
        let auth = UserpassAuth::new("bob", SecretString::from("sinclair"));
        let request = auth.login_request().unwrap();

        assert_eq!(request.path, "/v1/auth/userpass/login/bob");
        assert_eq!(request.body, serde_json::json!({"password": "sinclair"}));
    }

    #[test]
    fn test_username_cannot_escape_path_segment() {
        let auth = UserpassAuth::new("../admin?x#y", SecretString::from("pw"));
        let request = auth.login_request().unwrap();

        assert_eq!(request.path, "/v1/auth/userpass/login/..%2Fadmin%3Fx%23y");
    }

    #[tokio::test]
    async fn test_login_with_custom_mount() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/people/login/bob"))
            .and(body_json(serde_json::json!({"password": "sinclair"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response("s.bob", 600)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = AuthConfig::new(mock_server.uri(), AuthBackendConfig::static_token("unused"));
        let transport = VaultTransport::new(&config).unwrap();
        let auth = UserpassAuth::new("bob", SecretString::from("sinclair")).with_mount_path("people");

        let auth_block = auth.login(&transport).await.unwrap();
        assert_eq!(auth_block.client_token.as_deref(), Some("s.bob"));
        assert_eq!(auth_block.metadata.unwrap().get("username").unwrap(), "bob");
    }
}
