use super::{AuthMethod, LoginRequest, VaultAuth};
use crate::VaultError;
use crate::config::{DEFAULT_JWT_PATH, DEFAULT_KUBERNETES_MOUNT};
use crate::lease::Lease;
use crate::transport::VaultTransport;
use async_trait::async_trait;
use std::path::PathBuf;

/// Kubernetes authentication
pub struct KubernetesAuth {
    pub mount_path: String,
    pub role: String,
    pub jwt_path: PathBuf,
}

impl KubernetesAuth {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            mount_path: DEFAULT_KUBERNETES_MOUNT.to_string(),
            role: role.into(),
            jwt_path: PathBuf::from(DEFAULT_JWT_PATH),
        }
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    pub fn with_jwt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.jwt_path = path.into();
        self
    }

    /// The service account token is re-read on every login since the kubelet
    /// rotates it.
    async fn read_jwt(&self) -> Result<String, VaultError> {
        tokio::fs::read_to_string(&self.jwt_path)
            .await
            .map(|s| s.trim().to_string())
            .map_err(|e| {
                VaultError::Config(format!(
                    "Failed to read JWT from {}: {}",
                    self.jwt_path.display(),
                    e
                ))
            })
    }

    pub async fn login_request(&self) -> Result<LoginRequest, VaultError> {
        let jwt = self.read_jwt().await?;
        Ok(LoginRequest::new(
            &self.mount_path,
            "login",
            serde_json::json!({ "role": self.role, "jwt": jwt }),
        ))
    }

    pub async fn login(&self, transport: &VaultTransport) -> Result<VaultAuth, VaultError> {
        self.login_request().await?.send(transport).await
    }
}

#[async_trait]
impl AuthMethod for KubernetesAuth {
    async fn authenticate(&self, transport: &VaultTransport) -> Result<Lease, VaultError> {
        self.login(transport).await?.into_lease()
    }

    fn supports_renewal(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "kubernetes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::login_response;
    use crate::config::{AuthBackendConfig, AuthConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn jwt_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{contents}").unwrap();
        file
    }

    fn transport(url: &str) -> VaultTransport {
        VaultTransport::new(&AuthConfig::new(url, AuthBackendConfig::static_token("unused"))).unwrap()
    }

    #[tokio::test]
    async fn test_read_jwt_from_file() {
        let file = jwt_file("my-jwt-token");
        let auth = KubernetesAuth::new("app").with_jwt_path(file.path());

        let jwt = auth.read_jwt().await.unwrap();
        assert_eq!(jwt, "my-jwt-token");
    }

    #[tokio::test]
    async fn test_read_jwt_missing_file() {
        let auth = KubernetesAuth::new("app").with_jwt_path("/nonexistent/path");

        let result = auth.read_jwt().await;
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[tokio::test]
    async fn test_login_request_shape() {
        let file = jwt_file("header.payload.sig");
        let auth = KubernetesAuth::new("some/role")
            .with_mount_path("kubernetes_custom")
            .with_jwt_path(file.path());

        let request = auth.login_request().await.unwrap();
        assert_eq!(request.path, "/v1/auth/kubernetes_custom/login");
        assert_eq!(
            request.body,
            serde_json::json!({"role": "some/role", "jwt": "header.payload.sig"})
        );
    }

    #[tokio::test]
    async fn test_jwt_is_reread_on_each_login() {
        let mock_server = MockServer::start().await;
        let file = jwt_file("first");

        Mock::given(method("POST"))
            .and(path("/v1/auth/kubernetes/login"))
            .and(body_json(serde_json::json!({"role": "app", "jwt": "first"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response("s.one", 60)))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/kubernetes/login"))
            .and(body_json(serde_json::json!({"role": "app", "jwt": "rotated"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response("s.two", 60)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = KubernetesAuth::new("app").with_jwt_path(file.path());
        let transport = transport(&mock_server.uri());

        let first = auth.authenticate(&transport).await.unwrap();
        std::fs::write(file.path(), "rotated\n").unwrap();
        let second = auth.authenticate(&transport).await.unwrap();

        assert_eq!(first, Lease::new("s.one", std::time::Duration::ZERO, false));
        assert_eq!(second, Lease::new("s.two", std::time::Duration::ZERO, false));
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let mock_server = MockServer::start().await;
        let file = jwt_file("expired-jwt");

        Mock::given(method("POST"))
            .and(path("/v1/auth/kubernetes/login"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errors": ["permission denied"]
            })))
            .mount(&mock_server)
            .await;

        let auth = KubernetesAuth::new("app").with_jwt_path(file.path());
        let result = auth.authenticate(&transport(&mock_server.uri())).await;

        match result {
            Err(VaultError::Auth(message)) => assert!(message.contains("permission denied")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
