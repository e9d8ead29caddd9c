use crate::VaultError;
use crate::config::AuthConfig;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
pub const VAULT_NAMESPACE_HEADER: &str = "X-Vault-Namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// Error body returned by Vault on 4xx/5xx.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// JSON-over-HTTP(S) channel to one Vault server. Safe to share between tasks.
#[derive(Debug, Clone)]
pub struct VaultTransport {
    base_url: String,
    client: reqwest::Client,
}

impl VaultTransport {
    pub fn new(config: &AuthConfig) -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref namespace) = config.namespace {
            let value = HeaderValue::from_str(namespace)
                .map_err(|e| VaultError::Config(format!("invalid namespace: {e}")))?;
            headers.insert(VAULT_NAMESPACE_HEADER, value);
        }
        if let Some(ref app_name) = config.application_name {
            let value = HeaderValue::from_str(app_name)
                .map_err(|e| VaultError::Config(format!("invalid application name: {e}")))?;
            headers.insert(USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| VaultError::Config(format!("Failed to build HTTP client: {e}")))?;

        if config.tls_skip_verify {
            tracing::warn!("TLS certificate verification is disabled for Vault requests");
        }

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request to `path` (e.g. `/v1/auth/token/renew-self`) and decode
    /// the JSON response body into `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&SecretString>,
    ) -> Result<T, VaultError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut request = self.client.request(method.into(), &url);
        if let Some(token) = token {
            request = request.header(VAULT_TOKEN_HEADER, token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| VaultError::Network(e.to_string()))?;

        if !status.is_success() {
            let errors = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|body| body.errors)
                .unwrap_or_else(|_| {
                    let text = String::from_utf8_lossy(&bytes).trim().to_string();
                    if text.is_empty() { Vec::new() } else { vec![text] }
                });
            tracing::debug!(status = status.as_u16(), path, "Vault request failed");
            return Err(VaultError::Http {
                status: status.as_u16(),
                errors,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| VaultError::Decode(e.to_string()))
    }
}
