//! HTTP client with authentication, retries, and failover
//!
//! The CloudRec server issues a session token from `/api/user/login` and
//! expects it back in the `token` header of every request.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::{sync::RwLock, time::Duration};
use tracing::{debug, error, warn};

use cloudrec_api::ApiResult;

use crate::error::{ClientError, Result};

/// Header carrying the session token
pub const TOKEN_HEADER: &str = "token";

/// Configuration for the HTTP client
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// List of server addresses to connect to
    pub server_addrs: Vec<String>,
    /// User id for authentication; empty disables login
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Context path (e.g., "/cloudrec")
    pub context_path: String,
    /// Auth endpoint path (default: "/api/user/login")
    pub auth_endpoint: String,
    /// Lifetime assumed for an issued token, in seconds
    pub token_ttl_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            server_addrs: vec!["http://127.0.0.1:8080".to_string()],
            username: String::new(),
            password: String::new(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
            context_path: String::new(),
            auth_endpoint: "/api/user/login".to_string(),
            token_ttl_secs: 18000,
        }
    }
}

impl HttpClientConfig {
    /// Create a new config with a single server address
    pub fn new(server_addr: &str) -> Self {
        Self {
            server_addrs: vec![server_addr.to_string()],
            ..Default::default()
        }
    }

    /// Create a config with multiple server addresses
    pub fn with_servers(server_addrs: Vec<String>) -> Self {
        Self {
            server_addrs,
            ..Default::default()
        }
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Set timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }

    /// Set context path
    pub fn with_context_path(mut self, path: &str) -> Self {
        self.context_path = path.to_string();
        self
    }

    fn auth_enabled(&self) -> bool {
        !self.username.is_empty()
    }
}

#[derive(Clone, Debug)]
struct TokenInfo {
    access_token: String,
    expires_at: std::time::Instant,
}

/// HTTP client with authentication and failover support
pub struct CloudRecHttpClient {
    client: Client,
    config: HttpClientConfig,
    current_server_index: RwLock<usize>,
    token: RwLock<Option<TokenInfo>>,
}

impl CloudRecHttpClient {
    /// Create a new HTTP client and try to log in once
    pub async fn new(config: HttpClientConfig) -> Result<Self> {
        let instance = Self::new_without_auth(config)?;

        // A failed login here is not fatal; ensure_token() retries per request.
        if instance.config.auth_enabled()
            && let Err(e) = instance.authenticate().await
        {
            warn!("Initial authentication failed (will retry on demand): {}", e);
        }

        Ok(instance)
    }

    /// Create a client without initial authentication
    pub fn new_without_auth(config: HttpClientConfig) -> Result<Self> {
        if config.server_addrs.is_empty() {
            return Err(ClientError::Other(anyhow::anyhow!(
                "at least one server address is required"
            )));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            config,
            current_server_index: RwLock::new(0),
            token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn current_server(&self) -> String {
        let index = *self
            .current_server_index
            .read()
            .unwrap_or_else(|e| e.into_inner());
        self.config.server_addrs[index].clone()
    }

    /// Switch to the next server (for failover)
    fn switch_to_next_server(&self) {
        let mut index = self
            .current_server_index
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *index = (*index + 1) % self.config.server_addrs.len();
        debug!("Switched to server index: {}", *index);
    }

    /// Build full URL with context path
    fn build_url(&self, path: &str) -> String {
        let base_url = self.current_server();
        let base_url = base_url.trim_end_matches('/');
        let context_path = self.config.context_path.trim_matches('/');

        if context_path.is_empty() {
            format!("{}{}", base_url, path)
        } else {
            format!("{}/{}{}", base_url, context_path, path)
        }
    }

    fn get_token(&self) -> Option<String> {
        let token_guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        token_guard.as_ref().and_then(|t| {
            // Check if token is still valid (with 5 minute buffer)
            if t.expires_at > std::time::Instant::now() + Duration::from_secs(300) {
                Some(t.access_token.clone())
            } else {
                None
            }
        })
    }

    fn set_token(&self, access_token: String) {
        let expires_at =
            std::time::Instant::now() + Duration::from_secs(self.config.token_ttl_secs);
        let mut token_guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *token_guard = Some(TokenInfo {
            access_token,
            expires_at,
        });
    }

    fn clear_token(&self) {
        let mut token_guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *token_guard = None;
    }

    /// Authenticate with the server
    pub async fn authenticate(&self) -> Result<()> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct LoginForm<'a> {
            user_id: &'a str,
            password: &'a str,
        }

        let url = self.build_url(&self.config.auth_endpoint);
        debug!("Authenticating with server: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&LoginForm {
                user_id: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::AuthFailed(format!(
                "login returned status {}",
                response.status()
            )));
        }

        let result: ApiResult<String> = response.json().await?;
        match result.content {
            Some(token) if result.is_success() && !token.is_empty() => {
                self.set_token(token);
                debug!(
                    "Authentication successful, token expires in {} seconds",
                    self.config.token_ttl_secs
                );
                Ok(())
            }
            _ => Err(ClientError::AuthFailed(result.message().to_string())),
        }
    }

    /// Ensure we have a valid token, refreshing if needed
    async fn ensure_token(&self) -> Result<Option<String>> {
        if !self.config.auth_enabled() {
            return Ok(None);
        }
        if let Some(token) = self.get_token() {
            return Ok(Some(token));
        }

        self.authenticate().await?;

        self.get_token().map(Some).ok_or_else(|| {
            ClientError::AuthFailed("no token after authentication".to_string())
        })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_with_retry(
            |client, url, token| async move {
                with_token(client.get(&url), token.as_deref()).send().await
            },
            path,
        )
        .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request_with_retry(
            |client, url, token| async move {
                with_token(client.post(&url), token.as_deref())
                    .json(body)
                    .send()
                    .await
            },
            path,
        )
        .await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_with_retry(
            |client, url, token| async move {
                with_token(client.post(&url), token.as_deref())
                    .send()
                    .await
            },
            path,
        )
        .await
    }

    /// Generic request with retry logic
    ///
    /// Connection failures fail over to the next server address; a 401
    /// triggers one re-login per attempt. Non-success responses are not
    /// retried.
    async fn request_with_retry<T, F, Fut>(&self, request_fn: F, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(Client, String, Option<String>) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Response, reqwest::Error>>,
    {
        let max_retries = self.config.server_addrs.len();
        let mut last_error = None;

        for _ in 0..max_retries {
            let url = self.build_url(path);
            let token = self.ensure_token().await?;

            match request_fn(self.client.clone(), url, token).await {
                Ok(response) => {
                    if response.status() == StatusCode::UNAUTHORIZED
                        && self.config.auth_enabled()
                    {
                        warn!("Token expired, re-authenticating...");
                        self.clear_token();
                        self.authenticate().await?;
                        continue;
                    }
                    return self.handle_response(response).await;
                }
                Err(e) => {
                    warn!("Request failed: {}, switching to next server", e);
                    self.switch_to_next_server();
                    last_error = Some(ClientError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::Other(anyhow::anyhow!("All servers failed"))))
    }

    /// Handle response and parse JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Request failed with status {}: {}", status, body);
            Err(ClientError::ServerError {
                code: status.as_u16() as i32,
                message: body,
            })
        }
    }
}

fn with_token(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.header(TOKEN_HEADER, token),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.server_addrs.len(), 1);
        assert!(config.username.is_empty());
        assert!(!config.auth_enabled());
        assert_eq!(config.auth_endpoint, "/api/user/login");
    }

    #[test]
    fn test_config_builder() {
        let config = HttpClientConfig::new("http://localhost:8080")
            .with_auth("admin", "secret")
            .with_timeouts(3000, 15000)
            .with_context_path("/cloudrec");

        assert_eq!(config.server_addrs[0], "http://localhost:8080");
        assert_eq!(config.username, "admin");
        assert!(config.auth_enabled());
        assert_eq!(config.connect_timeout_ms, 3000);
        assert_eq!(config.read_timeout_ms, 15000);
        assert_eq!(config.context_path, "/cloudrec");
    }

    #[test]
    fn test_no_servers_rejected() {
        let config = HttpClientConfig::with_servers(vec![]);
        assert!(CloudRecHttpClient::new_without_auth(config).is_err());
    }

    #[test]
    fn test_build_url_no_context() {
        let config = HttpClientConfig::new("http://localhost:8080/");
        let client = CloudRecHttpClient::new_without_auth(config).unwrap();

        assert_eq!(
            client.build_url("/api/whitedRule/list"),
            "http://localhost:8080/api/whitedRule/list"
        );
    }

    #[test]
    fn test_build_url_with_context() {
        let config = HttpClientConfig::new("http://localhost:8080").with_context_path("/cloudrec/");
        let client = CloudRecHttpClient::new_without_auth(config).unwrap();

        assert_eq!(
            client.build_url("/api/whitedRule/1"),
            "http://localhost:8080/cloudrec/api/whitedRule/1"
        );
    }

    #[test]
    fn test_failover_rotates_servers() {
        let config = HttpClientConfig::with_servers(vec![
            "http://server1:8080".to_string(),
            "http://server2:8080".to_string(),
        ]);
        let client = CloudRecHttpClient::new_without_auth(config).unwrap();

        assert_eq!(client.current_server(), "http://server1:8080");
        client.switch_to_next_server();
        assert_eq!(client.current_server(), "http://server2:8080");
        client.switch_to_next_server();
        assert_eq!(client.current_server(), "http://server1:8080");
    }

    #[tokio::test]
    async fn test_token_skipped_when_auth_disabled() {
        let client =
            CloudRecHttpClient::new_without_auth(HttpClientConfig::new("http://localhost:8080"))
                .unwrap();
        assert_eq!(client.ensure_token().await.unwrap(), None);
    }

    #[test]
    fn test_token_cache() {
        let config = HttpClientConfig::new("http://localhost:8080").with_auth("admin", "secret");
        let client = CloudRecHttpClient::new_without_auth(config).unwrap();
        assert!(client.get_token().is_none());

        client.set_token("abc".to_string());
        assert_eq!(client.get_token().as_deref(), Some("abc"));

        client.clear_token();
        assert!(client.get_token().is_none());
    }
}
