//! Secret store access over the Vault HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Default timeout applied to every secret store request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Errors raised by [`SecretStore`] implementations.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The HTTP client could not be built.
    #[error("failed to create secret store client: {0}")]
    Client(String),
    /// A request failed before a response arrived.
    #[error("secret store request to {path} failed: {message}")]
    Request {
        /// Secret path involved.
        path: String,
        /// Description of the failure.
        message: String,
    },
    /// The server rejected the request.
    #[error("secret store returned HTTP {status} for {path}: {body}")]
    Status {
        /// Secret path involved.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },
    /// The server answered with an unexpected payload.
    #[error("unexpected secret store response for {path}: {message}")]
    Decode {
        /// Secret path involved.
        path: String,
        /// Description of the problem.
        message: String,
    },
    /// No token is available for an authenticated call.
    #[error("secret store is not authenticated")]
    Unauthenticated,
}

/// Read/write access to a hierarchical secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads the secret at `path`, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretStoreError`] when the request fails.
    async fn read(&self, path: &str) -> Result<Option<Map<String, Value>>, SecretStoreError>;

    /// Writes `data` to `path`, replacing any existing secret.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretStoreError`] when the request fails.
    async fn write(&self, path: &str, data: &Map<String, Value>) -> Result<(), SecretStoreError>;

    /// Lists the keys directly below `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretStoreError`] when the request fails.
    async fn list(&self, path: &str) -> Result<Vec<String>, SecretStoreError>;

    /// Deletes the secret at `path`; deleting a missing secret succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretStoreError`] when the request fails.
    async fn delete(&self, path: &str) -> Result<(), SecretStoreError>;
}

/// AppRole credentials used to obtain a client token.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct AppRoleCredentials {
    /// Role identifier.
    pub role_id: String,
    /// Role secret.
    pub secret_id: String,
}

impl std::fmt::Debug for AppRoleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRoleCredentials")
            .field("role_id", &self.role_id)
            .field("secret_id", &"<redacted>")
            .finish()
    }
}

/// Vault client speaking the HTTP API.
#[derive(Debug)]
pub struct VaultClient {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct KeyList {
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct LoginEnvelope {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

impl VaultClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretStoreError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SecretStoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SecretStoreError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: RwLock::new(None),
        })
    }

    /// Uses `token` for subsequent requests.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.token.write() = Some(token.into());
        self
    }

    /// Whether a client token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    /// Exchanges AppRole credentials for a client token and keeps it.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretStoreError`] when the login is rejected.
    pub async fn login_with_app_role(
        &self,
        credentials: &AppRoleCredentials,
    ) -> Result<(), SecretStoreError> {
        let path = "auth/approle/login";
        let body = serde_json::json!({
            "role_id": credentials.role_id,
            "secret_id": credentials.secret_id,
        });
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|err| request_error(path, &err))?;
        let text = checked_body(path, response).await?.unwrap_or_default();
        let envelope: LoginEnvelope = decode(path, &text)?;
        *self.token.write() = Some(envelope.auth.client_token);
        debug!(role_id = %credentials.role_id, "authenticated with AppRole");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, SecretStoreError> {
        let token = self
            .token
            .read()
            .clone()
            .ok_or(SecretStoreError::Unauthenticated)?;
        Ok(self
            .client
            .request(method, self.url(path))
            .header(TOKEN_HEADER, token))
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn read(&self, path: &str) -> Result<Option<Map<String, Value>>, SecretStoreError> {
        let response = self
            .request(Method::GET, path)?
            .send()
            .await
            .map_err(|err| request_error(path, &err))?;
        match checked_body(path, response).await? {
            None => Ok(None),
            Some(text) => {
                let envelope: DataEnvelope<Map<String, Value>> = decode(path, &text)?;
                Ok(Some(envelope.data))
            }
        }
    }

    async fn write(&self, path: &str, data: &Map<String, Value>) -> Result<(), SecretStoreError> {
        let response = self
            .request(Method::PUT, path)?
            .json(data)
            .send()
            .await
            .map_err(|err| request_error(path, &err))?;
        checked_body(path, response).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, SecretStoreError> {
        let response = self
            .request(Method::GET, path)?
            .query(&[("list", "true")])
            .send()
            .await
            .map_err(|err| request_error(path, &err))?;
        match checked_body(path, response).await? {
            None => Ok(Vec::new()),
            Some(text) => {
                let envelope: DataEnvelope<KeyList> = decode(path, &text)?;
                Ok(envelope.data.keys)
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<(), SecretStoreError> {
        let response = self
            .request(Method::DELETE, path)?
            .send()
            .await
            .map_err(|err| request_error(path, &err))?;
        checked_body(path, response).await?;
        Ok(())
    }
}

fn request_error(path: &str, err: &reqwest::Error) -> SecretStoreError {
    let message = if err.is_timeout() {
        String::from("request timed out")
    } else {
        err.to_string()
    };
    SecretStoreError::Request {
        path: path.to_owned(),
        message,
    }
}

/// Returns the response body, `None` for 404, or a status error.
async fn checked_body(
    path: &str,
    response: reqwest::Response,
) -> Result<Option<String>, SecretStoreError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let body = response
        .text()
        .await
        .map_err(|err| request_error(path, &err))?;
    if !status.is_success() {
        return Err(SecretStoreError::Status {
            path: path.to_owned(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(Some(body))
}

fn decode<T: for<'de> Deserialize<'de>>(path: &str, text: &str) -> Result<T, SecretStoreError> {
    serde_json::from_str(text).map_err(|err| SecretStoreError::Decode {
        path: path.to_owned(),
        message: err.to_string(),
    })
}
