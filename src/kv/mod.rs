//! Key-value directory access over the Consul HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use thiserror::Error;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Errors raised by [`KeyValueStore`] implementations.
#[derive(Debug, Error)]
pub enum KeyValueError {
    /// The HTTP client could not be built.
    #[error("failed to create key-value client: {0}")]
    Client(String),
    /// A request failed before a response arrived.
    #[error("key-value request for {key} failed: {message}")]
    Request {
        /// Key involved.
        key: String,
        /// Description of the failure.
        message: String,
    },
    /// The server rejected the request.
    #[error("key-value store returned HTTP {status} for {key}: {body}")]
    Status {
        /// Key involved.
        key: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// The server answered with an unexpected payload.
    #[error("unexpected key-value response for {key}: {message}")]
    Decode {
        /// Key involved.
        key: String,
        /// Description of the problem.
        message: String,
    },
}

/// Flat key-value directory shared by cluster nodes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the raw value of `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyValueError`] when the request fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueError>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyValueError`] when the request fails or the store
    /// refuses the write.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KeyValueError>;

    /// Removes `key`; removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyValueError`] when the request fails.
    async fn delete(&self, key: &str) -> Result<(), KeyValueError>;

    /// Lists every key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyValueError`] when the request fails.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KeyValueError>;
}

/// Consul KV client.
#[derive(Debug)]
pub struct ConsulClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ConsulClient {
    /// Creates a client for the agent at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KeyValueError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| KeyValueError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: None,
        })
    }

    /// Sends `token` as the ACL token with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, key: &str) -> RequestBuilder {
        let url = format!("{}/v1/kv/{}", self.base_url, key.trim_start_matches('/'));
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }

    async fn send(&self, key: &str, builder: RequestBuilder) -> Result<Option<Vec<u8>>, KeyValueError> {
        let response = builder.send().await.map_err(|err| KeyValueError::Request {
            key: key.to_owned(),
            message: err.to_string(),
        })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response.bytes().await.map_err(|err| KeyValueError::Request {
            key: key.to_owned(),
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(KeyValueError::Status {
                key: key.to_owned(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(Some(bytes.to_vec()))
    }
}

#[async_trait]
impl KeyValueStore for ConsulClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueError> {
        let builder = self.request(Method::GET, key).query(&[("raw", "true")]);
        self.send(key, builder).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KeyValueError> {
        let builder = self.request(Method::PUT, key).body(value.to_vec());
        let body = self.send(key, builder).await?.unwrap_or_default();
        // Consul answers `true` or `false` depending on whether the write
        // was applied.
        if String::from_utf8_lossy(&body).trim() == "false" {
            return Err(KeyValueError::Status {
                key: key.to_owned(),
                status: 200,
                body: String::from("write was not applied"),
            });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KeyValueError> {
        let builder = self.request(Method::DELETE, key);
        self.send(key, builder).await?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KeyValueError> {
        let builder = self.request(Method::GET, prefix).query(&[("keys", "true")]);
        self.send(prefix, builder).await?.map_or_else(
            || Ok(Vec::new()),
            |bytes| {
                serde_json::from_slice(&bytes).map_err(|err| KeyValueError::Decode {
                    key: prefix.to_owned(),
                    message: err.to_string(),
                })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> ConsulClient {
        ConsulClient::new(&server.uri(), Duration::from_secs(5))
            .expect("client")
            .with_token("acl")
    }

    #[tokio::test]
    async fn get_reads_raw_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/neon/leader"))
            .and(query_param("raw", "true"))
            .and(header("X-Consul-Token", "acl"))
            .respond_with(ResponseTemplate::new(200).set_body_string("manager-0"))
            .expect(1)
            .mount(&server)
            .await;

        let value = client(&server).get("neon/leader").await.expect("get");

        assert_eq!(value.as_deref(), Some(&b"manager-0"[..]));
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/neon/none"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).get("neon/none").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn put_sends_body_and_checks_result() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/kv/neon/mode"))
            .and(body_string("swarm"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/kv/neon/mode"))
            .and(body_string("stale"))
            .respond_with(ResponseTemplate::new(200).set_body_string("false"))
            .expect(1)
            .mount(&server)
            .await;
        let consul = client(&server);

        consul.put("neon/mode", b"swarm").await.expect("put");
        let rejected = consul.put("neon/mode", b"stale").await;

        assert!(matches!(rejected, Err(KeyValueError::Status { .. })));
    }

    #[tokio::test]
    async fn keys_decodes_json_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/neon/"))
            .and(query_param("keys", "true"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!(["neon/a", "neon/b"])),
            )
            .mount(&server)
            .await;

        let keys = client(&server).keys("neon/").await.expect("keys");

        assert_eq!(keys, vec![String::from("neon/a"), String::from("neon/b")]);
    }

    #[tokio::test]
    async fn anonymous_client_sends_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/kv/neon/old"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .expect(1)
            .mount(&server)
            .await;
        let consul = ConsulClient::new(&server.uri(), Duration::from_secs(5)).expect("client");

        consul.delete("neon/old").await.expect("delete");

        let received = server.received_requests().await.unwrap_or_default();
        let request = received.first().expect("request");
        assert!(!request.headers.contains_key("x-consul-token"));
    }
}
