// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP/HTTPS webhook target
//!
//! POSTs every [`DispatchContext`] as JSON to an external endpoint. Failed
//! requests are retried inside the target with exponential backoff; the
//! scheduler only ever sees the final outcome.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use super::{DispatchContext, DispatchError, DispatchTarget};

const MAX_RETRIES: u32 = 10;
const BACKOFF_BASE_MS: u64 = 50;

/// Webhook target
#[derive(Debug)]
pub struct HttpTarget {
    /// Target webhook URL
    url: String,
    /// Optional bearer token
    auth_token: Option<String>,
    client: reqwest::Client,
    /// Number of retry attempts for failed requests
    retry_count: u32,
    /// Timeout for one HTTP request in seconds
    timeout_seconds: u64,
}

impl HttpTarget {
    /// Create a new webhook target for `url` (http:// or https://)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            client: reqwest::Client::new(),
            retry_count: 3,
            timeout_seconds: 10,
        }
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set retry count for failed requests, capped at 10
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count.min(MAX_RETRIES);
        self
    }

    /// Set the request timeout, clamped to 1-60 seconds
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds.clamp(1, 60);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(err) => warn!("Ignoring invalid auth token for {}: {}", self.url, err),
            }
        }
        headers
    }

    async fn send_once(&self, payload: &Value, headers: &HeaderMap) -> Result<Value, DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .headers(headers.clone())
            .json(payload)
            .timeout(Duration::from_secs(self.timeout_seconds))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| json!({ "status": status.as_u16() })))
    }
}

#[async_trait]
impl DispatchTarget for HttpTarget {
    fn name(&self) -> &str {
        "http"
    }

    async fn dispatch(&self, context: &DispatchContext) -> Result<Value, DispatchError> {
        let headers = self.headers();
        let max_attempts = self.retry_count + 1;
        let mut payload = json!(context);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                payload["retry_attempt"] = json!(attempt);
            }

            match self.send_once(&payload, &headers).await {
                Ok(result) => {
                    debug!("POST {} succeeded on attempt {}", self.url, attempt);
                    return Ok(result);
                }
                Err(err) if attempt >= max_attempts => return Err(err),
                Err(err) => {
                    warn!(
                        "POST {} failed (attempt {}/{}): {}",
                        self.url, attempt, max_attempts, err
                    );
                }
            }

            // 50ms, 100ms, 200ms, ...
            let backoff_ms = BACKOFF_BASE_MS * 2_u64.pow(attempt - 1);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn context() -> DispatchContext {
        DispatchContext {
            handler_id: "webhook".to_string(),
            sensor: SensorKind::Adxl345,
            timestamp: chrono::Utc::now(),
            attributes: Vec::new(),
        }
    }

    /// Serve `responses.len()` requests, answering each with the given status line and body
    async fn serve(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            requests
        });

        (url, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buffer = [0u8; 1024];
        loop {
            let read = socket.read(&mut buffer).await.unwrap();
            if read == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..read]);

            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    #[test]
    fn test_builder_limits() {
        let target = HttpTarget::new("http://localhost/hook")
            .with_retry_count(42)
            .with_timeout_seconds(0);
        assert_eq!(target.retry_count(), 10);
        assert_eq!(target.timeout_seconds(), 1);
        assert_eq!(target.url(), "http://localhost/hook");
    }

    #[tokio::test]
    async fn test_successful_post_returns_body() {
        let (url, server) = serve(vec![("200 OK", r#"{"accepted":true}"#)]).await;
        let target = HttpTarget::new(url)
            .with_client(local_client())
            .with_auth_token("secret");

        let result = target.dispatch(&context()).await.unwrap();
        assert_eq!(result, json!({ "accepted": true }));

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /hook"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer secret"));
        assert!(requests[0].contains("\"handler_id\":\"webhook\""));
    }

    #[tokio::test]
    async fn test_retries_then_reports_rejection() {
        let (url, server) = serve(vec![
            ("503 Service Unavailable", "{}"),
            ("503 Service Unavailable", "{}"),
        ])
        .await;
        let target = HttpTarget::new(url)
            .with_client(local_client())
            .with_retry_count(1);

        let err = target.dispatch(&context()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 503 }));

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].contains("\"retry_attempt\":2"));
    }
}
