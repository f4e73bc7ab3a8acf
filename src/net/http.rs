//! reqwest-backed transport
//!
//! On wasm32 reqwest rides on the browser fetch API; natively it needs a
//! tokio runtime on the calling thread.

use async_trait::async_trait;

use super::authority::{Method, Reply, Transport};
use crate::error::Unreachable;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Absolute API root, e.g. `http://localhost:8080/api/v1`
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait(?Send)]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Reply, Unreachable> {
        let url = self.url(path);
        let builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        let builder = match body {
            Some(json) => builder.json(&json),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Unreachable::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Unreachable::Transport(e.to_string()))?;

        Ok(Reply { status, body })
    }
}
