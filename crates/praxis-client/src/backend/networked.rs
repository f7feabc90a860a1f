use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use praxis_core::request::Method;
use reqwest::Url;
use tracing::debug;

use super::{ApiResponse, Backend, OutboundRequest, StreamResponse};
use crate::error::ClientError;
use crate::mode::BackendMode;

/// Forwards requests to the real API over HTTP.
///
/// No request timeout is set here: ordinary calls and token refresh rely on
/// the transport's own limits. Only connection setup is bounded.
#[derive(Debug, Clone)]
pub struct NetworkedBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl NetworkedBackend {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Config(format!("invalid API base URL {base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "API base URL must be http or https, got {}",
                base_url.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn build(&self, outbound: &OutboundRequest) -> Result<reqwest::RequestBuilder, ClientError> {
        let request = &outbound.request;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, self.url_for(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &outbound.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| ClientError::InvalidRequest(format!("failed to encode body: {e}")))?;
            builder = builder.body(bytes);
        }
        Ok(builder)
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

#[async_trait]
impl Backend for NetworkedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Networked
    }

    async fn execute(&self, outbound: &OutboundRequest) -> Result<ApiResponse, ClientError> {
        let request = &outbound.request;
        debug!(method = %request.method, path = %request.path, "sending request");

        let response = self.build(outbound)?.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?;

        debug!(method = %request.method, path = %request.path, status, "received response");
        Ok(ApiResponse::new(status, body))
    }

    async fn open_stream(&self, outbound: &OutboundRequest) -> Result<StreamResponse, ClientError> {
        let request = &outbound.request;
        debug!(method = %request.method, path = %request.path, "opening stream");

        let response = self
            .build(outbound)?
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();

        let chunks = response.bytes_stream().map(|chunk| chunk.map_err(transport)).boxed();
        Ok(StreamResponse { status, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_base_urls() {
        let timeout = Duration::from_secs(5);
        assert!(NetworkedBackend::new("not a url", timeout).is_err());
        assert!(NetworkedBackend::new("ftp://api.example.test", timeout).is_err());

        let backend = NetworkedBackend::new("https://api.example.test/v1/", timeout).unwrap();
        assert_eq!(backend.url_for("/clients"), "https://api.example.test/v1/clients");
    }
}
