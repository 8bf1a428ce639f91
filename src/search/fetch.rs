//! Outbound HTTP for adapter requests
use crate::config::UpstreamConfig;
use crate::engines::{HttpMethod, OutboundRequest, RawResponse};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
}

/// Performs the network round trip for an adapter.
///
/// Implementations must not retry; the dispatch engine owns the timeout.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &OutboundRequest) -> Result<RawResponse, FetchError>;
}

/// `reqwest` backed fetcher shared by every adapter.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(upstream: &UpstreamConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(upstream.user_agent.clone())
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &OutboundRequest) -> Result<RawResponse, FetchError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url).query(&request.query),
            HttpMethod::Post => self.client.post(&request.url).form(&request.query),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(RawResponse {
            status: status.as_u16(),
            url,
            content_type,
            body,
        })
    }
}
