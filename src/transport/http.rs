//! HTTP(S) transport on reqwest

use super::{TransferRequest, TransferResponse, Transport};
use crate::config::TransferConfig;
use crate::error::TransferError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use std::time::Duration;

/// [`Transport`] for `http` and `https` URLs
///
/// Resumes with a `Range` request and reports whether the server honoured it.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from the transfer settings
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransferError::Connect(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            read_timeout: config.read_timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &TransferRequest) -> Result<TransferResponse, TransferError> {
        let url = url::Url::parse(&request.url)
            .map_err(|e| TransferError::InvalidUrl(format!("{}: {}", request.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransferError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                request.url
            )));
        }

        let mut builder = self.client.get(url);
        if request.offset > 0 {
            builder = builder.header(RANGE, format!("bytes={}-", request.offset));
        }

        let response = tokio::time::timeout(self.read_timeout, builder.send())
            .await
            .map_err(|_| TransferError::Timeout(format!("no response from {}", request.url)))??;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Http {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let resumed = request.offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let total_len = if resumed {
            headers
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total)
                .or_else(|| content_length.map(|len| len + request.offset))
        } else {
            content_length
        };
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            offset = request.offset,
            resumed,
            ?total_len,
            "transfer opened"
        );

        let read_timeout = self.read_timeout;
        let body = futures::stream::unfold(Some(response), move |state| async move {
            let mut response = state?;
            match tokio::time::timeout(read_timeout, response.chunk()).await {
                Ok(Ok(Some(chunk))) => Some((Ok(chunk.to_vec()), Some(response))),
                Ok(Ok(None)) => None,
                Ok(Err(e)) => Some((Err(TransferError::from(e)), None)),
                Err(_) => Some((
                    Err(TransferError::Timeout(format!(
                        "no data for {} seconds",
                        read_timeout.as_secs()
                    ))),
                    None,
                )),
            }
        })
        .boxed();

        Ok(TransferResponse {
            total_len,
            mime_type,
            resumed,
            body,
        })
    }
}

/// Total length from a `Content-Range: bytes a-b/total` header
fn parse_content_range_total(value: &str) -> Option<u64> {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}
