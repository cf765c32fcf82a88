//! Byte transport consumed by the task worker
//!
//! The worker only sees a [`Transport`] that opens a resource at an offset and
//! yields its body as chunks. [`HttpTransport`] is the bundled implementation.

use crate::error::TransferError;
use async_trait::async_trait;
use futures::stream::BoxStream;

mod http;

pub use http::HttpTransport;

/// Stream of body chunks
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, TransferError>>;

/// What to fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source URL
    pub url: String,
    /// Byte offset to resume from (0 = from the start)
    pub offset: u64,
}

/// An opened transfer
pub struct TransferResponse {
    /// Full size of the resource, if the server reported it
    pub total_len: Option<u64>,
    /// MIME type without parameters, if reported
    pub mime_type: Option<String>,
    /// True when the body starts at the requested offset; false means the
    /// body starts at byte 0 and any partial file must be truncated
    pub resumed: bool,
    /// Body chunks
    pub body: ChunkStream,
}

impl std::fmt::Debug for TransferResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferResponse")
            .field("total_len", &self.total_len)
            .field("mime_type", &self.mime_type)
            .field("resumed", &self.resumed)
            .finish_non_exhaustive()
    }
}

/// Opens byte streams for download tasks
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open `request`
    ///
    /// Non-success responses fail with [`TransferError::Http`] carrying the status.
    async fn open(&self, request: &TransferRequest) -> Result<TransferResponse, TransferError>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
