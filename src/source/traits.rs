use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Response body of a media download, consumed chunk by chunk.
#[async_trait]
pub trait MediaBody: Send {
    /// Total body size when the server announced one.
    fn content_length(&self) -> Option<u64>;

    /// Next chunk of the body, `None` once complete.
    async fn chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Transport that fetches remote media payloads.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Start a GET for `url`. Fails on non-success status.
    async fn open(&self, url: &str) -> Result<Box<dyn MediaBody>>;
}

/// Reports whether any network is reachable.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_connected(&self) -> bool;
}
