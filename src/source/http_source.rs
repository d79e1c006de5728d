use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use super::traits::{MediaBody, MediaSource};

/// Plain HTTP(S) transport for public or signed storage URLs.
pub struct HttpSource {
    client: Client,
    headers: Arc<RwLock<HashMap<String, String>>>,
}

impl HttpSource {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self::with_client(Client::new(), headers)
    }

    pub fn with_client(client: Client, headers: HashMap<String, String>) -> Self {
        Self {
            client,
            headers: Arc::new(RwLock::new(headers)),
        }
    }

    /// Replace the headers sent with every request (e.g. after token refresh).
    pub fn update_headers(&self, new_headers: HashMap<String, String>) {
        *self.headers.write() = new_headers;
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

struct HttpBody {
    resp: Response,
}

#[async_trait]
impl MediaBody for HttpBody {
    fn content_length(&self) -> Option<u64> {
        self.resp.content_length()
    }

    async fn chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.resp.chunk().await?)
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn open(&self, url: &str) -> Result<Box<dyn MediaBody>> {
        let parsed = Url::parse(url).map_err(|e| anyhow!("invalid media url {}: {}", url, e))?;

        let headers = self.headers.read().clone();
        let mut req = self.client.get(parsed);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let resp = req.send().await?;
        let status = resp.status();
        debug!("http open status={} url={}", status.as_u16(), url);
        if !status.is_success() {
            warn!("http open failed status={} url={}", status.as_u16(), url);
            return Err(anyhow!("download failed: HTTP {}", status.as_u16()));
        }

        Ok(Box::new(HttpBody { resp }))
    }
}
