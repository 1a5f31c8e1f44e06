// Streaming asset retrieval — one GET, chunked body, per-chunk progress events.

use bytes::{Bytes, BytesMut};
use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Progress of an in-flight download. `total` is absent when the response
/// carried no Content-Length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

pub struct StreamingDownloader {
    client: Client,
}

impl StreamingDownloader {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Fetch `url`, emitting progress into `progress_tx`.
    ///
    /// With a Content-Length header the sequence starts at `loaded == 0`,
    /// grows by one event per received chunk in receipt order, and ends with
    /// `loaded == total`. Without the header exactly one terminal event is
    /// emitted after the body is drained. Event delivery never blocks byte
    /// accumulation.
    pub async fn fetch(
        &self,
        url: &str,
        progress_tx: &UnboundedSender<DownloadProgress>,
    ) -> Result<Bytes> {
        let mut resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            warn!("asset fetch failed status={} url={}", status.as_u16(), url);
            return Err(PipelineError::Network(status.as_u16()));
        }

        let total = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut body = BytesMut::with_capacity(total.unwrap_or(0) as usize);
        let mut loaded = 0u64;

        if total.is_some() {
            let _ = progress_tx.send(DownloadProgress { loaded: 0, total });
        }

        while let Some(chunk) = resp.chunk().await? {
            loaded += chunk.len() as u64;
            body.extend_from_slice(&chunk);
            if total.is_some() {
                let _ = progress_tx.send(DownloadProgress { loaded, total });
            }
        }

        if total.is_none() {
            let _ = progress_tx.send(DownloadProgress {
                loaded,
                total: None,
            });
        }

        debug!("downloaded {} bytes from {}", loaded, url);
        Ok(body.freeze())
    }
}

impl Default for StreamingDownloader {
    fn default() -> Self {
        Self::new()
    }
}
