//! HTTP attachment downloader.

use async_trait::async_trait;
use relaybot_core::channel::AttachmentFetcher;
use tracing::{debug, warn};

/// Default download cap: four bytes for each of the 30 000 characters an
/// encoded block may hold.
pub const DEFAULT_MAX_BYTES: usize = 30_000 * 4;

/// Fetches attachment bodies with a plain GET, reading at most
/// `max_bytes` of each body.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Cap the bytes read per attachment. Anything past the cap would be
    /// truncated away by the encoder anyway.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Cap sized for an encoded block of `char_budget` characters.
    pub fn for_char_budget(char_budget: usize) -> Self {
        Self::default().with_max_bytes(char_budget.saturating_mul(4))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl AttachmentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let mut response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %url, error = %e, "Attachment download failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(url = %url, status = response.status().as_u16(), "Attachment download rejected");
            return None;
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_bytes - body.len();
                    if chunk.len() >= room {
                        body.extend_from_slice(&chunk[..room]);
                        debug!(url = %url, max_bytes = self.max_bytes, "Attachment capped");
                        break;
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(url = %url, error = %e, "Attachment body read failed");
                    return None;
                }
            }
        }

        debug!(url = %url, bytes = body.len(), "Attachment downloaded");
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `body` once over a bare HTTP/1.1 connection.
    async fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            // The client may hang up once it has read enough.
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        });
        format!("http://{addr}/log.txt")
    }

    #[tokio::test]
    async fn small_body_is_read_whole() {
        let url = serve_once(b"E: disk full".to_vec()).await;
        let fetched = HttpFetcher::default().fetch(&url).await.unwrap();
        assert_eq!(fetched, b"E: disk full");
    }

    #[tokio::test]
    async fn large_body_is_capped() {
        let url = serve_once(vec![b'x'; 200_000]).await;
        let fetched = HttpFetcher::default().with_max_bytes(1_000).fetch(&url).await.unwrap();
        assert_eq!(fetched.len(), 1_000);
    }

    #[test]
    fn cap_follows_char_budget() {
        assert_eq!(HttpFetcher::for_char_budget(10).max_bytes, 40);
        assert_eq!(HttpFetcher::default().max_bytes, DEFAULT_MAX_BYTES);
    }

    #[tokio::test]
    async fn unreachable_host_yields_none() {
        let fetcher = HttpFetcher::default();
        assert!(fetcher.fetch("http://127.0.0.1:1/missing.txt").await.is_none());
    }

    #[tokio::test]
    async fn invalid_url_yields_none() {
        let fetcher = HttpFetcher::default();
        assert!(fetcher.fetch("not a url").await.is_none());
    }
}
