use crate::common::artifacts::format_kb;
use crate::config::parse_source_url;
use crate::error::{IngestError, Result};
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    /// Content-Length of the response, when the server sent one.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some((self.downloaded_bytes as f64 / total as f64) * 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    AlreadyPresent { path: PathBuf, size_bytes: u64 },
    Downloaded { path: PathBuf, size_bytes: u64 },
}

impl AcquireOutcome {
    pub fn path(&self) -> &Path {
        match self {
            AcquireOutcome::AlreadyPresent { path, .. } | AcquireOutcome::Downloaded { path, .. } => {
                path
            }
        }
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            AcquireOutcome::AlreadyPresent { size_bytes, .. }
            | AcquireOutcome::Downloaded { size_bytes, .. } => *size_bytes,
        }
    }

    pub fn was_downloaded(&self) -> bool {
        matches!(self, AcquireOutcome::Downloaded { .. })
    }
}

/// Downloads a remote file unless it is already on disk.
pub struct FileAcquirer {
    timeout: Duration,
    user_agent: String,
    progress_callback: Option<Box<dyn Fn(DownloadProgress) + Send + Sync>>,
}

impl FileAcquirer {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 minutes default
            user_agent: format!("dataingest/{}", env!("CARGO_PKG_VERSION")),
            progress_callback: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Fetches `url` into `destination` if nothing is there yet.
    ///
    /// On failure a partially written file is left in place.
    pub async fn ensure_downloaded(&self, url: &str, destination: &Path) -> Result<AcquireOutcome> {
        if let Ok(metadata) = tokio::fs::metadata(destination).await {
            if metadata.is_dir() {
                return Err(IngestError::InvalidPath {
                    path: format!(
                        "Download destination is a directory: {}",
                        destination.display()
                    ),
                });
            }

            info!(
                path = %destination.display(),
                size = %format_kb(metadata.len()),
                "file already exists, skipping download"
            );
            return Ok(AcquireOutcome::AlreadyPresent {
                path: destination.to_path_buf(),
                size_bytes: metadata.len(),
            });
        }

        let url = parse_source_url(url)?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestError::file_access(parent, e))?;
        }

        let size_bytes = self.fetch(url.as_str(), destination).await.map_err(|e| {
            warn!(url = %url, path = %destination.display(), error = %e, "download failed");
            e
        })?;

        info!(
            path = %destination.display(),
            size = %format_kb(size_bytes),
            "downloaded file"
        );

        Ok(AcquireOutcome::Downloaded {
            path: destination.to_path_buf(),
            size_bytes,
        })
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| IngestError::Network {
                message: e.to_string(),
            })?;

        debug!(url, "sending request");
        let response = client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|e| self.handle_request_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut file = File::create(destination)
            .await
            .map_err(|e| IngestError::file_access(destination, e))?;

        let mut downloaded_bytes = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.handle_request_error(e, url))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| IngestError::file_access(destination, e))?;

            downloaded_bytes += chunk.len() as u64;

            if let Some(ref callback) = self.progress_callback {
                callback(DownloadProgress {
                    downloaded_bytes,
                    total_bytes,
                });
            }
        }

        file.flush()
            .await
            .map_err(|e| IngestError::file_access(destination, e))?;

        Ok(downloaded_bytes)
    }

    fn handle_request_error(&self, error: reqwest::Error, url: &str) -> IngestError {
        if error.is_timeout() {
            IngestError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            IngestError::Network {
                message: format!("{} ({})", error, url),
            }
        }
    }
}

impl Default for FileAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves `body` with `status` to every connection and counts requests.
    async fn serve(status: &'static str, body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/data.zip", addr), hits)
    }

    #[tokio::test]
    async fn test_download_writes_bytes_verbatim() {
        let body: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let (url, hits) = serve("200 OK", body.clone()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("data.zip");

        let outcome = FileAcquirer::new()
            .ensure_downloaded(&url, &dest)
            .await
            .unwrap();

        assert!(outcome.was_downloaded());
        assert_eq!(outcome.size_bytes(), body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_call_makes_no_request() {
        let (url, hits) = serve("200 OK", b"archive bytes".to_vec()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.zip");
        let acquirer = FileAcquirer::new();

        let first = acquirer.ensure_downloaded(&url, &dest).await.unwrap();
        let second = acquirer.ensure_downloaded(&url, &dest).await.unwrap();

        assert!(first.was_downloaded());
        assert_eq!(
            second,
            AcquireOutcome::AlreadyPresent {
                path: dest.clone(),
                size_bytes: 13,
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_file_skips_network_entirely() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.7z");
        std::fs::write(&dest, b"cached").unwrap();

        // Port 9 (discard) is never contacted because the file exists.
        let outcome = FileAcquirer::new()
            .ensure_downloaded("http://127.0.0.1:9/data.7z", &dest)
            .await
            .unwrap();

        assert!(!outcome.was_downloaded());
        assert_eq!(std::fs::read(&dest).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, _) = serve("404 Not Found", b"missing".to_vec()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.zip");

        let err = FileAcquirer::new()
            .ensure_downloaded(&url, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.zip");

        for url in ["not-a-url", "ftp://example.com/data.zip"] {
            let err = FileAcquirer::new()
                .ensure_downloaded(url, &dest)
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::InvalidUrl { .. }), "{}", url);
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_directory_destination_rejected() {
        let dir = TempDir::new().unwrap();
        let err = FileAcquirer::new()
            .ensure_downloaded("http://127.0.0.1:9/data.zip", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.zip");

        let err = FileAcquirer::new()
            .with_timeout(Duration::from_secs(5))
            .ensure_downloaded(&format!("http://127.0.0.1:{}/data.zip", port), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Network { .. }));
    }

    #[tokio::test]
    async fn test_stalled_body_times_out_and_keeps_partial_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                .await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.zip");

        let err = FileAcquirer::new()
            .with_timeout(Duration::from_secs(1))
            .ensure_downloaded(&format!("http://{}/data.zip", addr), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Timeout { seconds: 1 }), "{:?}", err);
        assert!(dest.is_file());
        assert!(std::fs::metadata(&dest).unwrap().len() < 100);
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let body = vec![7u8; 4096];
        let (url, _) = serve("200 OK", body).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.zip");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        FileAcquirer::new()
            .with_progress(move |p| sink.lock().unwrap().push(p))
            .ensure_downloaded(&url, &dest)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let last = seen.last().copied().unwrap();
        assert_eq!(last.downloaded_bytes, 4096);
        assert_eq!(last.total_bytes, Some(4096));
        assert_eq!(last.percentage(), Some(100.0));
    }

    #[test]
    fn test_timeout_configuration() {
        let timeout = Duration::from_secs(600);
        let acquirer = FileAcquirer::new().with_timeout(timeout);
        assert_eq!(acquirer.timeout, timeout);
    }
}
