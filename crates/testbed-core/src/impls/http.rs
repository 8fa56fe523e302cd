//! `Downloader` backed by `reqwest`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::domain::{ErrorKind, PipelineError};
use crate::ports::Downloader;

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// `timeout` bounds the whole request; `None` leaves it to the CI host.
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("testbed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            client: builder.build().unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn failed(url: &str, reason: impl Into<String>) -> PipelineError {
        PipelineError::Download {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[instrument(name = "http_download", skip(self, dest), fields(dest = %dest.display()))]
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, PipelineError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::io(ErrorKind::Fetch, format!("creating {}", parent.display()), e)
            })?;
        }

        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::failed(url, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::failed(url, format!("status {}", resp.status())));
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            PipelineError::io(ErrorKind::Fetch, format!("creating {}", dest.display()), e)
        })?;
        let mut written = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Self::failed(url, format!("read body failed: {e}")))?
        {
            file.write_all(&chunk).await.map_err(|e| {
                PipelineError::io(ErrorKind::Fetch, format!("writing {}", dest.display()), e)
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            PipelineError::io(ErrorKind::Fetch, format!("writing {}", dest.display()), e)
        })?;

        info!(bytes = written, "download complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticHttpServer;

    #[tokio::test]
    async fn downloads_body_into_nested_path() {
        let server = StaticHttpServer::start(vec![("/data.bin", b"0123456789".to_vec())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/data.bin");

        let n = HttpDownloader::default()
            .download(&server.url("/data.bin"), &dest)
            .await
            .unwrap();

        assert_eq!(n, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn existing_file_is_overwritten() {
        let server = StaticHttpServer::start(vec![("/f", b"new".to_vec())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f");
        std::fs::write(&dest, b"old contents that are longer").unwrap();

        HttpDownloader::default()
            .download(&server.url("/f"), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[tokio::test]
    async fn missing_remote_file_is_a_download_error() {
        let server = StaticHttpServer::start(vec![]).await;
        let dir = tempfile::tempdir().unwrap();

        let err = HttpDownloader::default()
            .download(&server.url("/nope.zip"), &dir.path().join("nope.zip"))
            .await
            .unwrap_err();

        match err {
            PipelineError::Download { url, reason } => {
                assert!(url.ends_with("/nope.zip"));
                assert!(reason.contains("404"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        // port 9 on localhost is closed in test environments
        let err = HttpDownloader::new(Some(Duration::from_secs(5)))
            .download("http://127.0.0.1:9/x", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Download { .. }));
    }
}
