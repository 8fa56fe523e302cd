//! Downloader port - URL からファイルへのダウンロード
//!
//! キャッシュもリトライもしません。毎回ダウンロードし直します。

use std::path::Path;

use async_trait::async_trait;

use crate::domain::PipelineError;

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url` into `dest`, overwriting it. Returns the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, PipelineError>;
}
