//! Boot image download.

use crate::error::{DriverError, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// File name of the boot image inside a machine store.
pub const ISO_FILENAME: &str = "boot2docker.iso";

/// Download `url` to `dest` unless `dest` already exists.
///
/// Returns `true` if a download happened. The body is streamed to a sibling
/// `.part` file and renamed into place, so an interrupted download never
/// leaves a truncated image behind.
pub async fn ensure_boot_media(dest: &Path, url: &str) -> Result<bool> {
    if tokio::fs::try_exists(dest).await? {
        tracing::debug!(path = %dest.display(), "Boot image already present");
        return Ok(false);
    }

    tracing::info!(%url, path = %dest.display(), "Downloading boot image");
    let start = std::time::Instant::now();
    let download_err = |source| DriverError::Download {
        url: url.to_string(),
        source,
    };

    let mut response = reqwest::get(url)
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(download_err)?;

    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(download_err)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, dest).await?;

    tracing::info!(
        path = %dest.display(),
        bytes = written,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Boot image downloaded"
    );
    Ok(true)
}
