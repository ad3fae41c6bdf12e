//! Bulk acquisition of trade-flow archives.
//!
//! Transfers run on a bounded worker pool and retry a fixed number of times.
//! Archives are extracted only after they pass the minimum-size check, and a
//! multi-part archive only once every expected part is on disk.

use crate::utils::error::{RerouteError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Placeholder for the two-digit part number in multi-part source URLs.
pub const PART_PLACEHOLDER: &str = "{part}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSource {
    pub url: String,
    /// Number of byte-split segments; the URL must contain `{part}`.
    #[serde(default)]
    pub parts: Option<u32>,
}

impl ArchiveSource {
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            parts: None,
        }
    }

    pub fn multipart(url: impl Into<String>, parts: u32) -> Self {
        Self {
            url: url.into(),
            parts: Some(parts),
        }
    }

    /// Concrete part URLs in order.
    pub fn part_urls(&self) -> Vec<String> {
        match self.parts {
            Some(parts) => (1..=parts)
                .map(|n| self.url.replace(PART_PLACEHOLDER, &format!("{:02}", n)))
                .collect(),
            None => vec![self.url.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "DownloadSettings::default_download_dir")]
    pub download_dir: String,
    #[serde(default = "DownloadSettings::default_workers")]
    pub workers: usize,
    #[serde(default = "DownloadSettings::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "DownloadSettings::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "DownloadSettings::default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "DownloadSettings::default_min_size_bytes")]
    pub min_size_bytes: u64,
    #[serde(default)]
    pub sources: Vec<ArchiveSource>,
}

impl DownloadSettings {
    fn default_download_dir() -> String {
        "./archives".to_string()
    }

    fn default_workers() -> usize {
        5
    }

    fn default_retry_attempts() -> u32 {
        3
    }

    fn default_retry_delay_ms() -> u64 {
        5_000
    }

    fn default_timeout_seconds() -> u64 {
        300
    }

    fn default_min_size_bytes() -> u64 {
        1_048_576
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_dir: Self::default_download_dir(),
            workers: Self::default_workers(),
            retry_attempts: Self::default_retry_attempts(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            timeout_seconds: Self::default_timeout_seconds(),
            min_size_bytes: Self::default_min_size_bytes(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: Vec<PathBuf>,
    pub skipped_existing: Vec<PathBuf>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub archives_extracted: usize,
    pub archives_skipped: usize,
    pub files_written: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub download: DownloadReport,
    pub extract: ExtractReport,
}

enum TransferOutcome {
    Downloaded(PathBuf),
    Skipped(PathBuf),
    Failed(RerouteError),
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(settings: DownloadSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    fn download_dir(&self) -> &Path {
        Path::new(&self.settings.download_dir)
    }

    /// Downloads then extracts every configured source into `data_dir`.
    pub async fn acquire<P: AsRef<Path>>(&self, data_dir: P) -> Result<AcquisitionReport> {
        let download = self.download_all().await?;

        let downloader = self.clone();
        let data_dir = data_dir.as_ref().to_path_buf();
        let extract = tokio::task::spawn_blocking(move || downloader.extract_all(&data_dir))
            .await
            .map_err(|e| RerouteError::IoError(std::io::Error::other(e.to_string())))??;
        Ok(AcquisitionReport { download, extract })
    }

    /// Fetches every source part. Failures are collected, not returned.
    pub async fn download_all(&self) -> Result<DownloadReport> {
        tokio::fs::create_dir_all(self.download_dir()).await?;

        let permits = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();

        for source in &self.settings.sources {
            for url in source.part_urls() {
                let target = self.download_dir().join(file_name_for(&url));
                let client = self.client.clone();
                let settings = self.settings.clone();
                let permits = Arc::clone(&permits);
                tasks.spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return TransferOutcome::Failed(RerouteError::UpstreamFetch {
                            url,
                            attempts: 0,
                            message: "worker pool closed".to_string(),
                        });
                    };
                    transfer(&client, &settings, &url, target).await
                });
            }
        }

        let mut report = DownloadReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TransferOutcome::Downloaded(path)) => report.downloaded.push(path),
                Ok(TransferOutcome::Skipped(path)) => report.skipped_existing.push(path),
                Ok(TransferOutcome::Failed(e)) => {
                    tracing::error!("{}", e);
                    report.failed.push(e.to_string());
                }
                Err(e) => {
                    tracing::error!("Download task panicked: {}", e);
                    report.failed.push(e.to_string());
                }
            }
        }
        report.downloaded.sort();
        report.skipped_existing.sort();

        tracing::info!(
            "Downloads finished: {} new, {} already present, {} failed",
            report.downloaded.len(),
            report.skipped_existing.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Extracts every verified archive. Archives that fail verification are
    /// skipped with a warning and left on disk for the next run.
    ///
    /// Blocking; `acquire` runs it on the blocking pool.
    pub fn extract_all(&self, data_dir: &Path) -> Result<ExtractReport> {
        std::fs::create_dir_all(data_dir)?;
        let mut report = ExtractReport::default();

        for source in &self.settings.sources {
            let parts: Vec<PathBuf> = source
                .part_urls()
                .iter()
                .map(|url| self.download_dir().join(file_name_for(url)))
                .collect();

            let archive = match self.assemble(&parts) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.archives_skipped += 1;
                    continue;
                }
            };
            match extract_archive(&archive, data_dir) {
                Ok(written) => {
                    report.archives_extracted += 1;
                    report.files_written.extend(written);
                }
                Err(e) => {
                    tracing::warn!("Extraction of {} failed: {}", source.url, e);
                    report.archives_skipped += 1;
                }
            }
        }
        Ok(report)
    }

    /// Verifies and concatenates archive parts.
    ///
    /// Every part but the last must reach the minimum size; a single-part
    /// archive must reach it too.
    pub fn assemble(&self, parts: &[PathBuf]) -> Result<Vec<u8>> {
        let label = parts
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        for (index, part) in parts.iter().enumerate() {
            let metadata = match std::fs::metadata(part) {
                Ok(metadata) => metadata,
                Err(_) => {
                    return Err(RerouteError::IncompleteArchive {
                        path: label,
                        reason: format!("missing part {}", part.display()),
                    });
                }
            };
            let is_last = index + 1 == parts.len();
            if (!is_last || parts.len() == 1) && metadata.len() < self.settings.min_size_bytes {
                return Err(RerouteError::IncompleteArchive {
                    path: label,
                    reason: format!(
                        "{} is {} bytes, below the {} byte minimum",
                        part.display(),
                        metadata.len(),
                        self.settings.min_size_bytes
                    ),
                });
            }
        }

        let mut archive = Vec::new();
        for part in parts {
            std::fs::File::open(part)?.read_to_end(&mut archive)?;
        }
        Ok(archive)
    }
}

async fn transfer(
    client: &Client,
    settings: &DownloadSettings,
    url: &str,
    target: PathBuf,
) -> TransferOutcome {
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        tracing::info!("{} already exists; skipping download", target.display());
        return TransferOutcome::Skipped(target);
    }

    let attempts = settings.retry_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match fetch_to_file(client, url, &target).await {
            Ok(bytes) => {
                tracing::info!("Downloaded {} ({} bytes)", target.display(), bytes);
                return TransferOutcome::Downloaded(target);
            }
            Err(e) => {
                tracing::warn!(
                    "Download of {} failed (attempt {}/{}): {}",
                    url,
                    attempt,
                    attempts,
                    e
                );
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(settings.retry_delay_ms)).await;
                }
            }
        }
    }

    TransferOutcome::Failed(RerouteError::UpstreamFetch {
        url: url.to_string(),
        attempts,
        message: last_error,
    })
}

/// Streams the body to `<target>.partial` and renames it on completion.
async fn fetch_to_file(client: &Client, url: &str, target: &Path) -> Result<u64> {
    let mut response = client.get(url).send().await?.error_for_status()?;

    let partial = partial_path(target);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut written = 0u64;
    let streamed = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<_, RerouteError>(())
    }
    .await;
    drop(file);

    if let Err(e) = streamed {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    tokio::fs::rename(&partial, target).await?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Last path segment of a URL, without query string.
fn file_name_for(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Writes every file entry of a zip archive into `data_dir` as `<stem>.txt`.
pub fn extract_archive(archive: &[u8], data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut written = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(inner_path) = entry.enclosed_name() else {
            tracing::warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let Some(stem) = inner_path.file_stem() else {
            continue;
        };
        let mut file_name = stem.to_os_string();
        file_name.push(".txt");
        let target = data_dir.join(file_name);

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        std::fs::write(&target, contents)?;
        tracing::info!("Extracted {}", target.display());
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn settings(download_dir: &Path) -> DownloadSettings {
        DownloadSettings {
            download_dir: download_dir.to_str().unwrap().to_string(),
            retry_delay_ms: 10,
            timeout_seconds: 5,
            min_size_bytes: 16,
            ..DownloadSettings::default()
        }
    }

    #[test]
    fn test_part_urls_expand_placeholder() {
        let source = ArchiveSource::multipart(
            "https://example.com/importaciones-enero-2024.part{part}.zip",
            3,
        );
        assert_eq!(
            source.part_urls(),
            vec![
                "https://example.com/importaciones-enero-2024.part01.zip",
                "https://example.com/importaciones-enero-2024.part02.zip",
                "https://example.com/importaciones-enero-2024.part03.zip",
            ]
        );
        assert_eq!(
            ArchiveSource::single("https://example.com/a.zip")
                .part_urls()
                .len(),
            1
        );
    }

    #[test]
    fn test_file_name_for_strips_query() {
        assert_eq!(
            file_name_for("https://example.com/download/exportaciones-enero-2024.zip?x=1"),
            "exportaciones-enero-2024.zip"
        );
    }

    #[test]
    fn test_extract_archive_renames_entries_to_txt() {
        let temp_dir = TempDir::new().unwrap();
        let archive = zip_with(&[
            ("Exportaciones enero 2024.csv", "PTO_EMB;PTO_DESEM\n906;905\n"),
            ("nested/Importaciones enero 2024", "x;905;906\n"),
        ]);

        let written = extract_archive(&archive, temp_dir.path()).unwrap();

        assert_eq!(written.len(), 2);
        assert!(temp_dir.path().join("Exportaciones enero 2024.txt").exists());
        assert!(temp_dir.path().join("Importaciones enero 2024.txt").exists());
    }

    #[test]
    fn test_small_single_archive_is_not_extracted() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("tiny.zip"), b"PK").unwrap();
        let downloader = Downloader::new(settings(temp_dir.path())).unwrap();

        let result = downloader.assemble(&[temp_dir.path().join("tiny.zip")]);

        assert!(matches!(result, Err(RerouteError::IncompleteArchive { .. })));
    }

    #[test]
    fn test_multipart_waits_for_every_part() {
        let temp_dir = TempDir::new().unwrap();
        let archive = zip_with(&[("Exportaciones marzo 2024.csv", "PTO_EMB;PTO_DESEM\n906;905\n")]);
        let (first, second) = archive.split_at(archive.len() / 2);
        let part1 = temp_dir.path().join("x.part01.zip");
        let part2 = temp_dir.path().join("x.part02.zip");
        std::fs::write(&part1, first).unwrap();
        let downloader = Downloader::new(settings(temp_dir.path())).unwrap();

        let missing = downloader.assemble(&[part1.clone(), part2.clone()]);
        assert!(matches!(
            missing,
            Err(RerouteError::IncompleteArchive { ref reason, .. }) if reason.contains("missing part")
        ));

        std::fs::write(&part2, second).unwrap();
        let assembled = downloader.assemble(&[part1, part2]).unwrap();
        assert_eq!(assembled, archive);
    }
}
