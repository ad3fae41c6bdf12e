use httpmock::prelude::*;
use port_reroute::adapters::downloader::{ArchiveSource, DownloadSettings, Downloader};
use port_reroute::core::Pipeline;
use port_reroute::domain::model::RankingBasis;
use port_reroute::{LocalStorage, PortCode, ReroutePipeline, RerouteRequest, TomlConfig};
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use zip::write::{SimpleFileOptions, ZipWriter};

fn exports_archive() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("Exportaciones enero 2024.csv", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"PTO_EMB;PTO_DESEM\n906;905\n906;921\n905;921\n")
        .unwrap();
    zip.finish().unwrap().into_inner()
}

fn settings(root: &Path, sources: Vec<ArchiveSource>) -> DownloadSettings {
    DownloadSettings {
        download_dir: root.join("archives").to_str().unwrap().to_string(),
        workers: 2,
        retry_attempts: 3,
        retry_delay_ms: 10,
        timeout_seconds: 5,
        min_size_bytes: 64,
        sources,
    }
}

#[tokio::test]
async fn test_acquire_downloads_and_extracts_archives() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let archive_mock = server.mock(|when, then| {
        when.method(GET).path("/exports-enero-2024.zip");
        then.status(200).body(exports_archive());
    });

    let downloader = Downloader::new(settings(
        temp_dir.path(),
        vec![ArchiveSource::single(server.url("/exports-enero-2024.zip"))],
    ))
    .unwrap();
    let data_dir = temp_dir.path().join("data");

    let report = downloader.acquire(&data_dir).await.unwrap();

    archive_mock.assert_hits(1);
    assert_eq!(report.download.downloaded.len(), 1);
    assert_eq!(report.extract.archives_extracted, 1);
    let extracted = data_dir.join("Exportaciones enero 2024.txt");
    assert!(extracted.exists());
    assert!(!temp_dir
        .path()
        .join("archives/exports-enero-2024.zip.partial")
        .exists());

    // A second run finds the archive on disk and does not fetch it again.
    let again = downloader.acquire(&data_dir).await.unwrap();
    archive_mock.assert_hits(1);
    assert_eq!(again.download.skipped_existing.len(), 1);
    assert!(again.download.downloaded.is_empty());
}

#[tokio::test]
async fn test_failed_transfer_is_retried_then_reported() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let failing_mock = server.mock(|when, then| {
        when.method(GET).path("/imports-enero-2024.zip");
        then.status(500);
    });
    let good_mock = server.mock(|when, then| {
        when.method(GET).path("/exports-enero-2024.zip");
        then.status(200).body(exports_archive());
    });

    let downloader = Downloader::new(settings(
        temp_dir.path(),
        vec![
            ArchiveSource::single(server.url("/imports-enero-2024.zip")),
            ArchiveSource::single(server.url("/exports-enero-2024.zip")),
        ],
    ))
    .unwrap();

    let report = downloader.download_all().await.unwrap();

    failing_mock.assert_hits(3);
    good_mock.assert_hits(1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.downloaded.len(), 1);
    assert!(!temp_dir
        .path()
        .join("archives/imports-enero-2024.zip")
        .exists());
}

const SLOW_RESPONSE: Duration = Duration::from_millis(300);
const SLOW_SOURCES: usize = 4;

/// Downloads four sources that each take `SLOW_RESPONSE` to answer.
async fn timed_download(workers: usize) -> Duration {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let slow_mock = server.mock(|when, then| {
        when.method(GET).path_contains("/slow-");
        then.status(200).body(exports_archive()).delay(SLOW_RESPONSE);
    });

    let sources = (0..SLOW_SOURCES)
        .map(|n| ArchiveSource::single(server.url(format!("/slow-{}.zip", n))))
        .collect();
    let downloader = Downloader::new(DownloadSettings {
        workers,
        ..settings(temp_dir.path(), sources)
    })
    .unwrap();

    let started = Instant::now();
    let report = downloader.download_all().await.unwrap();
    let elapsed = started.elapsed();

    slow_mock.assert_hits(SLOW_SOURCES);
    assert_eq!(report.downloaded.len(), SLOW_SOURCES);
    elapsed
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrent_transfers() {
    let sequential = SLOW_RESPONSE * SLOW_SOURCES as u32;

    // One worker serialises every transfer.
    let one_worker = timed_download(1).await;
    assert!(one_worker >= sequential, "took {:?}", one_worker);

    // Two workers need two rounds.
    let two_workers = timed_download(2).await;
    assert!(two_workers >= SLOW_RESPONSE * 2, "took {:?}", two_workers);
    assert!(two_workers < sequential, "took {:?}", two_workers);

    // A worker per source overlaps them all.
    let all_workers = timed_download(SLOW_SOURCES).await;
    assert!(all_workers < SLOW_RESPONSE * 2, "took {:?}", all_workers);
}

#[tokio::test]
async fn test_multipart_archive_waits_for_missing_part() {
    let temp_dir = TempDir::new().unwrap();
    let archive = exports_archive();
    let (first, second) = archive.split_at(archive.len() - 10);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/exports-enero-2024.part01.zip");
        then.status(200).body(first.to_vec());
    });
    let missing_part = server.mock(|when, then| {
        when.method(GET).path("/exports-enero-2024.part02.zip");
        then.status(404);
    });

    let source = ArchiveSource::multipart(server.url("/exports-enero-2024.part{part}.zip"), 2);
    let downloader = Downloader::new(settings(temp_dir.path(), vec![source])).unwrap();
    let data_dir = temp_dir.path().join("data");

    let report = downloader.acquire(&data_dir).await.unwrap();
    missing_part.assert_hits(3);
    assert_eq!(report.extract.archives_extracted, 0);
    assert_eq!(report.extract.archives_skipped, 1);
    assert!(!data_dir.join("Exportaciones enero 2024.txt").exists());

    // Once the last part lands on disk the archive is joined and extracted.
    std::fs::write(
        temp_dir.path().join("archives/exports-enero-2024.part02.zip"),
        second,
    )
    .unwrap();
    let extract = downloader.extract_all(&data_dir).unwrap();
    assert_eq!(extract.archives_extracted, 1);
    assert!(data_dir.join("Exportaciones enero 2024.txt").exists());
}

#[tokio::test]
async fn test_reroute_with_download_requested() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/exports-enero-2024.zip");
        then.status(200).body(exports_archive());
    });

    let toml = format!(
        r#"
[paths]
data_dir = "{data}"
directory = "{directory}"
output_path = "{output}"

[download]
download_dir = "{archives}"
min_size_bytes = 64
retry_delay_ms = 10
sources = [{{ url = "{url}" }}]
"#,
        data = temp_dir.path().join("data").display(),
        directory = temp_dir.path().join("ports.csv").display(),
        output = temp_dir.path().join("output").display(),
        archives = temp_dir.path().join("archives").display(),
        url = server.url("/exports-enero-2024.zip"),
    );
    let mut config = TomlConfig::from_toml_str(&toml).unwrap();
    config.download_requested = true;

    let storage = LocalStorage::new(config.paths.output_path.clone());
    let pipeline = ReroutePipeline::new(
        storage,
        config,
        RerouteRequest {
            origin: PortCode::new(906),
            disrupted: PortCode::new(905),
        },
    );

    let batch = pipeline.extract().await.unwrap();
    assert_eq!(batch.summary.flows, 3);
    let report = pipeline.transform(batch).await.unwrap();

    assert_eq!(report.ranking.basis, RankingBasis::DirectNeighbors);
    assert_eq!(report.ranking.codes(), vec![PortCode::new(921)]);
}
