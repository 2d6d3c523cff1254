//! Request handlers.
//!
//! Repository calls block on the filesystem, so every one of them runs on
//! the blocking pool. Response bodies are streamed: single files through
//! the async file reader, archives straight from the producer thread.

use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::messages::{self, ErrorCode, FileListResponse, UploadResponse};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::error::{error_code, ApiError};
use super::AppState;
use crate::files::{
    pipe, ArchiveStream, ArchiveSummary, ContentStream, DirectoryEntry, FileError, FileRepository,
    RelativePath, UploadItem, UploadOutcome, ARCHIVE_SUFFIX,
};

/// How often a finished archive walk is checked for, to log its outcome.
const PRODUCER_POLL: Duration = Duration::from_millis(250);

/// `?path=` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: Option<String>,
}

impl PathQuery {
    fn relative(&self) -> String {
        self.path.as_deref().map(url_to_relative).unwrap_or_default()
    }
}

/// Drop the leading slash that URL paths carry; the repository rejects
/// absolute paths.
pub fn url_to_relative(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, FileError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ApiError::Internal(format!("blocking task failed: {err}")))?
        .map_err(ApiError::from)
}

/// `GET /api/files?path=`
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileListResponse>, ApiError> {
    let path = query.relative();
    let url = RelativePath::parse(&path)?.to_url();

    let repository = state.repository.clone();
    let entries = run_blocking(move || repository.list(&path)).await?;
    Ok(Json(listing(url, &entries)))
}

/// `GET /api/files/download?path=`
pub async fn download_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let path = query.relative();
    if path.trim_matches('/').is_empty() {
        return Err(ApiError::BadRequest("path is required".to_string()));
    }

    let repository = state.repository.clone();
    let stream = run_blocking(move || repository.serve_file(&path)).await?;
    Ok(file_response(stream))
}

/// `GET /`
pub async fn browse_root(State(state): State<AppState>) -> Result<Response, ApiError> {
    browse_path(state, String::new()).await
}

/// `GET /*path`
pub async fn browse(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    browse_path(state, url_to_relative(&path)).await
}

async fn browse_path(state: AppState, path: String) -> Result<Response, ApiError> {
    let repository = state.repository.clone();
    let target = run_blocking(move || open_target(&repository, &path)).await?;

    Ok(match target {
        Target::Listing(url, entries) => Json(listing(url, &entries)).into_response(),
        Target::File(stream) => file_response(stream),
        Target::Archive(archive) => archive_response(archive),
    })
}

enum Target {
    Listing(String, Vec<DirectoryEntry>),
    File(ContentStream),
    Archive(ArchiveStream),
}

/// Decide what a browse path names. `<dir>.zip` means an archive of `<dir>`
/// only when `<dir>` is a directory, so a real `x.zip` file stays reachable.
fn open_target(repository: &FileRepository, path: &str) -> Result<Target, FileError> {
    if let Some(dir) = path.strip_suffix(ARCHIVE_SUFFIX) {
        if matches!(repository.is_directory(dir), Ok(true)) {
            return repository.zip_directory(dir).map(Target::Archive);
        }
    }

    if repository.is_directory(path)? {
        let url = RelativePath::parse(path)?.to_url();
        return Ok(Target::Listing(url, repository.list(path)?));
    }
    repository.serve_file(path).map(Target::File)
}

fn listing(url: String, entries: &[DirectoryEntry]) -> FileListResponse {
    FileListResponse::new(url, entries.iter().map(DirectoryEntry::to_protocol).collect())
}

fn file_response(stream: ContentStream) -> Response {
    let disposition = attachment(stream.name());
    let length = HeaderValue::from(stream.len());
    let file = tokio::fs::File::from_std(stream.into_file());

    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, length),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

fn archive_response(archive: ArchiveStream) -> Response {
    let name = archive.name().to_string();
    let disposition = attachment(&name);
    let (reader, producer) = archive.into_parts();

    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(PRODUCER_POLL);
        while !producer.is_finished() {
            ticks.tick().await;
        }
        report_archive(&name, producer.join());
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(reader.into_stream()),
    )
        .into_response()
}

fn report_archive(name: &str, result: io::Result<ArchiveSummary>) {
    match result {
        Ok(summary) => info!(
            archive = %name,
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes_read,
            "archive sent"
        ),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
            debug!(archive = %name, "archive download abandoned by client")
        }
        Err(err) => warn!(archive = %name, error = %err, "archive failed mid-stream"),
    }
}

/// `Content-Disposition` for a download, with an RFC 5987 form for names
/// that are not plain ASCII.
pub fn attachment(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let value = if fallback == name {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            percent_encode(name)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// `POST /api/upload`
///
/// File fields are stored under the prefix given by `?path=` or by a
/// `path` text field sent before them. Each field is piped to the ingest
/// thread as it arrives; nothing is buffered whole in memory.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut prefix = query.relative();
    let (item_tx, item_rx) = mpsc::channel(1);

    let repository = state.repository.clone();
    let ingest = tokio::task::spawn_blocking(move || repository.upload(ItemFeed(item_rx)));

    let fed = feed_parts(&mut multipart, &mut prefix, &item_tx, state.pipe_capacity).await;
    drop(item_tx);

    let mut outcome = ingest
        .await
        .map_err(|err| ApiError::Internal(format!("upload task failed: {err}")))?;

    // The part in flight when the body broke off never decides the status.
    let mut cut_short = None;
    if let Err(err) = fed {
        if outcome.successes.is_empty() {
            return Err(ApiError::Multipart(err.source));
        }
        warn!(error = %err.source, "multipart body ended early");
        cut_short = err.item.map(|name| (name, err.source.body_text()));
    }

    for failure in &outcome.failures {
        warn!(name = %failure.name, error = %failure.error, "upload item failed");
    }
    info!(
        uploaded = outcome.successes.len(),
        failed = outcome.failures.len(),
        skipped = outcome.skipped,
        "upload batch finished"
    );

    if outcome.error().is_some() {
        let first = outcome.failures.swap_remove(0);
        return Err(first.error.into());
    }
    let mut response = upload_response(outcome);
    if let Some((name, reason)) = cut_short {
        if let Some(failure) = response.failed.iter_mut().rev().find(|f| f.name == name) {
            failure.code = ErrorCode::InvalidRequest;
            failure.message = reason;
        }
    }
    Ok(Json(response))
}

/// A multipart body that broke off, with the file part it interrupted.
struct CutShort {
    item: Option<String>,
    source: MultipartError,
}

impl From<MultipartError> for CutShort {
    fn from(source: MultipartError) -> Self {
        Self { item: None, source }
    }
}

/// Forward multipart file fields to the ingest thread, one pipe per field.
async fn feed_parts(
    multipart: &mut Multipart,
    prefix: &mut String,
    items: &mpsc::Sender<UploadItem>,
    capacity: usize,
) -> Result<(), CutShort> {
    while let Some(mut field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            if field.name() == Some("path") {
                *prefix = url_to_relative(&field.text().await?);
            }
            continue;
        };

        let name = upload_name(prefix, &file_name);
        let (mut writer, reader) = pipe(capacity);
        if items
            .send(UploadItem::new(name.clone(), reader))
            .await
            .is_err()
        {
            break;
        }

        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    // The ingest side dropped this item; skip the rest of it.
                    if writer.send(chunk).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    writer
                        .fail_async(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
                        .await;
                    return Err(CutShort {
                        item: Some(name),
                        source: err,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Target name for an uploaded file. Empty file names stay empty so the
/// repository counts them as skipped.
pub fn upload_name(prefix: &str, file_name: &str) -> String {
    if file_name.is_empty() {
        return String::new();
    }
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

struct ItemFeed(mpsc::Receiver<UploadItem>);

impl Iterator for ItemFeed {
    type Item = UploadItem;

    fn next(&mut self) -> Option<UploadItem> {
        self.0.blocking_recv()
    }
}

fn upload_response(outcome: UploadOutcome) -> UploadResponse {
    UploadResponse {
        uploaded: outcome
            .successes
            .into_iter()
            .map(|file| messages::UploadedFile {
                name: file.name,
                size: file.size,
            })
            .collect(),
        failed: outcome
            .failures
            .into_iter()
            .map(|failure| messages::UploadFailure {
                name: failure.name,
                code: error_code(&failure.error),
                message: failure.error.to_string(),
            })
            .collect(),
        skipped: outcome.skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{Root, UploadFailure, UploadedFile};
    use std::fs;
    use tempfile::TempDir;

    fn repository() -> (TempDir, FileRepository) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/readme.txt"), b"hello").unwrap();
        fs::write(dir.path().join("bundle.zip"), b"not really a zip").unwrap();
        let repository = FileRepository::new(Root::new(dir.path()).unwrap());
        (dir, repository)
    }

    #[test]
    fn test_url_to_relative() {
        assert_eq!(url_to_relative("/docs/a.txt"), "docs/a.txt");
        assert_eq!(url_to_relative("docs"), "docs");
        assert_eq!(url_to_relative("/"), "");
    }

    #[test]
    fn test_upload_name() {
        assert_eq!(upload_name("", "a.txt"), "a.txt");
        assert_eq!(upload_name("/docs/", "a.txt"), "docs/a.txt");
        assert_eq!(upload_name("docs", ""), "");
    }

    #[test]
    fn test_attachment_ascii() {
        assert_eq!(
            attachment("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn test_attachment_non_ascii() {
        let value = attachment("résumé \"v2\".txt");
        let value = value.to_str().unwrap();
        assert!(value.starts_with("attachment; filename=\"r_sum_ _v2_.txt\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22v2%22.txt"));
    }

    #[test]
    fn test_open_target_directory() {
        let (_dir, repository) = repository();
        match open_target(&repository, "docs").unwrap() {
            Target::Listing(url, entries) => {
                assert_eq!(url, "/docs");
                assert_eq!(entries.len(), 1);
            }
            _ => panic!("expected a listing"),
        }
    }

    #[test]
    fn test_open_target_archive_of_directory() {
        let (_dir, repository) = repository();
        match open_target(&repository, "docs.zip").unwrap() {
            Target::Archive(archive) => assert_eq!(archive.name(), "docs.zip"),
            _ => panic!("expected an archive"),
        }
    }

    #[test]
    fn test_open_target_real_zip_file() {
        let (_dir, repository) = repository();
        match open_target(&repository, "bundle.zip").unwrap() {
            Target::File(stream) => assert_eq!(stream.len(), 16),
            _ => panic!("expected the file itself"),
        }
    }

    #[test]
    fn test_open_target_missing() {
        let (_dir, repository) = repository();
        assert!(matches!(
            open_target(&repository, "nope.zip"),
            Err(FileError::NotFound(_))
        ));
        assert!(matches!(
            open_target(&repository, "../etc"),
            Err(FileError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_upload_response_mapping() {
        let outcome = UploadOutcome {
            successes: vec![UploadedFile {
                name: "a.txt".to_string(),
                size: 3,
            }],
            failures: vec![UploadFailure {
                name: "../b.txt".to_string(),
                error: FileError::InvalidPath {
                    path: "../b.txt".to_string(),
                    reason: "parent directory segment",
                },
            }],
            skipped: 1,
        };

        let response = upload_response(outcome);
        assert_eq!(response.uploaded.len(), 1);
        assert_eq!(response.uploaded[0].size, 3);
        assert_eq!(response.failed[0].code, ErrorCode::InvalidPath);
        assert_eq!(response.skipped, 1);
    }

    #[test]
    fn test_archive_response_leaves_blocking_pool_free() {
        let (dir, repository) = repository();
        // Incompressible content so the walk blocks on a one-chunk pipe.
        let mut state = 0x2545_f491_u32;
        let noise: Vec<u8> = (0..2 * 1024 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        fs::write(dir.path().join("docs/noise.bin"), noise).unwrap();
        let repository = repository.with_archive_capacity(1);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let archive = repository.zip_directory("docs").unwrap();
            let response = archive_response(archive);
            assert_eq!(response.status(), StatusCode::OK);

            let other = tokio::time::timeout(
                Duration::from_secs(5),
                tokio::task::spawn_blocking(|| 42),
            )
            .await
            .expect("blocking pool stayed busy")
            .unwrap();
            assert_eq!(other, 42);

            drop(response);
        });
    }
}
