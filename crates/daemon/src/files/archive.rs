//! On-the-fly ZIP archives of directory subtrees.
//!
//! [`DirectoryArchiver::zip_directory`] validates the directory, then starts a
//! producer thread that walks it depth-first and writes ZIP records into a
//! bounded [`pipe`]. The caller gets the read end as an [`ArchiveStream`] and
//! consumes it at its own pace; nothing is buffered beyond the pipe.
//!
//! A walk failure reaches the consumer as a read error. Dropping the stream
//! makes the producer's next write fail, which ends the walk.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::Stream;
use walkdir::WalkDir;

use super::browser::{file_mode, ARCHIVE_SUFFIX};
use super::error::FileError;
use super::path::{RelativePath, Root};
use super::pipe::{pipe, PipeReader, PipeWriter, DEFAULT_CAPACITY};
use super::zip_stream::ZipStreamWriter;

/// Name of the producer threads.
const PRODUCER_THREAD_NAME: &str = "archive-walk";

/// What a finished walk wrote into the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// File entries written.
    pub files: usize,
    /// Directory entries written.
    pub directories: usize,
    /// Uncompressed bytes read from files.
    pub bytes_read: u64,
}

/// Read-once stream of a ZIP archive being produced concurrently.
#[derive(Debug)]
pub struct ArchiveStream {
    name: String,
    reader: PipeReader,
    producer: ArchiveProducer,
}

impl ArchiveStream {
    /// Run `produce` on a dedicated thread, writing into a pipe of `capacity`
    /// chunks. Exactly one of close or fail is called on the write end.
    pub(crate) fn spawn<F>(name: String, capacity: usize, produce: F) -> io::Result<Self>
    where
        F: FnOnce(&mut PipeWriter) -> io::Result<ArchiveSummary> + Send + 'static,
    {
        let (mut writer, reader) = pipe(capacity);

        let handle = thread::Builder::new()
            .name(PRODUCER_THREAD_NAME.to_string())
            .spawn(move || match produce(&mut writer) {
                Ok(summary) => {
                    writer.close()?;
                    Ok(summary)
                }
                Err(e) => {
                    writer.fail(io::Error::new(e.kind(), e.to_string()));
                    Err(e)
                }
            })?;

        Ok(Self {
            name,
            reader,
            producer: ArchiveProducer { handle },
        })
    }

    /// Suggested file name, e.g. `photos.zip`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split into the byte stream and a handle on the producer.
    pub fn into_parts(self) -> (PipeReader, ArchiveProducer) {
        (self.reader, self.producer)
    }

    /// Convert into an async stream, detaching the producer.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        self.reader.into_stream()
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Handle on the thread producing an [`ArchiveStream`].
#[derive(Debug)]
pub struct ArchiveProducer {
    handle: JoinHandle<io::Result<ArchiveSummary>>,
}

impl ArchiveProducer {
    /// Wait for the walk to end and report how it went.
    ///
    /// A consumer that went away shows up as [`io::ErrorKind::BrokenPipe`].
    pub fn join(self) -> io::Result<ArchiveSummary> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "archive producer panicked")))
    }

    /// Whether the walk has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Produces ZIP archives of directories below the root.
#[derive(Debug, Clone)]
pub struct DirectoryArchiver {
    root: Root,
    capacity: usize,
}

impl DirectoryArchiver {
    /// Create an archiver with the default pipe capacity.
    pub fn new(root: Root) -> Self {
        Self {
            root,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Set how many chunks may be buffered between walk and consumer.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Start streaming the directory at `path` as a ZIP archive.
    ///
    /// The directory itself is not an entry; everything below it is, named
    /// relative to it with `/` separators. Fails before any byte is produced
    /// if the path is missing or not a directory.
    pub fn zip_directory(&self, path: &RelativePath) -> Result<ArchiveStream, FileError> {
        let dir = self.root.resolve(path);
        let metadata = fs::metadata(&dir).map_err(|e| FileError::from_io(e, &path.to_slash()))?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory(path.to_url()));
        }

        let name = format!("{}{ARCHIVE_SUFFIX}", self.base_name(path));
        let stream = ArchiveStream::spawn(name, self.capacity, move |out| write_archive(&dir, out))?;
        Ok(stream)
    }

    fn base_name(&self, path: &RelativePath) -> String {
        path.file_name()
            .map(str::to_string)
            .or_else(|| {
                self.root
                    .path()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "archive".to_string())
    }
}

/// Walk `dir` depth-first in name order and write every entry below it.
///
/// Symbolic links are not followed, and entries that are neither regular
/// files nor directories are left out.
pub fn write_archive<W: Write>(dir: &Path, out: W) -> io::Result<ArchiveSummary> {
    let mut zip = ZipStreamWriter::new(out);
    let mut summary = ArchiveSummary::default();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            continue;
        }

        let name = entry_name(dir, entry.path())?;
        let metadata = entry.metadata()?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let mode = file_mode(&metadata);

        if file_type.is_dir() {
            zip.add_directory(&name, modified, mode)?;
            summary.directories += 1;
        } else {
            let mut file = File::open(entry.path())?;
            summary.bytes_read += zip.add_file(&name, modified, mode, &mut file)?;
            summary.files += 1;
        }
    }

    zip.finish()?;
    Ok(summary)
}

/// Archive name of `path`: relative to `base`, `/`-separated.
fn entry_name(base: &Path, path: &Path) -> io::Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("walk left its base directory: {}", path.display()),
        )
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
