//! Directory browsing below the shared root.
//!
//! Listings are produced fresh from the filesystem on every call. Each entry
//! carries the metadata a client needs to render it: a formatted size, the
//! browse URL and the URL that streams it as a ZIP archive.

use std::fs::{self, Metadata};
use std::io;
use std::time::SystemTime;

use protocol::messages::{FileEntry, FileEntryType};

use super::error::FileError;
use super::path::{RelativePath, Root};

/// Size column shown for directories.
pub const DIRECTORY_MARKER: &str = "[Directory]";

/// Suffix appended to a browse URL to request an archive.
pub const ARCHIVE_SUFFIX: &str = ".zip";

const SIZE_UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// A directory entry with metadata.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Root-relative path of the entry.
    pub path: RelativePath,
    /// Entry type.
    pub entry_type: FileEntryType,
    /// Size in bytes, `None` for directories.
    pub size: Option<u64>,
    /// Human-readable size, or [`DIRECTORY_MARKER`].
    pub display_size: String,
    /// Browse URL.
    pub url: String,
    /// Archive URL (browse URL plus [`ARCHIVE_SUFFIX`]).
    pub zip_url: String,
    /// Unix permissions mode.
    pub mode: u32,
    /// Last modified timestamp.
    pub modified: SystemTime,
}

impl DirectoryEntry {
    fn from_metadata(name: String, path: RelativePath, metadata: &Metadata) -> Self {
        let entry_type = entry_type(metadata);
        let is_dir = entry_type == FileEntryType::Directory;
        let size = (!is_dir).then(|| metadata.len());
        let url = path.to_url();

        Self {
            display_size: format_size(size.unwrap_or(0), is_dir),
            zip_url: format!("{url}{ARCHIVE_SUFFIX}"),
            url,
            name,
            path,
            entry_type,
            size,
            mode: file_mode(metadata),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.entry_type == FileEntryType::Directory
    }

    /// Convert to protocol FileEntry.
    pub fn to_protocol(&self) -> FileEntry {
        let modified = self
            .modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        FileEntry {
            name: self.name.clone(),
            entry_type: self.entry_type,
            size: self.size.unwrap_or(0),
            display_size: self.display_size.clone(),
            url: self.url.clone(),
            zip_url: self.zip_url.clone(),
            modified,
            mode: self.mode,
        }
    }
}

/// Format a byte count for display.
///
/// Below 1024 the exact count is printed (`"1023 B"`); above, one decimal
/// digit with a binary unit (`"1.0 KiB"`, `"1.5 MiB"`). Directories get
/// [`DIRECTORY_MARKER`].
pub fn format_size(bytes: u64, is_dir: bool) -> String {
    if is_dir {
        return DIRECTORY_MARKER.to_string();
    }

    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut divisor = UNIT;
    let mut exponent = 0;
    let mut remaining = bytes / UNIT;
    while remaining >= UNIT {
        divisor *= UNIT;
        exponent += 1;
        remaining /= UNIT;
    }

    format!(
        "{:.1} {}iB",
        bytes as f64 / divisor as f64,
        SIZE_UNITS[exponent]
    )
}

fn entry_type(metadata: &Metadata) -> FileEntryType {
    if metadata.is_dir() {
        FileEntryType::Directory
    } else if metadata.is_file() {
        FileEntryType::File
    } else {
        FileEntryType::Other
    }
}

/// Unix permission bits, or a conventional default elsewhere.
pub(crate) fn file_mode(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.mode()
    }
    #[cfg(not(unix))]
    {
        if metadata.is_dir() {
            0o40755
        } else {
            0o100644
        }
    }
}

/// Directory browser anchored at the shared root.
#[derive(Debug, Clone)]
pub struct DirectoryBrowser {
    root: Root,
}

impl DirectoryBrowser {
    /// Create a browser for the given root.
    pub fn new(root: Root) -> Self {
        Self { root }
    }

    /// List the immediate children of a directory.
    ///
    /// Entries come back in the order the operating system reports them.
    /// Entries that disappear between reading the directory and reading
    /// their metadata are skipped.
    pub fn list_directory(&self, path: &RelativePath) -> Result<Vec<DirectoryEntry>, FileError> {
        let dir = self.root.resolve(path);
        let rel = path.to_slash();

        let metadata = fs::metadata(&dir).map_err(|e| FileError::from_io(e, &rel))?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory(path.to_url()));
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| FileError::from_io(e, &rel))? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(FileError::Io(e)),
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let child = path.join(&name);
            results.push(DirectoryEntry::from_metadata(name, child, &metadata));
        }

        Ok(results)
    }

    /// Get metadata for a single path.
    pub fn get_entry(&self, path: &RelativePath) -> Result<DirectoryEntry, FileError> {
        let resolved = self.root.resolve(path);
        let metadata =
            fs::symlink_metadata(&resolved).map_err(|e| FileError::from_io(e, &path.to_slash()))?;

        let name = path.file_name().unwrap_or("/").to_string();
        Ok(DirectoryEntry::from_metadata(name, path.clone(), &metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_structure(dir: &std::path::Path) {
        fs::write(dir.join("a.txt"), "0123456789").unwrap();
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("sub/nested.txt"), "Nested").unwrap();
    }

    fn browser(temp_dir: &TempDir) -> DirectoryBrowser {
        DirectoryBrowser::new(Root::new(temp_dir.path()).unwrap())
    }

    fn find<'a>(entries: &'a [DirectoryEntry], name: &str) -> &'a DirectoryEntry {
        entries
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("{name} missing from listing"))
    }

    #[test]
    fn test_list_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = browser(&temp_dir)
            .list_directory(&RelativePath::root())
            .unwrap();
        assert_eq!(entries.len(), 2);

        let file = find(&entries, "a.txt");
        assert_eq!(file.entry_type, FileEntryType::File);
        assert_eq!(file.size, Some(10));
        assert_eq!(file.display_size, "10 B");

        let dir = find(&entries, "sub");
        assert!(dir.is_dir());
        assert_eq!(dir.size, None);
        assert_eq!(dir.display_size, DIRECTORY_MARKER);
    }

    #[test]
    fn test_urls_at_root() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = browser(&temp_dir)
            .list_directory(&RelativePath::root())
            .unwrap();

        let dir = find(&entries, "sub");
        assert_eq!(dir.url, "/sub");
        assert_eq!(dir.zip_url, "/sub.zip");
    }

    #[test]
    fn test_urls_nested() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let path = RelativePath::parse("sub").unwrap();
        let entries = browser(&temp_dir).list_directory(&path).unwrap();

        let file = find(&entries, "nested.txt");
        assert_eq!(file.url, "/sub/nested.txt");
        assert_eq!(file.zip_url, "/sub/nested.txt.zip");
        assert_eq!(file.path, RelativePath::parse("sub/nested.txt").unwrap());
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("empty")).unwrap();

        let path = RelativePath::parse("empty").unwrap();
        let entries = browser(&temp_dir).list_directory(&path).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_path_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let path = RelativePath::parse("nonexistent").unwrap();
        let result = browser(&temp_dir).list_directory(&path);
        assert!(matches!(result, Err(FileError::NotFound(_))));
    }

    #[test]
    fn test_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let path = RelativePath::parse("a.txt").unwrap();
        let result = browser(&temp_dir).list_directory(&path);
        assert!(matches!(result, Err(FileError::NotADirectory(_))));
    }

    #[test]
    fn test_get_entry() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file.txt"), "Hello World").unwrap();

        let path = RelativePath::parse("file.txt").unwrap();
        let entry = browser(&temp_dir).get_entry(&path).unwrap();

        assert_eq!(entry.name, "file.txt");
        assert_eq!(entry.entry_type, FileEntryType::File);
        assert_eq!(entry.size, Some(11));
    }

    #[test]
    fn test_get_entry_root() {
        let temp_dir = TempDir::new().unwrap();

        let entry = browser(&temp_dir).get_entry(&RelativePath::root()).unwrap();
        assert_eq!(entry.name, "/");
        assert!(entry.is_dir());
        assert_eq!(entry.url, "/");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_listed_as_other() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        std::os::unix::fs::symlink(temp_dir.path().join("sub"), temp_dir.path().join("link"))
            .unwrap();

        let entries = browser(&temp_dir)
            .list_directory(&RelativePath::root())
            .unwrap();
        assert_eq!(find(&entries, "link").entry_type, FileEntryType::Other);
    }

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0, false), "0 B");
        assert_eq!(format_size(10, false), "10 B");
        assert_eq!(format_size(1023, false), "1023 B");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(1024, false), "1.0 KiB");
        assert_eq!(format_size(1536, false), "1.5 KiB");
        assert_eq!(format_size(1024 * 1024, false), "1.0 MiB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024, false), "5.0 GiB");
        assert_eq!(format_size(1 << 40, false), "1.0 TiB");
        assert_eq!(format_size(u64::MAX, false), "16.0 EiB");
    }

    #[test]
    fn test_format_size_directory() {
        assert_eq!(format_size(4096, true), DIRECTORY_MARKER);
    }

    #[test]
    fn test_entry_to_protocol() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let path = RelativePath::parse("sub").unwrap();
        let entry = browser(&temp_dir).get_entry(&path).unwrap();
        let proto = entry.to_protocol();

        assert_eq!(proto.name, "sub");
        assert_eq!(proto.entry_type, FileEntryType::Directory);
        assert_eq!(proto.size, 0);
        assert_eq!(proto.display_size, DIRECTORY_MARKER);
        assert_eq!(proto.url, "/sub");
        assert_eq!(proto.zip_url, "/sub.zip");
        assert!(proto.modified > 0);
        assert_eq!(proto.mode, entry.mode);
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_mode_from_filesystem() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();

        let path = RelativePath::parse("run.sh").unwrap();
        let proto = browser(&temp_dir).get_entry(&path).unwrap().to_protocol();
        assert_eq!(proto.mode & 0o777, 0o750);
    }
}
