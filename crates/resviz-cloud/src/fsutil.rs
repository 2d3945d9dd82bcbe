//! File helpers shared by the cache, lock and report stores

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp file, removed on drop unless it was moved into place
///
/// Dropping covers both failed writes and writes cancelled between create
/// and rename.
struct TempFile {
    path: PathBuf,
    keep: bool,
}

impl TempFile {
    fn beside(target: &Path) -> Self {
        Self {
            path: temp_path_for(target),
            keep: false,
        }
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(&self.path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Write `bytes` to `path` so readers see either the old or the new content
///
/// The data goes to a sibling temp file first and is renamed into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }

    let mut tmp = TempFile::beside(path);
    tmp.write(bytes).await?;
    fs::rename(&tmp.path, path).await?;
    tmp.keep = true;
    Ok(())
}

/// Create `path` with `bytes` only if it does not exist yet
///
/// Fails with [`io::ErrorKind::AlreadyExists`] when another writer got there
/// first. The content is complete the moment the file appears.
pub(crate) async fn write_exclusive(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }

    let tmp = TempFile::beside(path);
    tmp.write(bytes).await?;
    fs::hard_link(&tmp.path, path).await
}

/// Remove `path` only while it still holds `expected`
///
/// The file is moved aside before comparing. If it turns out to be someone
/// else's, it is linked back unless yet another file has taken its place.
/// Returns whether the expected file was removed.
pub(crate) async fn remove_if_unchanged(path: &Path, expected: &[u8]) -> io::Result<bool> {
    let aside = TempFile::beside(path);
    match fs::rename(path, &aside.path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    if fs::read(&aside.path).await? == expected {
        return Ok(true);
    }
    match fs::hard_link(&aside.path, path).await {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
}

/// Whether a directory entry is an in-flight temp file
pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}

/// Encode a user-supplied key as a single path component
///
/// Distinct keys always map to distinct components. Everything outside
/// `[A-Za-z0-9-._~]` is percent-encoded, and the names `""`, `.` and `..`,
/// which percent-encoding leaves alone, get forms it never produces.
pub(crate) fn path_component(raw: &str) -> String {
    match raw {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(raw).into_owned(),
    }
}

/// List immediate subdirectories, treating a missing directory as empty
pub(crate) async fn list_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// List `*.json` files directly under `dir`, skipping temp files
pub(crate) async fn list_json_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && path.extension().is_some_and(|ext| ext == "json")
            && !is_temp_file(&path)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Remove temp files left directly under `dir` by interrupted writes
pub(crate) async fn sweep_temp_files(dir: &Path) -> io::Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && is_temp_file(&path)
            && remove_if_exists(&path).await?
        {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove a file, treating "already gone" as success
pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
