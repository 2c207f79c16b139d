//! Size-based rotation for the sync log file.
//!
//! Rotates `sync.log` once it reaches 10 MiB and keeps at most 5 rotated
//! copies:
//!   sync.log → sync.log.1 → sync.log.2 → … → sync.log.5
//!
//! [`RotatingLog`] is the `tracing-subscriber` writer for the file layer; it
//! checks the size before every event and reopens the live file after a
//! rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size is at least `max_bytes`.
///
/// Rotation sequence (oldest first):
///   `<name>.<max_files>` deleted
///   `<name>.<n>` → `<name>.<n+1>` for n = max_files-1 … 1
///   `<name>` → `<name>.1`
///   Create fresh empty `<name>`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold (or did not exist yet).
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;

    OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Path of the `n`-th rotated copy of `base` (e.g. `sync.log.2`).
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("sync.log");
    base.with_file_name(format!("{name}.{n}"))
}

struct LiveFile {
    file: File,
    written: u64,
}

/// Append-only log file that rotates itself by size.
pub struct RotatingLog {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    live: Mutex<LiveFile>,
}

impl RotatingLog {
    /// Open (creating parent directories) with the default limits.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_limits(path, MAX_LOG_BYTES, MAX_ROTATED_FILES)
    }

    pub fn with_limits(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        max_files: usize,
    ) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(&path, max_bytes, max_files)?;
        let live = open_live(&path)?;
        Ok(Self {
            path,
            max_bytes,
            max_files,
            live: Mutex::new(live),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, LiveFile>> {
        self.live
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))
    }
}

fn open_live(path: &Path) -> io::Result<LiveFile> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let written = file.metadata()?.len();
    Ok(LiveFile { file, written })
}

/// Writer handed out per event by [`RotatingLog`].
pub struct RotatingLogWriter<'a> {
    log: &'a RotatingLog,
}

impl Write for RotatingLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut live = self.log.lock()?;
        if live.written >= self.log.max_bytes {
            live.file.flush()?;
            if rotate_if_needed(&self.log.path, self.log.max_bytes, self.log.max_files)? {
                *live = open_live(&self.log.path)?;
            }
        }
        let n = live.file.write(buf)?;
        live.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.log.lock()?.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingLog {
    type Writer = RotatingLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingLogWriter { log: self }
    }
}
