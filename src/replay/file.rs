//! # Replay Log
//!
//! Locked, line-per-entry backing file for the replay queue. The in-memory
//! FIFO is the working copy; the file is appended to on every push and
//! rewritten from memory on compaction.

use super::entry::ReplayEntry;
use crate::error::{ReplayError, ReplayResult};
use fs2::FileExt;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusively locked replay file plus its pending lines.
pub struct ReplayLog {
    path: PathBuf,
    file: Option<File>,
    lines: VecDeque<String>,
    sync_writes: bool,
}

impl std::fmt::Debug for ReplayLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayLog")
            .field("path", &self.path)
            .field("pending", &self.lines.len())
            .field("open", &self.file.is_some())
            .finish()
    }
}

impl ReplayLog {
    /// Open or create the replay file, lock it, and load pending lines.
    ///
    /// Fails with [`ReplayError::Locked`] if another process holds the lock.
    pub fn open<P: AsRef<Path>>(path: P, sync_writes: bool) -> ReplayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| ReplayError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(ReplayError::Locked { path });
            }
            return Err(io_err(e));
        }

        let mut raw = Vec::new();
        (&file).read_to_end(&mut raw).map_err(io_err)?;

        let mut lines = VecDeque::new();
        for (number, line) in split_lines(&raw) {
            match line {
                Ok(text) => lines.push_back(text.to_string()),
                Err(_) => log::warn!(
                    "Dropping line {} of {}: not valid UTF-8",
                    number,
                    path.display()
                ),
            }
        }

        // A torn final write leaves no newline; terminate it so the next
        // append starts a line of its own.
        if raw.last().is_some_and(|b| *b != b'\n') {
            log::warn!("Replay log {} ends mid-line, terminating it", path.display());
            (&file)
                .seek(SeekFrom::End(0))
                .and_then(|_| (&file).write_all(b"\n"))
                .and_then(|_| file.sync_data())
                .map_err(io_err)?;
        }

        log::info!("Opened replay log {} with {} pending", path.display(), lines.len());

        Ok(Self {
            path,
            file: Some(file),
            lines,
            sync_writes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Oldest pending line.
    pub fn front(&self) -> Option<&str> {
        self.lines.front().map(String::as_str)
    }

    /// Pending lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Append a line to memory and durably to the file.
    pub fn push(&mut self, line: String) -> ReplayResult<()> {
        let file = self.file.as_mut().ok_or(ReplayError::Closed)?;
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let sync_writes = self.sync_writes;
        let result = file.seek(SeekFrom::End(0)).and_then(|start| {
            let written = file
                .write_all(&bytes)
                .and_then(|_| file.flush())
                .and_then(|_| if sync_writes { file.sync_data() } else { Ok(()) });
            if written.is_err() {
                // Cut off a partial line so it cannot fuse with the next push
                if let Err(e) = file.set_len(start) {
                    log::error!("Failed to roll back partial append: {}", e);
                }
            }
            written
        });

        result.map_err(|source| ReplayError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.lines.push_back(line);
        Ok(())
    }

    /// Remove the oldest line from memory. The file catches up on compaction.
    pub fn pop_front(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    /// Truncate the file and rewrite it from the in-memory lines.
    pub fn compact(&mut self) -> ReplayResult<()> {
        let file = self.file.as_mut().ok_or(ReplayError::Closed)?;
        let lines = &self.lines;

        let result = (|| -> io::Result<()> {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            let mut writer = BufWriter::new(&mut *file);
            for line in lines {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            drop(writer);
            file.sync_data()
        })();

        result.map_err(|source| ReplayError::Io {
            path: self.path.clone(),
            source,
        })?;

        log::debug!("Compacted {} to {} lines", self.path.display(), self.lines.len());
        Ok(())
    }

    /// Flush and release the lock. Pending lines stay on disk.
    pub fn close(&mut self) -> ReplayResult<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        let flushed = file.flush();
        let unlocked = file.unlock();
        drop(file);

        log::info!(
            "Closed replay log {} with {} pending",
            self.path.display(),
            self.lines.len()
        );

        flushed
            .and(unlocked)
            .map_err(|source| ReplayError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

impl Drop for ReplayLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close replay log: {}", e);
        }
    }
}

/// Non-blank lines of `raw` with their 1-based line numbers, trimmed.
/// Lines that are not UTF-8 come back as `Err` with their raw bytes.
fn split_lines(raw: &[u8]) -> impl Iterator<Item = (usize, Result<&str, &[u8]>)> {
    raw.split(|b| *b == b'\n')
        .enumerate()
        .filter_map(|(idx, bytes)| {
            let line = match std::str::from_utf8(bytes) {
                Ok(text) => Ok(text.trim()),
                Err(_) => Err(bytes),
            };
            match line {
                Ok("") => None,
                line => Some((idx + 1, line)),
            }
        })
}

/// Contents of a replay file as read by [`read_entries`].
#[derive(Debug, Default)]
pub struct ReplayFileContents {
    /// Parsed entries, oldest first
    pub entries: Vec<ReplayEntry>,
    /// 1-based line numbers and text of lines that did not parse
    pub unparseable: Vec<(usize, String)>,
}

/// Read a replay file without taking the lock, for inspection tools.
pub fn read_entries<P: AsRef<Path>>(path: P) -> ReplayResult<ReplayFileContents> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw = Vec::new();
    BufReader::new(file)
        .read_to_end(&mut raw)
        .map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut contents = ReplayFileContents::default();
    for (number, line) in split_lines(&raw) {
        match line {
            Ok(text) => match ReplayEntry::from_line(text) {
                Ok(entry) => contents.entries.push(entry),
                Err(_) => contents.unparseable.push((number, text.to_string())),
            },
            Err(bytes) => contents
                .unparseable
                .push((number, String::from_utf8_lossy(bytes).into_owned())),
        }
    }

    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> ReplayLog {
        ReplayLog::open(dir.path().join("replay.jsonl"), false).unwrap()
    }

    #[test]
    fn test_open_creates_missing_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("replay.jsonl");
        let log = ReplayLog::open(&path, false).unwrap();
        assert!(path.exists());
        assert!(log.is_empty());
        assert!(log.is_open());
    }

    #[test]
    fn test_push_is_on_disk_immediately() {
        let dir = TempDir::new().unwrap();
        let mut log = log_in(&dir);
        log.push("[\"a\",{}]".to_string()).unwrap();
        log.push("[\"b\",{}]".to_string()).unwrap();

        let on_disk = fs::read_to_string(log.path()).unwrap();
        assert_eq!(on_disk, "[\"a\",{}]\n[\"b\",{}]\n");
    }

    #[test]
    fn test_blank_lines_are_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        fs::write(&path, "one\n\n  \ntwo\n").unwrap();

        let log = ReplayLog::open(&path, false).unwrap();
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn test_compact_drops_popped_lines() {
        let dir = TempDir::new().unwrap();
        let mut log = log_in(&dir);
        for i in 0..5 {
            log.push(format!("line-{}", i)).unwrap();
        }
        log.pop_front();
        log.pop_front();
        log.compact().unwrap();

        let on_disk = fs::read_to_string(log.path()).unwrap();
        assert_eq!(on_disk, "line-2\nline-3\nline-4\n");

        // Appends after compaction land at the end, not over old bytes
        log.push("line-5".to_string()).unwrap();
        let on_disk = fs::read_to_string(log.path()).unwrap();
        assert_eq!(on_disk, "line-2\nline-3\nline-4\nline-5\n");
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        let _first = ReplayLog::open(&path, false).unwrap();

        match ReplayLog::open(&path, false) {
            Err(ReplayError::Locked { path: locked }) => assert_eq!(locked, path),
            other => panic!("expected Locked, got {:?}", other),
        }
    }

    #[test]
    fn test_close_releases_lock_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        let mut first = ReplayLog::open(&path, false).unwrap();
        first.push("kept".to_string()).unwrap();
        first.close().unwrap();
        first.close().unwrap();
        assert!(matches!(first.push("late".to_string()), Err(ReplayError::Closed)));

        let second = ReplayLog::open(&path, false).unwrap();
        assert_eq!(second.front(), Some("kept"));
    }

    #[test]
    fn test_read_entries_reports_unparseable_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        fs::write(&path, "[\"a\",{\"n\":1}]\nnot json\n\n[\"b\",{\"n\":2}]\n").unwrap();

        let contents = read_entries(&path).unwrap();
        assert_eq!(contents.entries.len(), 2);
        assert_eq!(contents.entries[1].uploader_id, "b");
        assert_eq!(contents.unparseable, vec![(2, "not json".to_string())]);
    }

    #[test]
    fn test_unterminated_tail_does_not_swallow_next_push() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        fs::write(&path, "[\"a\",{\"n\":1}]").unwrap();

        let mut log = ReplayLog::open(&path, false).unwrap();
        log.push("[\"b\",{\"n\":2}]".to_string()).unwrap();
        drop(log);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[\"a\",{\"n\":1}]\n[\"b\",{\"n\":2}]\n"
        );
        let contents = read_entries(&path).unwrap();
        assert_eq!(contents.entries.len(), 2);
        assert!(contents.unparseable.is_empty());
    }

    #[test]
    fn test_invalid_utf8_line_is_dropped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("replay.jsonl");
        let mut raw = b"\xff\xfe\n".to_vec();
        raw.extend_from_slice(b"[\"b\",{\"n\":2}]\n");
        fs::write(&path, &raw).unwrap();

        let contents = read_entries(&path).unwrap();
        assert_eq!(contents.entries.len(), 1);
        assert_eq!(contents.unparseable.len(), 1);
        assert_eq!(contents.unparseable[0].0, 1);

        let log = ReplayLog::open(&path, false).unwrap();
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["[\"b\",{\"n\":2}]"]);
    }
}
