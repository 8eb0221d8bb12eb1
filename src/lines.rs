//! Lazy multi-file line reader. Files are consumed in list order and one line at a
//! time; a `.zst` suffix selects a streaming zstd decoder.

use crate::error::LoadError;
use crate::util::open_with_backoff;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use zstd::stream::read::Decoder;

const DEFAULT_READ_BUF: usize = 128 * 1024;

/// A `Read` wrapper that counts on-disk (compressed, for `.zst`) bytes.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

pub(crate) fn is_zstd(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("zst"))
}

fn open_source(path: &Path, read_buf_bytes: usize, counter: Arc<AtomicU64>) -> io::Result<Box<dyn BufRead + Send>> {
    let file = open_with_backoff(path, 16, 50)?;
    let counted = CountingReader { inner: file, counter };
    if is_zstd(path) {
        let mut decoder = Decoder::new(counted)?;
        // Large frames otherwise fail with "Frame requires too much memory".
        decoder.window_log_max(31)?;
        Ok(Box::new(BufReader::with_capacity(read_buf_bytes, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(read_buf_bytes, counted)))
    }
}

struct OpenSource {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
}

/// Forward-only sequence of records over an ordered list of files.
///
/// The current file handle is dropped as soon as its last line is read, when the
/// stream itself is dropped, or after an error. An open/read failure is yielded
/// once as [`LoadError::Io`]; the stream then ends without touching later files.
pub struct LineStream {
    pending: VecDeque<PathBuf>,
    current: Option<OpenSource>,
    read_buf_bytes: usize,
    skip_blank: bool,
    records: u64,
    bytes: Arc<AtomicU64>,
    failed: bool,
}

impl LineStream {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            pending: paths.into_iter().map(Into::into).collect(),
            current: None,
            read_buf_bytes: DEFAULT_READ_BUF,
            skip_blank: false,
            records: 0,
            bytes: Arc::new(AtomicU64::new(0)),
            failed: false,
        }
    }

    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buf_bytes = bytes.max(8 * 1024);
        self
    }

    /// Drop empty and whitespace-only lines instead of yielding them.
    pub fn skip_blank_lines(mut self, yes: bool) -> Self {
        self.skip_blank = yes;
        self
    }

    /// Records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Bytes pulled from disk so far, across all files.
    pub fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Path of the file currently open, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }

    fn fail(&mut self, path: PathBuf, e: io::Error) -> Option<Result<String, LoadError>> {
        self.failed = true;
        self.current = None;
        self.pending.clear();
        tracing::error!("aborting line stream at {}: {}", path.display(), e);
        Some(Err(LoadError::io(path, e)))
    }
}

impl Iterator for LineStream {
    type Item = Result<String, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.current.is_none() {
                let path = self.pending.pop_front()?;
                match open_source(&path, self.read_buf_bytes, self.bytes.clone()) {
                    Ok(reader) => {
                        tracing::debug!("opened {}", path.display());
                        self.current = Some(OpenSource { path, reader });
                    }
                    Err(e) => return self.fail(path, e),
                }
            }

            let mut raw = Vec::new();
            let read = match self.current.as_mut() {
                Some(src) => src.reader.read_until(b'\n', &mut raw),
                None => continue,
            };
            match read {
                Ok(0) => {
                    // EOF: release the handle before moving on.
                    self.current = None;
                }
                Ok(_) => {
                    if raw.last() == Some(&b'\n') {
                        raw.pop();
                        if raw.last() == Some(&b'\r') {
                            raw.pop();
                        }
                    }
                    let line = match String::from_utf8(raw) {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!(
                                "invalid UTF-8 in {} (stream record {}); replacing undecodable bytes",
                                self.current_path().map(|p| p.display().to_string()).unwrap_or_default(),
                                self.records + 1
                            );
                            String::from_utf8_lossy(e.as_bytes()).into_owned()
                        }
                    };
                    if self.skip_blank && line.trim().is_empty() {
                        continue;
                    }
                    self.records += 1;
                    return Some(Ok(line));
                }
                Err(e) => {
                    let path = self.current.take().map(|s| s.path).unwrap_or_default();
                    return self.fail(path, e);
                }
            }
        }
    }
}

impl FusedIterator for LineStream {}
