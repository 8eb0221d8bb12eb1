//! Journal store: a directory per database, one append-only `<mode>.tql` file per
//! session mode. A commit appends its statements in one locked write, so committed
//! batches never interleave.

use crate::store::{Close, Connection, Credential, Driver, Session, SessionMode, Transaction, TransactionKind};
use crate::util::append_with_backoff;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
    write_buf_bytes: usize,
    append_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_buf_bytes: 256 * 1024,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buf_bytes = bytes.max(8 * 1024);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Journal file holding everything committed to `database` in `mode`.
    pub fn journal_path(&self, database: &str, mode: SessionMode) -> PathBuf {
        self.root.join(database).join(format!("{}.tql", mode.as_str()))
    }
}

impl Driver for FileStore {
    type Connection = FileConnection;

    fn connect(&self, _addresses: &[String], _credential: &Credential) -> Result<FileConnection> {
        fs::create_dir_all(&self.root).with_context(|| format!("creating store root {}", self.root.display()))?;
        Ok(FileConnection { store: self.clone(), open: AtomicBool::new(true) })
    }
}

pub struct FileConnection {
    store: FileStore,
    open: AtomicBool,
}

impl Close for FileConnection {
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Connection for FileConnection {
    type Session = FileSession;

    fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.store.root.join(name).is_dir())
    }

    fn create_database(&self, name: &str) -> Result<()> {
        let dir = self.store.root.join(name);
        fs::create_dir(&dir).with_context(|| format!("creating database {}", dir.display()))
    }

    fn delete_database(&self, name: &str) -> Result<()> {
        let dir = self.store.root.join(name);
        fs::remove_dir_all(&dir).with_context(|| format!("deleting database {}", dir.display()))
    }

    fn open_session(&self, database: &str, mode: SessionMode) -> Result<FileSession> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("connection is closed");
        }
        if !self.database_exists(database)? {
            bail!("database '{database}' does not exist under {}", self.store.root.display());
        }
        Ok(FileSession {
            journal: self.store.journal_path(database, mode),
            store: self.store.clone(),
            database: database.to_string(),
            open: AtomicBool::new(true),
        })
    }
}

pub struct FileSession {
    store: FileStore,
    database: String,
    journal: PathBuf,
    open: AtomicBool,
}

impl Close for FileSession {
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Session for FileSession {
    type Transaction = FileTransaction;

    fn database(&self) -> &str {
        &self.database
    }

    fn transaction(&self, kind: TransactionKind) -> Result<FileTransaction> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("session on '{}' is closed", self.database);
        }
        Ok(FileTransaction {
            store: self.store.clone(),
            journal: self.journal.clone(),
            kind,
            pending: Vec::new(),
            open: true,
        })
    }
}

pub struct FileTransaction {
    store: FileStore,
    journal: PathBuf,
    kind: TransactionKind,
    pending: Vec<String>,
    open: bool,
}

impl Transaction for FileTransaction {
    fn execute(&mut self, statement: &str) -> Result<()> {
        if !self.open {
            bail!("transaction is closed");
        }
        if self.kind == TransactionKind::Read {
            bail!("cannot write in a read transaction");
        }
        self.pending.push(statement.to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.open {
            bail!("transaction is closed");
        }
        let result = {
            let _guard = self.store.append_lock.lock();
            append_lines(&self.journal, &self.pending, self.store.write_buf_bytes)
        };
        self.close();
        result.with_context(|| format!("appending to {}", self.journal.display()))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }
}

fn append_lines(path: &Path, lines: &[String], buf_bytes: usize) -> std::io::Result<()> {
    let file = append_with_backoff(path, 16, 50)?;
    let mut w = BufWriter::with_capacity(buf_bytes, file);
    for line in lines {
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.flush()
}
