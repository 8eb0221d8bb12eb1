//! In-process store. Committed statements are appended to a per-database log, which
//! makes it the store of choice for dry runs and tests. Optional commit latency and a
//! rejection pattern stand in for a slow or validating backend.

use crate::store::{Close, Connection, Credential, Driver, Session, SessionMode, Transaction, TransactionKind};
use ahash::AHashMap;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Shared {
    databases: Mutex<AHashMap<String, AHashMap<SessionMode, Vec<String>>>>,
    open_connections: AtomicUsize,
    open_sessions: AtomicUsize,
    open_transactions: AtomicUsize,
    commits: AtomicU64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    reject: Option<Regex>,
    commit_latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create `name` so sessions can be opened without a recreate step.
    pub fn with_database(self, name: &str) -> Self {
        self.shared.databases.lock().entry(name.to_string()).or_default();
        self
    }

    /// Fail `execute` for any statement matching `re`.
    pub fn reject_matching(mut self, re: Regex) -> Self {
        self.reject = Some(re);
        self
    }

    /// Sleep this long inside every commit.
    pub fn with_commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = Some(latency);
        self
    }

    /// Committed statements for `database` in `mode`, in commit order.
    pub fn statements(&self, database: &str, mode: SessionMode) -> Vec<String> {
        self.shared
            .databases
            .lock()
            .get(database)
            .and_then(|logs| logs.get(&mode))
            .cloned()
            .unwrap_or_default()
    }

    pub fn data_statements(&self, database: &str) -> Vec<String> {
        self.statements(database, SessionMode::Data)
    }

    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn commits(&self) -> u64 {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.shared.open_connections.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    pub fn open_transactions(&self) -> usize {
        self.shared.open_transactions.load(Ordering::SeqCst)
    }
}

impl Driver for MemoryStore {
    type Connection = MemoryConnection;

    fn connect(&self, addresses: &[String], _credential: &Credential) -> Result<MemoryConnection> {
        if addresses.is_empty() {
            bail!("no store addresses given");
        }
        self.shared.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection { store: self.clone(), open: AtomicBool::new(true) })
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
    open: AtomicBool,
}

impl Close for MemoryConnection {
    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.store.shared.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Connection for MemoryConnection {
    type Session = MemorySession;

    fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.store.shared.databases.lock().contains_key(name))
    }

    fn create_database(&self, name: &str) -> Result<()> {
        let mut dbs = self.store.shared.databases.lock();
        if dbs.contains_key(name) {
            bail!("database '{name}' already exists");
        }
        dbs.insert(name.to_string(), AHashMap::new());
        Ok(())
    }

    fn delete_database(&self, name: &str) -> Result<()> {
        if self.store.shared.databases.lock().remove(name).is_none() {
            bail!("database '{name}' does not exist");
        }
        Ok(())
    }

    fn open_session(&self, database: &str, mode: SessionMode) -> Result<MemorySession> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("connection is closed");
        }
        if !self.database_exists(database)? {
            bail!("database '{database}' does not exist");
        }
        self.store.shared.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            store: self.store.clone(),
            database: database.to_string(),
            mode,
            open: AtomicBool::new(true),
        })
    }
}

pub struct MemorySession {
    store: MemoryStore,
    database: String,
    mode: SessionMode,
    open: AtomicBool,
}

impl Close for MemorySession {
    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.store.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Session for MemorySession {
    type Transaction = MemoryTransaction;

    fn database(&self) -> &str {
        &self.database
    }

    fn transaction(&self, kind: TransactionKind) -> Result<MemoryTransaction> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("session on '{}' is closed", self.database);
        }
        self.store.shared.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTransaction {
            store: self.store.clone(),
            database: self.database.clone(),
            mode: self.mode,
            kind,
            pending: Vec::new(),
            open: true,
        })
    }
}

pub struct MemoryTransaction {
    store: MemoryStore,
    database: String,
    mode: SessionMode,
    kind: TransactionKind,
    pending: Vec<String>,
    open: bool,
}

impl Transaction for MemoryTransaction {
    fn execute(&mut self, statement: &str) -> Result<()> {
        if !self.open {
            bail!("transaction is closed");
        }
        if self.kind == TransactionKind::Read {
            bail!("cannot write in a read transaction");
        }
        if let Some(re) = &self.store.reject {
            if re.is_match(statement) {
                bail!("statement rejected by store: {statement}");
            }
        }
        self.pending.push(statement.to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.open {
            bail!("transaction is closed");
        }
        if let Some(latency) = self.store.commit_latency {
            std::thread::sleep(latency);
        }
        {
            let mut dbs = self.store.shared.databases.lock();
            let Some(logs) = dbs.get_mut(&self.database) else {
                drop(dbs);
                self.close();
                bail!("database '{}' was deleted mid-transaction", self.database);
            };
            logs.entry(self.mode).or_default().append(&mut self.pending);
        }
        self.store.shared.commits.fetch_add(1, Ordering::SeqCst);
        self.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.pending.clear();
            self.store.shared.open_transactions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.close();
    }
}
