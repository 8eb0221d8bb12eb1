//! Store collaborator surface: driver → connection → session → transaction, the
//! scoped-release guards around them, and the batch unit of work.

use crate::batcher::Batch;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Principal and secret handed to `Driver::connect`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: Some(password.into()) }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Schema,
    Data,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Schema => "schema",
            SessionMode::Data => "data",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Read,
    Write,
}

/// Scoped release of a store handle. Must be idempotent.
pub trait Close {
    fn close(&self);
}

impl<T: Close + ?Sized> Close for Arc<T> {
    fn close(&self) {
        (**self).close()
    }
}

pub trait Driver {
    type Connection: Connection;

    fn connect(&self, addresses: &[String], credential: &Credential) -> Result<Self::Connection>;
}

pub trait Connection: Close {
    type Session: Session;

    fn database_exists(&self, name: &str) -> Result<bool>;
    fn create_database(&self, name: &str) -> Result<()>;
    fn delete_database(&self, name: &str) -> Result<()>;
    fn open_session(&self, database: &str, mode: SessionMode) -> Result<Self::Session>;
}

/// A session is shared by every unit of work in flight; implementations must tolerate
/// concurrent `transaction` calls.
pub trait Session: Close + Send + Sync + 'static {
    type Transaction: Transaction;

    fn database(&self) -> &str;
    fn transaction(&self, kind: TransactionKind) -> Result<Self::Transaction>;
}

pub trait Transaction {
    /// Queue one statement. Failures may surface here or at commit.
    fn execute(&mut self, statement: &str) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn is_open(&self) -> bool;
    fn close(&mut self);
}

/// Owns a handle and closes it when dropped.
pub struct Closing<T: Close> {
    inner: T,
}

impl<T: Close> Closing<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Close> Deref for Closing<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Close> Drop for Closing<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Closes the transaction on drop if it is still open (rolled back by the store).
pub struct TransactionGuard<X: Transaction> {
    tx: X,
}

impl<X: Transaction> TransactionGuard<X> {
    pub fn new(tx: X) -> Self {
        Self { tx }
    }
}

impl<X: Transaction> Deref for TransactionGuard<X> {
    type Target = X;

    fn deref(&self) -> &X {
        &self.tx
    }
}

impl<X: Transaction> DerefMut for TransactionGuard<X> {
    fn deref_mut(&mut self) -> &mut X {
        &mut self.tx
    }
}

impl<X: Transaction> Drop for TransactionGuard<X> {
    fn drop(&mut self) {
        if self.tx.is_open() {
            self.tx.close();
        }
    }
}

/// Submit one batch in its own write transaction. Returns the number of statements committed.
pub fn load_batch<S: Session + ?Sized>(session: &S, batch: &Batch) -> Result<usize> {
    let mut tx = TransactionGuard::new(
        session
            .transaction(TransactionKind::Write)
            .with_context(|| format!("opening write transaction on {}", session.database()))?,
    );
    for (i, statement) in batch.iter().enumerate() {
        tx.execute(statement)
            .with_context(|| format!("batch #{} statement {}", batch.index(), i))?;
    }
    tx.commit().with_context(|| format!("committing batch #{} ({} statements)", batch.index(), batch.len()))?;
    Ok(batch.len())
}

/// Run a whole script (e.g. a schema definition) as a single write transaction.
pub fn run_script<S: Session + ?Sized>(session: &S, script: &str) -> Result<()> {
    let mut tx = TransactionGuard::new(session.transaction(TransactionKind::Write)?);
    tx.execute(script)?;
    tx.commit()
}
