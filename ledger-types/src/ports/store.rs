//! Store port traits.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory) implement these traits.

use crate::domain::{Account, AccountId, Client, ClientId, Transaction, TransactionId};
use crate::error::RepoError;

/// Read access to the ledger plus the entry point for atomic writes.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// The atomic unit of work produced by [`LedgerStore::begin`].
    type Unit: UnitOfWork;

    /// Opens a unit of work. Nothing it writes is visible until commit.
    async fn begin(&self) -> Result<Self::Unit, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finds a transaction by its idempotency key.
    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError>;

    /// Gets a transaction by ID.
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// Lists an account's transactions, newest first.
    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<Transaction>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Accounts & clients
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets an account by ID without locking it.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError>;

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError>;

    /// Lists a client's accounts, oldest first.
    async fn list_accounts_for_client(&self, client_id: ClientId)
    -> Result<Vec<Account>, RepoError>;
}

/// One atomic read-mutate-write sequence.
///
/// Dropping a unit without committing discards its writes and releases its
/// locks.
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    /// Fetches an account for exclusive update.
    ///
    /// Concurrent units locking the same id serialize; waiting is bounded and
    /// ends with [`RepoError::LockTimeout`].
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, RepoError>;

    /// Idempotency lookup inside the unit, seeing committed data.
    async fn find_transaction_by_reference(
        &mut self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError>;

    /// Stores a transaction record.
    ///
    /// Fails with [`RepoError::DuplicateReference`] when the reference id is
    /// taken, either here or at commit.
    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), RepoError>;

    /// Writes a locked account back.
    ///
    /// The write only applies if the stored version still equals
    /// `account.version()`; otherwise [`RepoError::Conflict`].
    async fn save_account(&mut self, account: &Account) -> Result<(), RepoError>;

    /// Registers a client. Fails with [`RepoError::DuplicateDocument`] when
    /// the document is taken.
    async fn insert_client(&mut self, client: &Client) -> Result<(), RepoError>;

    async fn insert_account(&mut self, account: &Account) -> Result<(), RepoError>;

    async fn commit(self) -> Result<(), RepoError>;

    async fn rollback(self) -> Result<(), RepoError>;
}
