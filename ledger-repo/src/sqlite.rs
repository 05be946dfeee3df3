//! SQLite store adapter.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};

use ledger_types::{
    Account, AccountId, Client, ClientId, LedgerStore, RepoError, Transaction, TransactionId,
    UnitOfWork,
};

use crate::locks::DEFAULT_LOCK_TIMEOUT;
use crate::types::sqlite::{DbAccount, DbClient, DbTransaction, text_time};
use crate::types::{db_error, violates_unique};

const ACCOUNT_COLUMNS: &str = "id, client_id, balance, reserved_balance, credit_limit, currency, \
     status, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, operation, amount, currency, reference_id, \
     status, metadata, balance_after, reserved_balance_after, available_balance_after, \
     error_message, processed_at";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite store.
///
/// SQLite has no row locks. Every unit of work opens with
/// `BEGIN IMMEDIATE`, which takes the database write lock before the first
/// read, so a unit never reads an account from a snapshot older than the
/// last committed write. Waiting for the write lock is bounded by the busy
/// timeout.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new SQLite store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_lock_timeout(database_url, DEFAULT_LOCK_TIMEOUT).await
    }

    pub async fn with_lock_timeout(
        database_url: &str,
        lock_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            // Remove query parameters
            let path = path.split('?').next().unwrap_or(path);
            if !in_memory {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(lock_timeout);
        if !in_memory {
            // Readers must not block a committing writer.
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` opens its own database.
        let max_connections = if in_memory { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(lock_timeout.max(Duration::from_secs(30)))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        let ddl = include_str!("../migrations/0001_create_ledger_tables.sql");
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    type Unit = SqliteUnit;

    async fn begin(&self) -> Result<SqliteUnit, RepoError> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(db_error)?;

        Ok(SqliteUnit { tx })
    }

    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let row: Option<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE reference_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let row: Option<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<Transaction>, RepoError> {
        let rows: Vec<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE account_id = ? \
             ORDER BY processed_at DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let row: Option<DbAccount> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbAccount::into_domain).transpose()
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError> {
        let row: Option<DbClient> = sqlx::query_as(
            r#"SELECT id, name, document, email, is_active, created_at FROM clients WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbClient::into_domain).transpose()
    }

    async fn list_accounts_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Account>, RepoError> {
        let rows: Vec<DbAccount> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE client_id = ? ORDER BY created_at",
            ACCOUNT_COLUMNS
        ))
        .bind(client_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbAccount::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

/// A SQLite write transaction. It holds the database write lock until
/// commit or rollback.
pub struct SqliteUnit {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnit {
    // The unit holds the database write lock from `BEGIN IMMEDIATE`.
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let row: Option<DbAccount> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(DbAccount::into_domain).transpose()
    }

    async fn find_transaction_by_reference(
        &mut self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let row: Option<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE reference_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), RepoError> {
        let metadata = serde_json::Value::Object(tx.metadata.clone()).to_string();

        sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id.to_string())
        .bind(tx.account_id.to_string())
        .bind(tx.operation.as_str())
        .bind(tx.amount.amount().to_string())
        .bind(tx.amount.currency().as_str())
        .bind(&tx.reference_id)
        .bind(tx.status.as_str())
        .bind(metadata)
        .bind(tx.balance_after.to_string())
        .bind(tx.reserved_balance_after.to_string())
        .bind(tx.available_balance_after.to_string())
        .bind(&tx.error_message)
        .bind(text_time(tx.processed_at))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if violates_unique(&e, "reference_id") {
                RepoError::DuplicateReference(tx.reference_id.clone())
            } else {
                db_error(e)
            }
        })?;

        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE accounts
               SET balance = ?, reserved_balance = ?, credit_limit = ?, status = ?,
                   version = version + 1, updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(account.balance().to_string())
        .bind(account.reserved_balance().to_string())
        .bind(account.credit_limit().to_string())
        .bind(account.status().as_str())
        .bind(account.updated_at().map(text_time))
        .bind(account.id().to_string())
        .bind(account.version())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "account {} was modified concurrently",
                account.id()
            )));
        }
        Ok(())
    }

    async fn insert_client(&mut self, client: &Client) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO clients (id, name, document, email, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(client.id.to_string())
        .bind(&client.name)
        .bind(&client.document)
        .bind(&client.email)
        .bind(i64::from(client.is_active))
        .bind(text_time(client.created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if violates_unique(&e, "document") {
                RepoError::DuplicateDocument(client.document.clone())
            } else {
                db_error(e)
            }
        })?;

        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO accounts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ACCOUNT_COLUMNS
        ))
        .bind(account.id().to_string())
        .bind(account.client_id().to_string())
        .bind(account.balance().to_string())
        .bind(account.reserved_balance().to_string())
        .bind(account.credit_limit().to_string())
        .bind(account.currency().as_str())
        .bind(account.status().as_str())
        .bind(account.version())
        .bind(text_time(account.created_at()))
        .bind(account.updated_at().map(text_time))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn commit(self) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self) -> Result<(), RepoError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))
    }
}
