//! PostgreSQL store adapter.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

use ledger_types::{
    Account, AccountId, Client, ClientId, LedgerStore, RepoError, Transaction, TransactionId,
    UnitOfWork,
};

use crate::locks::DEFAULT_LOCK_TIMEOUT;
use crate::types::postgres::{DbAccount, DbClient, DbTransaction};
use crate::types::{db_error, violates_unique};

const ACCOUNT_COLUMNS: &str = "id, client_id, balance, reserved_balance, credit_limit, currency, \
     status, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, operation, amount, currency, reference_id, \
     status, metadata, balance_after, reserved_balance_after, available_balance_after, \
     error_message, processed_at";

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Store
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL store with row-level locking.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_tables_pg.sql"),
        "0001",
    )
    .await
}

impl PostgresStore {
    /// Creates a new PostgreSQL store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_lock_timeout(database_url, DEFAULT_LOCK_TIMEOUT).await
    }

    pub async fn with_lock_timeout(
        database_url: &str,
        lock_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool, lock_timeout })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    type Unit = PostgresUnit;

    async fn begin(&self) -> Result<PostgresUnit, RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // SET does not accept bind parameters.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        Ok(PostgresUnit { tx })
    }

    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let row: Option<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE reference_id = $1",
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
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id.into_uuid())
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
            "SELECT {} FROM transactions WHERE account_id = $1 \
             ORDER BY processed_at DESC LIMIT $2",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id.into_uuid())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let row: Option<DbAccount> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbAccount::into_domain).transpose()
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError> {
        let row: Option<DbClient> = sqlx::query_as(
            r#"SELECT id, name, document, email, is_active, created_at FROM clients WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(DbClient::into_domain))
    }

    async fn list_accounts_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Account>, RepoError> {
        let rows: Vec<DbAccount> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE client_id = $1 ORDER BY created_at",
            ACCOUNT_COLUMNS
        ))
        .bind(client_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbAccount::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

/// A PostgreSQL transaction. Row locks taken with `FOR UPDATE` last until
/// commit or rollback.
pub struct PostgresUnit {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let row: Option<DbAccount> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id.into_uuid())
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
            "SELECT {} FROM transactions WHERE reference_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO transactions ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id.into_uuid())
        .bind(tx.account_id.into_uuid())
        .bind(tx.operation.as_str())
        .bind(tx.amount.amount())
        .bind(tx.amount.currency().as_str())
        .bind(&tx.reference_id)
        .bind(tx.status.as_str())
        .bind(serde_json::Value::Object(tx.metadata.clone()))
        .bind(tx.balance_after)
        .bind(tx.reserved_balance_after)
        .bind(tx.available_balance_after)
        .bind(&tx.error_message)
        .bind(tx.processed_at)
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
               SET balance = $1, reserved_balance = $2, credit_limit = $3, status = $4,
                   version = version + 1, updated_at = $5
               WHERE id = $6 AND version = $7"#,
        )
        .bind(account.balance())
        .bind(account.reserved_balance())
        .bind(account.credit_limit())
        .bind(account.status().as_str())
        .bind(account.updated_at())
        .bind(account.id().into_uuid())
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
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(client.id.into_uuid())
        .bind(&client.name)
        .bind(&client.document)
        .bind(&client.email)
        .bind(client.is_active)
        .bind(client.created_at)
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
            "INSERT INTO accounts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            ACCOUNT_COLUMNS
        ))
        .bind(account.id().into_uuid())
        .bind(account.client_id().into_uuid())
        .bind(account.balance())
        .bind(account.reserved_balance())
        .bind(account.credit_limit())
        .bind(account.currency().as_str())
        .bind(account.status().as_str())
        .bind(account.version())
        .bind(account.created_at())
        .bind(account.updated_at())
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
