//! Database row types and their conversion to domain values.
//!
//! SQLite stores ids, decimals and timestamps as TEXT; PostgreSQL uses native
//! UUID, NUMERIC and TIMESTAMPTZ columns.

use std::str::FromStr;

use ledger_types::{
    AccountStatus, Currency, Metadata, Operation, RepoError, TransactionStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepoError {
    RepoError::Database(format!("Invalid {} in row: {}", what, err))
}

pub fn parse_currency(s: &str) -> Result<Currency, RepoError> {
    Currency::new(s).map_err(|e| corrupt("currency", e))
}

pub fn parse_operation(s: &str) -> Result<Operation, RepoError> {
    Operation::from_str(s).map_err(|e| corrupt("operation", e))
}

pub fn parse_tx_status(s: &str) -> Result<TransactionStatus, RepoError> {
    TransactionStatus::from_str(s).map_err(|e| corrupt("transaction status", e))
}

pub fn parse_account_status(s: &str) -> Result<AccountStatus, RepoError> {
    AccountStatus::from_str(s).map_err(|e| corrupt("account status", e))
}

pub fn metadata_from_value(value: serde_json::Value) -> Result<Metadata, RepoError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Metadata::new()),
        other => Err(corrupt("metadata", other)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a driver error onto the store taxonomy.
///
/// Busy/locked databases and serialization failures become
/// [`RepoError::Conflict`], lock waits [`RepoError::LockTimeout`].
pub fn db_error(err: sqlx::Error) -> RepoError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            match code.as_str() {
                // PostgreSQL: serialization_failure, deadlock_detected
                "40001" | "40P01" => RepoError::Conflict(db.message().to_string()),
                // PostgreSQL: lock_not_available
                "55P03" => RepoError::LockTimeout(db.message().to_string()),
                // SQLite primary codes BUSY and LOCKED, possibly extended
                other => match other.parse::<i32>() {
                    Ok(n) if matches!(n & 0xff, 5 | 6) => {
                        RepoError::Conflict(db.message().to_string())
                    }
                    _ => RepoError::Database(err.to_string()),
                },
            }
        }
        sqlx::Error::PoolTimedOut => RepoError::LockTimeout("connection pool".into()),
        _ => RepoError::Database(err.to_string()),
    }
}

/// Whether `err` is a unique violation touching `column`.
pub fn violates_unique(err: &sqlx::Error, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            db.constraint().is_some_and(|c| c.contains(column)) || db.message().contains(column)
        }
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use chrono::{DateTime, SecondsFormat, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use std::str::FromStr;
    use uuid::Uuid;

    use ledger_types::{
        Account, AccountId, Client, ClientId, Money, RepoError, Transaction, TransactionId,
    };

    use super::{corrupt, parse_account_status, parse_currency, parse_operation, parse_tx_status};

    pub fn text_time(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn uuid(s: &str) -> Result<Uuid, RepoError> {
        Uuid::parse_str(s).map_err(|e| corrupt("uuid", e))
    }

    fn decimal(s: &str) -> Result<Decimal, RepoError> {
        Decimal::from_str(s).map_err(|e| corrupt("decimal", e))
    }

    fn time(s: &str) -> Result<DateTime<Utc>, RepoError> {
        Ok(DateTime::parse_from_rfc3339(s)
            .map_err(|e| corrupt("timestamp", e))?
            .with_timezone(&Utc))
    }

    /// Account row from database.
    #[derive(FromRow)]
    pub struct DbAccount {
        pub id: String,
        pub client_id: String,
        pub balance: String,
        pub reserved_balance: String,
        pub credit_limit: String,
        pub currency: String,
        pub status: String,
        pub version: i64,
        pub created_at: String,
        pub updated_at: Option<String>,
    }

    impl DbAccount {
        pub fn into_domain(self) -> Result<Account, RepoError> {
            Ok(Account::from_parts(
                AccountId::from_uuid(uuid(&self.id)?),
                ClientId::from_uuid(uuid(&self.client_id)?),
                decimal(&self.balance)?,
                decimal(&self.reserved_balance)?,
                decimal(&self.credit_limit)?,
                parse_currency(&self.currency)?,
                parse_account_status(&self.status)?,
                self.version,
                time(&self.created_at)?,
                self.updated_at.as_deref().map(time).transpose()?,
            ))
        }
    }

    /// Transaction row from database.
    #[derive(FromRow)]
    pub struct DbTransaction {
        pub id: String,
        pub account_id: String,
        pub operation: String,
        pub amount: String,
        pub currency: String,
        pub reference_id: String,
        pub status: String,
        pub metadata: String,
        pub balance_after: String,
        pub reserved_balance_after: String,
        pub available_balance_after: String,
        pub error_message: Option<String>,
        pub processed_at: String,
    }

    impl DbTransaction {
        pub fn into_domain(self) -> Result<Transaction, RepoError> {
            let metadata: serde_json::Value =
                serde_json::from_str(&self.metadata).map_err(|e| corrupt("metadata", e))?;
            let amount = Money::new(decimal(&self.amount)?, parse_currency(&self.currency)?)?;

            Ok(Transaction {
                id: TransactionId::from_uuid(uuid(&self.id)?),
                account_id: AccountId::from_uuid(uuid(&self.account_id)?),
                operation: parse_operation(&self.operation)?,
                amount,
                reference_id: self.reference_id,
                status: parse_tx_status(&self.status)?,
                metadata: super::metadata_from_value(metadata)?,
                balance_after: decimal(&self.balance_after)?,
                reserved_balance_after: decimal(&self.reserved_balance_after)?,
                available_balance_after: decimal(&self.available_balance_after)?,
                error_message: self.error_message,
                processed_at: time(&self.processed_at)?,
            })
        }
    }

    /// Client row from database.
    #[derive(FromRow)]
    pub struct DbClient {
        pub id: String,
        pub name: String,
        pub document: String,
        pub email: String,
        pub is_active: i64,
        pub created_at: String,
    }

    impl DbClient {
        pub fn into_domain(self) -> Result<Client, RepoError> {
            Ok(Client {
                id: ClientId::from_uuid(uuid(&self.id)?),
                name: self.name,
                document: self.document,
                email: self.email,
                is_active: self.is_active != 0,
                created_at: time(&self.created_at)?,
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
pub mod postgres {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use ledger_types::{
        Account, AccountId, Client, ClientId, Money, RepoError, Transaction, TransactionId,
    };

    use super::{metadata_from_value, parse_account_status, parse_currency, parse_operation, parse_tx_status};

    /// Account row from database.
    #[derive(FromRow)]
    pub struct DbAccount {
        pub id: Uuid,
        pub client_id: Uuid,
        pub balance: Decimal,
        pub reserved_balance: Decimal,
        pub credit_limit: Decimal,
        pub currency: String,
        pub status: String,
        pub version: i64,
        pub created_at: DateTime<Utc>,
        pub updated_at: Option<DateTime<Utc>>,
    }

    impl DbAccount {
        pub fn into_domain(self) -> Result<Account, RepoError> {
            Ok(Account::from_parts(
                AccountId::from_uuid(self.id),
                ClientId::from_uuid(self.client_id),
                self.balance,
                self.reserved_balance,
                self.credit_limit,
                parse_currency(&self.currency)?,
                parse_account_status(&self.status)?,
                self.version,
                self.created_at,
                self.updated_at,
            ))
        }
    }

    /// Transaction row from database.
    #[derive(FromRow)]
    pub struct DbTransaction {
        pub id: Uuid,
        pub account_id: Uuid,
        pub operation: String,
        pub amount: Decimal,
        pub currency: String,
        pub reference_id: String,
        pub status: String,
        pub metadata: serde_json::Value,
        pub balance_after: Decimal,
        pub reserved_balance_after: Decimal,
        pub available_balance_after: Decimal,
        pub error_message: Option<String>,
        pub processed_at: DateTime<Utc>,
    }

    impl DbTransaction {
        pub fn into_domain(self) -> Result<Transaction, RepoError> {
            Ok(Transaction {
                id: TransactionId::from_uuid(self.id),
                account_id: AccountId::from_uuid(self.account_id),
                operation: parse_operation(&self.operation)?,
                amount: Money::new(self.amount, parse_currency(&self.currency)?)?,
                reference_id: self.reference_id,
                status: parse_tx_status(&self.status)?,
                metadata: metadata_from_value(self.metadata)?,
                balance_after: self.balance_after,
                reserved_balance_after: self.reserved_balance_after,
                available_balance_after: self.available_balance_after,
                error_message: self.error_message,
                processed_at: self.processed_at,
            })
        }
    }

    /// Client row from database.
    #[derive(FromRow)]
    pub struct DbClient {
        pub id: Uuid,
        pub name: String,
        pub document: String,
        pub email: String,
        pub is_active: bool,
        pub created_at: DateTime<Utc>,
    }

    impl DbClient {
        pub fn into_domain(self) -> Client {
            Client {
                id: ClientId::from_uuid(self.id),
                name: self.name,
                document: self.document,
                email: self.email,
                is_active: self.is_active,
                created_at: self.created_at,
            }
        }
    }
}
