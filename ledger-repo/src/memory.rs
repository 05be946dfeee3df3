//! In-memory store adapter.
//!
//! Committed state lives behind one `RwLock`; a unit of work stages its
//! writes and applies them in a single critical section at commit, after
//! re-checking versions and uniqueness.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use ledger_types::{
    Account, AccountId, Client, ClientId, LedgerStore, RepoError, Transaction, TransactionId,
    UnitOfWork,
};

use crate::locks::{HeldLocks, RowLocks};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    clients: HashMap<ClientId, Client>,
    documents: HashMap<String, ClientId>,
    transactions: HashMap<TransactionId, Transaction>,
    references: HashMap<String, TransactionId>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    locks: RowLocks,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, RepoError> {
        self.tables
            .read()
            .map_err(|_| RepoError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, RepoError> {
        self.tables
            .write()
            .map_err(|_| RepoError::Database("memory store lock poisoned".into()))
    }
}

/// Volatile store for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long a unit waits for an account lock.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::default(),
                locks: RowLocks::new(timeout),
            }),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit, RepoError> {
        Ok(MemoryUnit {
            shared: self.shared.clone(),
            held: HeldLocks::default(),
            staged: Staged::default(),
        })
    }

    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let tables = self.shared.read()?;
        Ok(tables
            .references
            .get(reference_id)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        Ok(self.shared.read()?.transactions.get(&id).cloned())
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<Transaction>, RepoError> {
        let tables = self.shared.read()?;
        let mut txs: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        txs.truncate(limit as usize);
        Ok(txs)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        Ok(self.shared.read()?.accounts.get(&id).cloned())
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError> {
        Ok(self.shared.read()?.clients.get(&id).cloned())
    }

    async fn list_accounts_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Account>, RepoError> {
        let tables = self.shared.read()?;
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| a.client_id() == client_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at());
        Ok(accounts)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Staged {
    clients: Vec<Client>,
    new_accounts: Vec<Account>,
    /// Updated accounts with the version they were read at.
    updated_accounts: Vec<Account>,
    transactions: Vec<Transaction>,
}

/// Unit of work over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryUnit {
    shared: Arc<Shared>,
    held: HeldLocks,
    staged: Staged,
}

impl MemoryUnit {
    fn check(&self, tables: &Tables) -> Result<(), RepoError> {
        let mut references: Vec<&str> = Vec::new();
        for tx in &self.staged.transactions {
            let reference = tx.reference_id.as_str();
            if tables.references.contains_key(reference) || references.contains(&reference) {
                return Err(RepoError::DuplicateReference(tx.reference_id.clone()));
            }
            references.push(reference);
        }

        for client in &self.staged.clients {
            if tables.documents.contains_key(&client.document) {
                return Err(RepoError::DuplicateDocument(client.document.clone()));
            }
        }

        for account in &self.staged.new_accounts {
            if tables.accounts.contains_key(&account.id()) {
                return Err(RepoError::Conflict(format!(
                    "account {} already exists",
                    account.id()
                )));
            }
        }

        for account in &self.staged.updated_accounts {
            match tables.accounts.get(&account.id()) {
                Some(stored) if stored.version() == account.version() => {}
                Some(_) => {
                    return Err(RepoError::Conflict(format!(
                        "account {} was modified concurrently",
                        account.id()
                    )));
                }
                None => return Err(RepoError::NotFound),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, RepoError> {
        self.held.take(&self.shared.locks, id).await?;
        Ok(self.shared.read()?.accounts.get(&id).cloned())
    }

    async fn find_transaction_by_reference(
        &mut self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let tables = self.shared.read()?;
        Ok(tables
            .references
            .get(reference_id)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), RepoError> {
        self.staged.transactions.push(tx.clone());
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepoError> {
        self.staged.updated_accounts.push(account.clone());
        Ok(())
    }

    async fn insert_client(&mut self, client: &Client) -> Result<(), RepoError> {
        self.staged.clients.push(client.clone());
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), RepoError> {
        self.staged.new_accounts.push(account.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), RepoError> {
        let mut tables = self.shared.write()?;
        self.check(&tables)?;

        let staged = self.staged;
        for client in staged.clients {
            tables.documents.insert(client.document.clone(), client.id);
            tables.clients.insert(client.id, client);
        }
        for account in staged.new_accounts {
            tables.accounts.insert(account.id(), account);
        }
        for mut account in staged.updated_accounts {
            account.set_version(account.version() + 1);
            tables.accounts.insert(account.id(), account);
        }
        for tx in staged.transactions {
            tables.references.insert(tx.reference_id.clone(), tx.id);
            tables.transactions.insert(tx.id, tx);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::{Currency, Metadata, Money};
    use rust_decimal_macros::dec;

    async fn seed(store: &MemoryStore) -> Account {
        let client = Client::new("Alice", "DOC-1", "alice@example.com").unwrap();
        let (account, _) = client
            .open_account(
                Money::new(dec!(100), Currency::BRL).unwrap(),
                Money::zero(Currency::BRL),
            )
            .unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.insert_client(&client).await.unwrap();
        unit.insert_account(&account).await.unwrap();
        unit.commit().await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = MemoryStore::new();
        let account = seed(&store).await;

        let mut unit = store.begin().await.unwrap();
        let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
        let mutation = locked
            .credit(
                Money::new(dec!(5), Currency::BRL).unwrap(),
                "REF-1",
                Metadata::new(),
            )
            .unwrap();
        unit.save_account(&locked).await.unwrap();
        unit.insert_transaction(&mutation.transaction).await.unwrap();
        unit.commit().await.unwrap();

        let stored = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(stored.balance(), dec!(105));
        assert_eq!(stored.version(), 1);
        assert!(
            store
                .find_transaction_by_reference("REF-1")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_dropped_unit_discards_writes_and_releases_lock() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
        let account = seed(&store).await;

        {
            let mut unit = store.begin().await.unwrap();
            let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
            locked.block();
            unit.save_account(&locked).await.unwrap();
        }

        let mut unit = store.begin().await.unwrap();
        let locked = unit.lock_account(account.id()).await.unwrap().unwrap();
        assert!(locked.is_active());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let mut account = seed(&store).await;
        account.set_version(7);

        let mut unit = store.begin().await.unwrap();
        unit.save_account(&account).await.unwrap();
        assert!(matches!(unit.commit().await, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected_at_commit() {
        let store = MemoryStore::new();
        let account = seed(&store).await;
        let money = Money::new(dec!(1), Currency::BRL).unwrap();

        for expect_ok in [true, false] {
            let mut unit = store.begin().await.unwrap();
            let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
            let mutation = locked.credit(money, "REF-DUP", Metadata::new()).unwrap();
            unit.insert_transaction(&mutation.transaction).await.unwrap();
            let result = unit.commit().await;
            assert_eq!(result.is_ok(), expect_ok);
            if !expect_ok {
                assert!(matches!(result, Err(RepoError::DuplicateReference(_))));
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_document_rejected() {
        let store = MemoryStore::new();
        seed(&store).await;

        let mut unit = store.begin().await.unwrap();
        let other = Client::new("Bob", "DOC-1", "bob@example.com").unwrap();
        unit.insert_client(&other).await.unwrap();
        assert!(matches!(
            unit.commit().await,
            Err(RepoError::DuplicateDocument(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_wait_is_bounded() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let account = seed(&store).await;

        let mut first = store.begin().await.unwrap();
        first.lock_account(account.id()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        assert!(matches!(
            second.lock_account(account.id()).await,
            Err(RepoError::LockTimeout(_))
        ));
    }
}
