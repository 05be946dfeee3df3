//! SQLite store integration tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ledger_types::{
        Account, Client, Currency, LedgerStore, Metadata, Money, Operation, RepoError,
        TransactionStatus, UnitOfWork,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;

    use crate::SqliteStore;

    async fn setup_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn brl(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::BRL).unwrap()
    }

    async fn seed_account(store: &SqliteStore, document: &str) -> (Client, Account) {
        let client = Client::new("Alice", document, "alice@example.com").unwrap();
        let (account, _) = client.open_account(brl(dec!(100)), brl(dec!(50))).unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.insert_client(&client).await.unwrap();
        unit.insert_account(&account).await.unwrap();
        unit.commit().await.unwrap();
        (client, account)
    }

    #[tokio::test]
    async fn test_account_round_trips() {
        let store = setup_store().await;
        let (client, account) = seed_account(&store, "DOC-1").await;

        let fetched = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(fetched.id(), account.id());
        assert_eq!(fetched.client_id(), client.id);
        assert_eq!(fetched.balance(), dec!(100));
        assert_eq!(fetched.credit_limit(), dec!(50));
        assert_eq!(fetched.currency(), Currency::BRL);
        assert_eq!(fetched.version(), 0);

        let stored_client = store.get_client(client.id).await.unwrap().unwrap();
        assert_eq!(stored_client.document, "DOC-1");

        let accounts = store.list_accounts_for_client(client.id).await.unwrap();
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_get_account_not_found() {
        let store = setup_store().await;
        let result = store.get_account(ledger_types::AccountId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_transaction_persists_with_metadata() {
        let store = setup_store().await;
        let (_, account) = seed_account(&store, "DOC-1").await;

        let mut unit = store.begin().await.unwrap();
        let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("channel".into(), json!("pix"));
        let mutation = locked.debit(brl(dec!(30.25)), "REF-1", metadata).unwrap();
        unit.save_account(&locked).await.unwrap();
        unit.insert_transaction(&mutation.transaction).await.unwrap();
        unit.commit().await.unwrap();

        let tx = store
            .find_transaction_by_reference("REF-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.id, mutation.transaction.id);
        assert_eq!(tx.operation, Operation::Debit);
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.amount.amount(), dec!(30.25));
        assert_eq!(tx.balance_after, dec!(69.75));
        assert_eq!(tx.metadata["channel"], "pix");

        let by_id = store.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(by_id.reference_id, "REF-1");

        let account = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(account.balance(), dec!(69.75));
        assert_eq!(account.version(), 1);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let store = setup_store().await;
        let (_, account) = seed_account(&store, "DOC-1").await;

        for i in 0..3 {
            let mut unit = store.begin().await.unwrap();
            let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
            let mutation = locked
                .credit(brl(dec!(1)), format!("REF-{}", i), Metadata::new())
                .unwrap();
            unit.save_account(&locked).await.unwrap();
            unit.insert_transaction(&mutation.transaction).await.unwrap();
            unit.commit().await.unwrap();
        }

        let history = store
            .list_transactions_for_account(account.id(), 2)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reference_id, "REF-2");
        assert_eq!(history[1].reference_id, "REF-1");
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_reported() {
        let store = setup_store().await;
        let (_, account) = seed_account(&store, "DOC-1").await;

        let mut unit = store.begin().await.unwrap();
        let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
        let first = locked.credit(brl(dec!(1)), "REF-X", Metadata::new()).unwrap();
        let second = locked.credit(brl(dec!(1)), "REF-X", Metadata::new()).unwrap();
        unit.insert_transaction(&first.transaction).await.unwrap();

        let result = unit.insert_transaction(&second.transaction).await;
        assert!(matches!(result, Err(RepoError::DuplicateReference(r)) if r == "REF-X"));
    }

    #[tokio::test]
    async fn test_duplicate_document_is_reported() {
        let store = setup_store().await;
        seed_account(&store, "DOC-1").await;

        let mut unit = store.begin().await.unwrap();
        let other = Client::new("Bob", "DOC-1", "bob@example.com").unwrap();
        let result = unit.insert_client(&other).await;
        assert!(matches!(result, Err(RepoError::DuplicateDocument(_))));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = setup_store().await;
        let (_, mut account) = seed_account(&store, "DOC-1").await;
        account.set_version(3);

        let mut unit = store.begin().await.unwrap();
        let result = unit.save_account(&account).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = setup_store().await;
        let (_, account) = seed_account(&store, "DOC-1").await;

        let mut unit = store.begin().await.unwrap();
        let mut locked = unit.lock_account(account.id()).await.unwrap().unwrap();
        locked.block();
        unit.save_account(&locked).await.unwrap();
        unit.rollback().await.unwrap();

        let fetched = store.get_account(account.id()).await.unwrap().unwrap();
        assert!(fetched.is_active());
    }

    #[tokio::test]
    async fn test_concurrent_units_on_file_database_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
        let store = SqliteStore::with_lock_timeout(&url, Duration::from_secs(5))
            .await
            .unwrap();
        let (_, account) = seed_account(&store, "DOC-1").await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            let id = account.id();
            handles.push(tokio::spawn(async move {
                let mut unit = store.begin().await.unwrap();
                let mut locked = unit.lock_account(id).await.unwrap().unwrap();
                let mutation = locked
                    .credit(brl(dec!(10)), format!("C-{}", i), Metadata::new())
                    .unwrap();
                unit.save_account(&locked).await.unwrap();
                unit.insert_transaction(&mutation.transaction).await.unwrap();
                unit.commit().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fetched = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(fetched.balance(), dec!(140));
        assert_eq!(fetched.version(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_before_locking_see_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
        let store = SqliteStore::with_lock_timeout(&url, Duration::from_secs(5))
            .await
            .unwrap();
        let (_, account) = seed_account(&store, "DOC-1").await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let store = store.clone();
            let id = account.id();
            handles.push(tokio::spawn(async move {
                let reference = format!("R-{}", i);
                let mut unit = store.begin().await?;
                assert!(unit.find_transaction_by_reference(&reference).await?.is_none());
                tokio::task::yield_now().await;

                let mut locked = unit.lock_account(id).await?.unwrap();
                let mutation = locked
                    .credit(brl(dec!(5)), reference, Metadata::new())
                    .unwrap();
                unit.save_account(&locked).await?;
                unit.insert_transaction(&mutation.transaction).await?;
                unit.commit().await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let fetched = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(fetched.balance(), dec!(160));
        assert_eq!(fetched.version(), 12);
    }
}
