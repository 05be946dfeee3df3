//! Scenarios against a file-backed SQLite store.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ledger_hex::{LedgerService, LogPublisher, RetryPolicy, ServiceSettings};
use ledger_repo::SqliteStore;
use ledger_types::{AccountId, ClientId, CreateAccountRequest, TransactionRequest, TransactionStatus};

type Service = LedgerService<SqliteStore, LogPublisher>;

async fn build() -> (TempDir, Arc<Service>) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    let store = SqliteStore::with_lock_timeout(&url, Duration::from_secs(5))
        .await
        .unwrap();
    let service = LedgerService::with_policy(
        store,
        LogPublisher,
        RetryPolicy::new().with_base_delay(Duration::from_millis(5)),
        ServiceSettings::default(),
    );
    (dir, Arc::new(service))
}

async fn open(service: &Service, balance: i64) -> AccountId {
    service
        .create_account(CreateAccountRequest {
            client_id: ClientId::new().to_string(),
            initial_balance: balance,
            credit_limit: 0,
            currency: "BRL".into(),
        })
        .await
        .unwrap()
        .account_id
}

fn request(operation: &str, account: AccountId, amount: i64, reference: &str) -> TransactionRequest {
    TransactionRequest {
        operation: operation.into(),
        account_id: account.to_string(),
        amount,
        currency: "BRL".into(),
        reference_id: reference.into(),
        metadata: None,
        target_account_id: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_all_succeed() {
    let (_dir, service) = build().await;
    let id = open(&service, 0).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            service
                .process(request("credit", id, 100, &format!("SQ-{}", i)), &cancel)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(
            response.status,
            TransactionStatus::Success,
            "{:?}",
            response.error_message
        );
    }

    let account = service.get_account(id).await.unwrap();
    assert_eq!(account.balance, 1_600);
    let history = service.list_account_transactions(id, None).await.unwrap();
    assert_eq!(history.len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_keep_the_total() {
    let (_dir, service) = build().await;
    let a = open(&service, 50_000).await;
    let b = open(&service, 50_000).await;

    let mut handles = Vec::new();
    for i in 0..12 {
        let service = service.clone();
        let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let req = TransactionRequest {
                target_account_id: Some(to.to_string()),
                ..request("transfer", from, 700, &format!("SX-{}", i))
            };
            service.process(req, &cancel).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, TransactionStatus::Success);
    }

    let total = service.get_account(a).await.unwrap().balance
        + service.get_account(b).await.unwrap().balance;
    assert_eq!(total, 100_000);
}
