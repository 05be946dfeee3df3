//! End-to-end scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ledger_hex::{BroadcastPublisher, LedgerService, RetryPolicy, ServiceSettings};
use ledger_repo::MemoryStore;
use ledger_types::{
    AccountId, ClientId, CreateAccountRequest, DomainEvent, TransactionRequest, TransactionStatus,
};

type Service = LedgerService<MemoryStore, BroadcastPublisher>;

fn build() -> Arc<Service> {
    Arc::new(LedgerService::with_policy(
        MemoryStore::with_lock_timeout(Duration::from_secs(2)),
        BroadcastPublisher::new(256),
        RetryPolicy::new().with_base_delay(Duration::from_millis(5)),
        ServiceSettings::default(),
    ))
}

async fn open(service: &Service, balance: i64, credit_limit: i64) -> AccountId {
    service
        .create_account(CreateAccountRequest {
            client_id: ClientId::new().to_string(),
            initial_balance: balance,
            credit_limit,
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

#[tokio::test]
async fn test_account_lifecycle_keeps_invariants() {
    let service = build();
    let cancel = CancellationToken::new();
    let id = open(&service, 0, 100_000).await;

    let steps = [
        ("credit", 50_000, "REF-1", TransactionStatus::Success),
        ("debit", 200_000, "REF-2", TransactionStatus::Failed),
        ("reserve", 30_000, "REF-3", TransactionStatus::Success),
        ("capture", 30_000, "REF-4", TransactionStatus::Success),
        ("debit", 100_000, "REF-5", TransactionStatus::Success),
        ("debit", 30_000, "REF-6", TransactionStatus::Failed),
        ("reserve", 1, "REF-7", TransactionStatus::Failed),
    ];
    for (operation, amount, reference, expected) in steps {
        let response = service
            .process(request(operation, id, amount, reference), &cancel)
            .await
            .unwrap();
        assert_eq!(response.status, expected, "{} {}", operation, reference);

        let account = service.get_account(id).await.unwrap();
        assert!(account.balance >= -account.credit_limit);
        assert!(account.reserved_balance >= 0);
    }

    let account = service.get_account(id).await.unwrap();
    assert_eq!(account.balance, -80_000);
    assert_eq!(account.reserved_balance, 0);

    let history = service.list_account_transactions(id, None).await.unwrap();
    assert_eq!(history.len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_on_one_account_are_not_lost() {
    let service = build();
    let id = open(&service, 0, 0).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            service
                .process(request("credit", id, 100, &format!("PAR-{}", i)), &cancel)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, TransactionStatus::Success);
    }

    let account = service.get_account(id).await.unwrap();
    assert_eq!(account.balance, 2_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_record_once() {
    let service = build();
    let id = open(&service, 0, 0).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            service
                .process(request("credit", id, 250, "SAME-REF"), &cancel)
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().transaction_id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(service.get_account(id).await.unwrap().balance, 250);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() {
    let service = build();
    let a = open(&service, 100_000, 0).await;
    let b = open(&service, 100_000, 0).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let req = TransactionRequest {
                target_account_id: Some(to.to_string()),
                ..request("transfer", from, 1_000, &format!("X-{}", i))
            };
            service.process(req, &cancel).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, TransactionStatus::Success);
    }

    let total = service.get_account(a).await.unwrap().balance
        + service.get_account(b).await.unwrap().balance;
    assert_eq!(total, 200_000);
}

#[tokio::test]
async fn test_transfer_events_reach_subscribers_after_commit() {
    let service = build();
    let cancel = CancellationToken::new();
    let from = open(&service, 5_000, 0).await;
    let to = open(&service, 0, 0).await;
    let mut events = service.publisher().subscribe();

    let response = service
        .process(
            TransactionRequest {
                target_account_id: Some(to.to_string()),
                ..request("transfer", from, 1_500, "EVT-1")
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(response.status, TransactionStatus::Success);

    let debit = events.recv().await.unwrap();
    let credit = events.recv().await.unwrap();
    match (&debit, &credit) {
        (
            DomainEvent::TransactionProcessed { transaction: d, .. },
            DomainEvent::TransactionProcessed { transaction: c, .. },
        ) => {
            assert_eq!(d.account_id, from);
            assert_eq!(d.reference_id, "EVT-1-DEBIT");
            assert_eq!(c.account_id, to);
            assert_eq!(c.reference_id, "EVT-1-CREDIT");
        }
        other => panic!("unexpected events: {:?}", other),
    }
}
