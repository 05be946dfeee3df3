//! Ledger Application Service
//!
//! Orchestrates domain operations through the store and publisher ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! Every balance operation follows the same path: idempotency check,
//! locked fetch, pure mutation on the aggregate, atomic persist, commit,
//! then event publishing. Transient store failures are retried with fresh
//! state.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ledger_types::{
    Account, AccountId, AccountResponse, AppError, BATCH_ITEM_ERROR, Client, ClientId,
    CreateAccountRequest, DomainEvent, EventPublisher, LedgerError, LedgerStore, Metadata, Money,
    Mutation, ORIGINAL_REFERENCE_KEY, Operation, PROCESSING_ERROR, ProcessCommand, RepoError,
    Transaction, TransactionDetails, TransactionId, TransactionRequest, TransactionResponse,
    UnitOfWork,
};

use crate::retry::RetryPolicy;

/// Reason recorded when the operated account does not exist.
pub const ACCOUNT_NOT_FOUND: &str = "account not found";

/// Message for requests abandoned through their cancellation token.
pub const OPERATION_CANCELLED: &str = "operation cancelled";

/// Tunables that are not part of the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Largest accepted batch.
    pub batch_limit: usize,
    /// Upper bound for one transactional attempt before commit.
    pub attempt_timeout: Duration,
    /// History page size when the caller gives none.
    pub default_history_limit: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            attempt_timeout: Duration::from_secs(30),
            default_history_limit: 50,
        }
    }
}

/// A finished operation: the transaction to return and the events to publish.
#[derive(Debug)]
struct Outcome {
    transaction: Transaction,
    events: Vec<DomainEvent>,
}

impl From<Mutation> for Outcome {
    fn from(mutation: Mutation) -> Self {
        Self {
            transaction: mutation.transaction,
            events: mutation.events,
        }
    }
}

/// What an attempt staged on its unit of work.
#[derive(Debug)]
enum Staged {
    /// Writes are staged; commit them.
    Commit(Outcome),
    /// Nothing to write (replay or missing account); roll back.
    Discard(Transaction),
}

/// The reference a command is recorded under.
///
/// A transfer is stored as two records, `<ref>-DEBIT` and `<ref>-CREDIT`;
/// the debit leg answers for the transfer.
fn idempotency_key(cmd: &ProcessCommand) -> String {
    match cmd.operation {
        Operation::Transfer => debit_leg(&cmd.reference_id),
        _ => cmd.reference_id.clone(),
    }
}

fn debit_leg(reference_id: &str) -> String {
    format!("{}-DEBIT", reference_id)
}

fn credit_leg(reference_id: &str) -> String {
    format!("{}-CREDIT", reference_id)
}

/// Applies one primitive operation to a locked account.
fn apply(
    account: &mut Account,
    operation: Operation,
    amount: Money,
    reference_id: String,
    metadata: Metadata,
) -> Result<Mutation, LedgerError> {
    let mutation = match operation {
        Operation::Credit => account.credit(amount, reference_id, metadata)?,
        Operation::Debit => account.debit(amount, reference_id, metadata)?,
        Operation::Reserve => account.reserve(amount, reference_id, metadata)?,
        Operation::Capture => account.capture(amount, reference_id, metadata)?,
        other => {
            return Err(LedgerError::Precondition(format!(
                "{} is not a primitive operation",
                other
            )));
        }
    };
    Ok(mutation)
}

/// Application service for ledger operations.
///
/// Generic over the store and publisher ports so adapters are injected at
/// compile time and tests can run against the in-memory store.
pub struct LedgerService<S: LedgerStore, P: EventPublisher> {
    store: S,
    publisher: P,
    retry: RetryPolicy,
    settings: ServiceSettings,
}

impl<S: LedgerStore, P: EventPublisher> LedgerService<S, P> {
    /// Creates a service with the default retry policy and settings.
    pub fn new(store: S, publisher: P) -> Self {
        Self::with_policy(store, publisher, RetryPolicy::default(), ServiceSettings::default())
    }

    pub fn with_policy(
        store: S,
        publisher: P,
        retry: RetryPolicy,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            publisher,
            retry,
            settings,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction processing
    // ─────────────────────────────────────────────────────────────────────────────

    /// Validates and processes one request.
    ///
    /// Only malformed input is returned as an error. Every other outcome,
    /// including precondition failures and exhausted retries, comes back as a
    /// response with `status = failed`.
    pub async fn process(
        &self,
        req: TransactionRequest,
        cancel: &CancellationToken,
    ) -> Result<TransactionResponse, AppError> {
        let cmd = req.validate()?;
        Ok(self.respond(cmd, cancel).await)
    }

    /// Processes up to `batch_limit` requests in order.
    ///
    /// Items are independent: an invalid or failing item yields a failed
    /// response and the batch carries on.
    pub async fn process_batch(
        &self,
        requests: Vec<TransactionRequest>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransactionResponse>, AppError> {
        if requests.is_empty() {
            return Err(AppError::BadRequest("Batch cannot be empty".into()));
        }
        if requests.len() > self.settings.batch_limit {
            return Err(AppError::BadRequest(format!(
                "Batch cannot exceed {} transactions",
                self.settings.batch_limit
            )));
        }

        info!(size = requests.len(), "Processing batch");
        let mut responses = Vec::with_capacity(requests.len());
        for (index, req) in requests.into_iter().enumerate() {
            let response = match req.validate() {
                Ok(cmd) => self.respond(cmd, cancel).await,
                Err(e) => {
                    warn!(index, reference_id = %req.reference_id, error = %e, "Rejected batch item");
                    TransactionResponse::failed(BATCH_ITEM_ERROR)
                }
            };
            responses.push(response);
        }
        Ok(responses)
    }

    async fn respond(&self, cmd: ProcessCommand, cancel: &CancellationToken) -> TransactionResponse {
        match self.execute(cmd, cancel).await {
            Ok(tx) => TransactionResponse::from(&tx),
            Err(LedgerError::Validation(msg))
            | Err(LedgerError::Precondition(msg))
            | Err(LedgerError::NotFound(msg)) => TransactionResponse::failed(msg),
            Err(LedgerError::Cancelled) => TransactionResponse::failed(OPERATION_CANCELLED),
            Err(e) => {
                error!(error = %e, "Transaction processing failed");
                TransactionResponse::failed(PROCESSING_ERROR)
            }
        }
    }

    /// Runs one typed command to a persisted, idempotent transaction.
    ///
    /// Business failures (insufficient funds and the like) are `Ok` with a
    /// failed transaction. Errors are preconditions, missing transfer
    /// targets or reversal sources, cancellation, and store failures left
    /// after the retry policy gave up.
    #[tracing::instrument(
        skip(self, cmd, cancel),
        fields(
            reference_id = %cmd.reference_id,
            account_id = %cmd.account_id,
            operation = %cmd.operation,
        )
    )]
    pub async fn execute(
        &self,
        cmd: ProcessCommand,
        cancel: &CancellationToken,
    ) -> Result<Transaction, LedgerError> {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let key = idempotency_key(&cmd);
        if let Some(existing) = self.store.find_transaction_by_reference(&key).await? {
            info!(transaction_id = %existing.id, "Idempotent replay");
            return Ok(existing);
        }

        let (cmd, key) = (&cmd, key.as_str());
        let result = self
            .retry
            .run(cancel, move |attempt| self.attempt(cmd, key, attempt, cancel))
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(LedgerError::Repo(RepoError::DuplicateReference(_))) => {
                // A concurrent request with the same reference committed first.
                let winner = self
                    .store
                    .find_transaction_by_reference(key)
                    .await?
                    .ok_or_else(|| RepoError::DuplicateReference(key.to_string()))?;
                info!(transaction_id = %winner.id, "Lost reference race, returning winner");
                return Ok(winner);
            }
            Err(e) => return Err(e),
        };

        if outcome.transaction.is_success() {
            info!(transaction_id = %outcome.transaction.id, "Transaction committed");
        } else {
            info!(
                transaction_id = %outcome.transaction.id,
                reason = outcome.transaction.error_message.as_deref().unwrap_or_default(),
                "Transaction failed"
            );
        }

        self.publish_all(&outcome.events).await;
        Ok(outcome.transaction)
    }

    /// One transactional attempt on a fresh unit of work.
    async fn attempt(
        &self,
        cmd: &ProcessCommand,
        key: &str,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LedgerError> {
        debug!(attempt, "Starting attempt");
        let mut unit = self.store.begin().await?;

        let timeout = self.settings.attempt_timeout;
        let staged = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LedgerError::Cancelled),
            staged = tokio::time::timeout(timeout, self.stage(&mut unit, cmd, key)) => {
                staged.unwrap_or(Err(LedgerError::TimedOut(timeout)))
            }
        };

        match staged {
            // Past this point cancellation is not observed.
            Ok(Staged::Commit(outcome)) => {
                unit.commit().await?;
                Ok(outcome)
            }
            Ok(Staged::Discard(transaction)) => {
                unit.rollback().await?;
                Ok(Outcome {
                    transaction,
                    events: Vec::new(),
                })
            }
            Err(e) => {
                if let Err(rollback) = unit.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                if matches!(e, LedgerError::Cancelled) {
                    info!("Attempt cancelled before commit");
                }
                Err(e)
            }
        }
    }

    async fn stage(
        &self,
        unit: &mut S::Unit,
        cmd: &ProcessCommand,
        key: &str,
    ) -> Result<Staged, LedgerError> {
        // Re-checked inside the unit so a retry never records twice.
        if let Some(existing) = unit.find_transaction_by_reference(key).await? {
            return Ok(Staged::Discard(existing));
        }

        match cmd.operation {
            Operation::Transfer => self.stage_transfer(unit, cmd).await,
            Operation::Reversal => self.stage_reversal(unit, cmd).await,
            operation => {
                let Some(mut account) = unit.lock_account(cmd.account_id).await? else {
                    return Ok(Staged::Discard(Self::rejected(cmd, key)));
                };
                let mutation = apply(
                    &mut account,
                    operation,
                    cmd.amount,
                    cmd.reference_id.clone(),
                    cmd.metadata.clone(),
                )?;
                Self::persist(unit, &account, &mutation.transaction).await?;
                Ok(Staged::Commit(mutation.into()))
            }
        }
    }

    /// Debit on the source, credit on the target, both under lock.
    async fn stage_transfer(
        &self,
        unit: &mut S::Unit,
        cmd: &ProcessCommand,
    ) -> Result<Staged, LedgerError> {
        let target_id = cmd.target_account_id.ok_or_else(|| {
            LedgerError::Precondition("transfer requires a target account".into())
        })?;
        if target_id == cmd.account_id {
            return Err(LedgerError::Validation(
                "transfer target must differ from the source account".into(),
            ));
        }

        // Ascending id order on every path keeps two transfers from deadlocking.
        let (first, second) = if cmd.account_id < target_id {
            (cmd.account_id, target_id)
        } else {
            (target_id, cmd.account_id)
        };
        let first_row = unit.lock_account(first).await?;
        let second_row = unit.lock_account(second).await?;
        let (source, target) = if first == cmd.account_id {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        let debit_ref = debit_leg(&cmd.reference_id);
        let Some(mut source) = source else {
            return Ok(Staged::Discard(Self::rejected(cmd, &debit_ref)));
        };
        let Some(mut target) = target else {
            return Err(LedgerError::NotFound(format!(
                "target account {} not found",
                target_id
            )));
        };

        let debit = source.debit(cmd.amount, debit_ref, cmd.metadata.clone())?;
        if !debit.transaction.is_success() {
            unit.insert_transaction(&debit.transaction).await?;
            return Ok(Staged::Commit(debit.into()));
        }

        let credit = target.credit(
            cmd.amount,
            credit_leg(&cmd.reference_id),
            cmd.metadata.clone(),
        )?;

        Self::persist(unit, &source, &debit.transaction).await?;
        Self::persist(unit, &target, &credit.transaction).await?;

        let mut events = debit.events;
        events.extend(credit.events);
        Ok(Staged::Commit(Outcome {
            transaction: debit.transaction,
            events,
        }))
    }

    /// Compensates a successful credit or debit with its opposite.
    async fn stage_reversal(
        &self,
        unit: &mut S::Unit,
        cmd: &ProcessCommand,
    ) -> Result<Staged, LedgerError> {
        let original_ref = cmd
            .metadata
            .get(ORIGINAL_REFERENCE_KEY)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                LedgerError::Precondition(format!(
                    "reversal requires metadata '{}'",
                    ORIGINAL_REFERENCE_KEY
                ))
            })?;

        let original = unit
            .find_transaction_by_reference(original_ref)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("original transaction {} not found", original_ref))
            })?;
        if !original.is_success() {
            return Err(LedgerError::Precondition(format!(
                "only successful transactions can be reversed, {} is {}",
                original_ref, original.status
            )));
        }
        let opposite = match original.operation {
            Operation::Credit => Operation::Debit,
            Operation::Debit => Operation::Credit,
            other => {
                return Err(LedgerError::Precondition(format!(
                    "reversal of {} is not supported",
                    other
                )));
            }
        };

        let Some(mut account) = unit.lock_account(cmd.account_id).await? else {
            return Ok(Staged::Discard(Self::rejected(cmd, &cmd.reference_id)));
        };
        let mutation = apply(
            &mut account,
            opposite,
            original.amount,
            cmd.reference_id.clone(),
            cmd.metadata.clone(),
        )?;
        Self::persist(unit, &account, &mutation.transaction).await?;
        Ok(Staged::Commit(mutation.into()))
    }

    /// Stores the record; the account row is only written when it changed.
    async fn persist(
        unit: &mut S::Unit,
        account: &Account,
        transaction: &Transaction,
    ) -> Result<(), LedgerError> {
        if transaction.is_success() {
            unit.save_account(account).await?;
        }
        unit.insert_transaction(transaction).await?;
        Ok(())
    }

    fn rejected(cmd: &ProcessCommand, reference_id: &str) -> Transaction {
        warn!(account_id = %cmd.account_id, "Account not found");
        Transaction::rejected(
            cmd.account_id,
            cmd.operation,
            cmd.amount,
            reference_id.to_string(),
            ACCOUNT_NOT_FOUND,
        )
    }

    async fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            if let Err(e) = self.publisher.publish(event).await {
                warn!(event = event.name(), error = %e, "Failed to publish event");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens an account, registering a placeholder client when the client id
    /// is unknown.
    #[tracing::instrument(skip(self, req), fields(client_id = %req.client_id))]
    pub async fn create_account(
        &self,
        req: CreateAccountRequest,
    ) -> Result<AccountResponse, AppError> {
        let cmd = req.validate()?;

        let (client, is_new) = match self.store.get_client(cmd.client_id).await? {
            Some(client) => (client, false),
            None => (Client::placeholder(cmd.client_id), true),
        };
        if !client.is_active {
            return Err(AppError::BadRequest(format!(
                "Client {} is not active",
                client.id
            )));
        }

        let (account, event) = client.open_account(cmd.initial_balance, cmd.credit_limit)?;

        let mut unit = self.store.begin().await?;
        if is_new {
            unit.insert_client(&client).await?;
        }
        unit.insert_account(&account).await?;
        unit.commit().await?;

        info!(account_id = %account.id(), new_client = is_new, "Account created");
        self.publish_all(std::slice::from_ref(&event)).await;
        Ok(AccountResponse::from(&account))
    }

    /// Gets an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<AccountResponse, AppError> {
        self.store
            .get_account(id)
            .await?
            .map(|account| AccountResponse::from(&account))
            .ok_or_else(|| AppError::NotFound(format!("Account {}", id)))
    }

    /// Lists a client's accounts.
    pub async fn list_client_accounts(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<AccountResponse>, AppError> {
        if self.store.get_client(client_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Client {}", client_id)));
        }

        let accounts = self.store.list_accounts_for_client(client_id).await?;
        Ok(accounts.iter().map(AccountResponse::from).collect())
    }

    pub async fn block_account(&self, id: AccountId) -> Result<AccountResponse, AppError> {
        self.set_blocked(id, true).await
    }

    pub async fn unblock_account(&self, id: AccountId) -> Result<AccountResponse, AppError> {
        self.set_blocked(id, false).await
    }

    #[tracing::instrument(skip(self))]
    async fn set_blocked(&self, id: AccountId, blocked: bool) -> Result<AccountResponse, AppError> {
        let cancel = CancellationToken::new();
        let (account, event) = self
            .retry
            .run(&cancel, move |_| async move {
                let mut unit = self.store.begin().await?;
                let Some(mut account) = unit.lock_account(id).await? else {
                    return Err(LedgerError::NotFound(format!("Account {}", id)));
                };
                let event = if blocked {
                    account.block()
                } else {
                    account.unblock()
                };
                unit.save_account(&account).await?;
                unit.commit().await?;
                Ok((account, event))
            })
            .await?;

        info!(status = %account.status(), "Account status changed");
        self.publish_all(std::slice::from_ref(&event)).await;
        Ok(AccountResponse::from(&account))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction History
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<TransactionDetails, AppError> {
        self.store
            .get_transaction(id)
            .await?
            .map(|tx| TransactionDetails::from(&tx))
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", id)))
    }

    /// Lists an account's transactions, newest first.
    pub async fn list_account_transactions(
        &self,
        account_id: AccountId,
        limit: Option<u32>,
    ) -> Result<Vec<TransactionDetails>, AppError> {
        // Verify account exists first
        if self.store.get_account(account_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Account {}", account_id)));
        }

        let limit = limit.unwrap_or(self.settings.default_history_limit);
        let txs = self
            .store
            .list_transactions_for_account(account_id, limit)
            .await?;
        Ok(txs.iter().map(TransactionDetails::from).collect())
    }
}
