//! Command-line surface over the ledger service.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use ledger_hex::LedgerService;
use ledger_types::{
    AccountId, ClientId, CreateAccountRequest, EventPublisher, LedgerStore, Metadata,
    ORIGINAL_REFERENCE_KEY, TransactionId, TransactionRequest,
};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author, version, about = "Financial ledger engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an account (registers the client if unknown)
    CreateAccount {
        /// Client ID (UUID); a new client is generated when omitted
        #[arg(long)]
        client: Option<String>,
        /// Opening balance in minor units
        #[arg(long, default_value_t = 0)]
        initial_balance: i64,
        /// Overdraft allowance in minor units
        #[arg(long, default_value_t = 0)]
        credit_limit: i64,
        #[arg(long, default_value = "BRL")]
        currency: String,
    },
    /// Apply one ledger operation
    Process(ProcessArgs),
    /// Process a JSON array of requests read from a file
    Batch {
        file: PathBuf,
    },
    /// Show an account
    Account {
        /// Account ID (UUID)
        id: String,
    },
    /// List a client's accounts
    Accounts {
        /// Client ID (UUID)
        client: String,
    },
    /// Show a stored transaction
    Transaction {
        /// Transaction ID (UUID)
        id: String,
    },
    /// List an account's transactions, newest first
    History {
        account: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Block an account
    Block { id: String },
    /// Unblock an account
    Unblock { id: String },
}

#[derive(Args)]
pub struct ProcessArgs {
    /// credit, debit, reserve, capture, reversal or transfer
    pub operation: String,
    #[arg(long)]
    pub account: String,
    /// Amount in minor units
    #[arg(long)]
    pub amount: i64,
    #[arg(long, default_value = "BRL")]
    pub currency: String,
    /// Idempotency key
    #[arg(long)]
    pub reference: String,
    /// Destination account for transfers
    #[arg(long)]
    pub target: Option<String>,
    /// Reference id of the transaction a reversal undoes
    #[arg(long)]
    pub original: Option<String>,
    /// Extra metadata as a JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

impl ProcessArgs {
    pub fn into_request(self) -> Result<TransactionRequest> {
        let mut metadata = match self.metadata.as_deref() {
            Some(raw) => serde_json::from_str::<Metadata>(raw)
                .map_err(|e| anyhow::anyhow!("--metadata must be a JSON object: {}", e))?,
            None => Metadata::new(),
        };
        if let Some(original) = self.original {
            metadata.insert(ORIGINAL_REFERENCE_KEY.into(), original.into());
        }

        Ok(TransactionRequest {
            operation: self.operation,
            account_id: self.account,
            amount: self.amount,
            currency: self.currency,
            reference_id: self.reference,
            metadata: (!metadata.is_empty()).then_some(metadata),
            target_account_id: self.target,
        })
    }
}

fn parse_account_id(s: &str) -> Result<AccountId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid account ID: {}", s))
}

fn parse_client_id(s: &str) -> Result<ClientId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid client ID: {}", s))
}

fn parse_transaction_id(s: &str) -> Result<TransactionId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid transaction ID: {}", s))
}

/// Runs one command and returns its result as pretty JSON.
pub async fn execute<S, P>(
    service: &LedgerService<S, P>,
    command: Commands,
    cancel: &CancellationToken,
) -> Result<String>
where
    S: LedgerStore,
    P: EventPublisher,
{
    let output = match command {
        Commands::CreateAccount {
            client,
            initial_balance,
            credit_limit,
            currency,
        } => {
            let client_id = match client {
                Some(raw) => parse_client_id(&raw)?,
                None => ClientId::new(),
            };
            let account = service
                .create_account(CreateAccountRequest {
                    client_id: client_id.to_string(),
                    initial_balance,
                    credit_limit,
                    currency,
                })
                .await?;
            serde_json::to_string_pretty(&account)?
        }

        Commands::Process(args) => {
            let response = service.process(args.into_request()?, cancel).await?;
            serde_json::to_string_pretty(&response)?
        }

        Commands::Batch { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", file.display(), e))?;
            let requests: Vec<TransactionRequest> = serde_json::from_str(&raw)?;
            let responses = service.process_batch(requests, cancel).await?;
            serde_json::to_string_pretty(&responses)?
        }

        Commands::Account { id } => {
            let account = service.get_account(parse_account_id(&id)?).await?;
            serde_json::to_string_pretty(&account)?
        }

        Commands::Accounts { client } => {
            let accounts = service
                .list_client_accounts(parse_client_id(&client)?)
                .await?;
            serde_json::to_string_pretty(&accounts)?
        }

        Commands::Transaction { id } => {
            let tx = service
                .get_transaction(parse_transaction_id(&id)?)
                .await?;
            serde_json::to_string_pretty(&tx)?
        }

        Commands::History { account, limit } => {
            let txs = service
                .list_account_transactions(parse_account_id(&account)?, limit)
                .await?;
            serde_json::to_string_pretty(&txs)?
        }

        Commands::Block { id } => {
            let account = service.block_account(parse_account_id(&id)?).await?;
            serde_json::to_string_pretty(&account)?
        }

        Commands::Unblock { id } => {
            let account = service.unblock_account(parse_account_id(&id)?).await?;
            serde_json::to_string_pretty(&account)?
        }
    };

    Ok(output)
}
