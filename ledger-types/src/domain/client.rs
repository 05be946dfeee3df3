//! Client aggregate root. Owns accounts and opens new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::Account;
use super::events::DomainEvent;
use super::id::uuid_id;
use super::money::Money;
use crate::error::DomainError;

uuid_id!(
    /// Unique identifier for a Client.
    ClientId
);

/// An account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// Tax or identity document, unique across clients.
    pub document: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Registers a new client.
    ///
    /// # Validation
    /// - name, document and email cannot be empty
    pub fn new(
        name: impl Into<String>,
        document: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Self::with_id(ClientId::new(), name, document, email)
    }

    /// Registers a client under a caller-chosen id.
    pub fn with_id(
        id: ClientId,
        name: impl Into<String>,
        document: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let (name, document, email) = (name.into(), document.into(), email.into());

        for (field, value) in [("name", &name), ("document", &document), ("email", &email)] {
            if value.trim().is_empty() {
                return Err(DomainError::ValidationError(format!(
                    "Client {} cannot be empty",
                    field
                )));
            }
        }

        Ok(Self {
            id,
            name,
            document,
            email,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    /// Placeholder registration used when an account is opened for an
    /// unknown client id.
    pub fn placeholder(id: ClientId) -> Self {
        let simple = id.as_uuid().simple().to_string();
        Self {
            id,
            name: format!("Client-{}", id),
            document: format!("DOC-{}", simple),
            email: format!("client{}@ledger.local", simple),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Opens an account owned by this client.
    pub fn open_account(
        &self,
        initial_balance: Money,
        credit_limit: Money,
    ) -> Result<(Account, DomainEvent), DomainError> {
        let account = Account::open(self.id, initial_balance, credit_limit)?;
        let event = DomainEvent::account_created(&account);
        Ok((account, event))
    }

    pub fn activate(&mut self) {
        self.is_active = true;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
