//! Operator session.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use stockroom_core::OperatorId;
use stockroom_infra::{InventoryStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown operator or wrong credential. Which one is not revealed.
    #[error("invalid operator id or credential")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The logged-in operator. Passed to whatever needs to know who acts.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    operator: OperatorId,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Check the operator against the store once; no session on mismatch.
    pub fn login<S>(store: &S, operator: &str, credential: &str) -> Result<Self, SessionError>
    where
        S: InventoryStore + ?Sized,
    {
        let Ok(operator) = OperatorId::new(operator) else {
            warn!("login rejected: empty operator id");
            return Err(SessionError::InvalidCredentials);
        };

        if !store.verify_credentials(&operator, credential.trim())? {
            warn!(operator = %operator, "login rejected");
            return Err(SessionError::InvalidCredentials);
        }

        info!(operator = %operator, "operator logged in");
        Ok(Self {
            operator,
            started_at: Utc::now(),
        })
    }

    pub fn operator(&self) -> &OperatorId {
        &self.operator
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_infra::InMemoryStore;

    fn store() -> InMemoryStore {
        InMemoryStore::new().with_operator(OperatorId::new("1001").unwrap(), "Smith")
    }

    #[test]
    fn matching_credentials_open_a_session() {
        let session = Session::login(&store(), " 1001 ", "Smith").unwrap();
        assert_eq!(session.operator().as_str(), "1001");
    }

    #[test]
    fn mismatch_yields_no_session() {
        let store = store();
        assert!(matches!(
            Session::login(&store, "1001", "Jones"),
            Err(SessionError::InvalidCredentials)
        ));
        assert!(matches!(
            Session::login(&store, "2002", "Smith"),
            Err(SessionError::InvalidCredentials)
        ));
        assert!(matches!(
            Session::login(&store, "  ", "Smith"),
            Err(SessionError::InvalidCredentials)
        ));
    }
}
