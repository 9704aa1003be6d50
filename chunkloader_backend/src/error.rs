use thiserror::Error;

use crate::billing::LedgerError;
use crate::claims::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaseError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("chunk loader is not ready: reconciliation has not run")]
    NotLoaded,
    #[error("{pending} world commands are waiting for the host; drain them first")]
    Backlogged { pending: u64 },
}

impl From<LeaseError> for String {
    fn from(err: LeaseError) -> Self {
        err.to_string()
    }
}
