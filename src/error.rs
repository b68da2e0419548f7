use crate::types::{Account, Hash};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
    #[error("Corrupt block log record at line {line} - Reason: {reason}")]
    CorruptRecord { line: usize, reason: String },
    #[error("Next expected block must be {expected}, not {got}")]
    BlockNumberMismatch { expected: u64, got: u64 },
    #[error("Block number {0} leaves no room for a successor")]
    BlockNumberExhausted(u64),
    #[error("Next block parent hash must be {expected}, not {got}")]
    ParentMismatch { expected: Hash, got: Hash },
    #[error("Insufficient balance of {account}: has {balance}, needs {value}")]
    InsufficientBalance {
        account: Account,
        balance: u64,
        value: u64,
    },
    #[error("Balance of {0} would overflow")]
    BalanceOverflow(Account),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Peer {0} answered with error: {1}")]
    RemoteError(String, String),
    #[error("Peer {0} unreachable: {1}")]
    PeerUnreachable(String, String),
    #[error("Unable to join known peers of {0}: {1}")]
    PeerRegistration(String, String),
    #[error("Channel failure for: {0} - Failure: {1}")]
    ChannelFailure(String, String),
    #[error("Failed to bind API to {0}: {1}")]
    Bind(String, String),
}

impl Error {
    /// The block does not extend the current tip.
    pub fn is_continuity(&self) -> bool {
        matches!(
            self,
            Error::BlockNumberMismatch { .. }
                | Error::BlockNumberExhausted(_)
                | Error::ParentMismatch { .. }
        )
    }

    /// A transaction could not be applied to the balances.
    pub fn is_balance(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. } | Error::BalanceOverflow(_)
        )
    }

    /// Caused by the caller's input rather than by this node.
    pub fn is_rejection(&self) -> bool {
        self.is_continuity()
            || self.is_balance()
            || matches!(self, Error::InvalidHash(_) | Error::Json(_))
    }
}
