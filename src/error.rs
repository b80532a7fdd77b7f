use ethers::types::U256;
use thiserror::Error;

use crate::transfer::ActiveStateType;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed merkle proof: right bound {right} is below left bound {left}")]
    MalformedMerkleProof { left: U256, right: U256 },

    #[error("transfer {id} has no {kind} active state")]
    MissingActiveState { id: u64, kind: ActiveStateType },

    #[error("matched amounts of swap {tx_id} went backwards across eons")]
    MatchedAmountsRegressed { tx_id: String },

    #[error("wallet has no trail identifier yet")]
    NotRegistered,

    #[error("balance is negative and can not be marked")]
    NegativeBalance,

    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed address: {0}")]
    Address(String),

    #[error("pong not received in time")]
    PongTimeout,

    #[error("connection closed by operator")]
    ConnectionClosed,

    #[error("cancelled")]
    Cancelled,

    #[error("synchronizer is no longer running")]
    Stopped,
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("operator answered {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("malformed operator response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type OperatorResult<T> = Result<T, OperatorError>;
