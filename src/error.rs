//! Error taxonomy for chain access and watcher handlers

use alloy::primitives::B256;
use std::fmt;
use thiserror::Error;

use crate::retry::{classify_error, ErrorClass};

/// Errors returned by a chain client
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC or network hiccup; retried on the next poll
    #[error("transient rpc error: {0}")]
    Transient(String),

    #[error("nonce too low: {0}")]
    NonceTooLow(String),

    /// The call reverted during estimation or execution
    #[error("call exception: {0}")]
    CallException(String),

    /// Mined with `status = 0`
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rpc error: {0}")]
    Other(String),
}

impl ChainError {
    /// Build a `ChainError` from an RPC/provider error message.
    pub fn from_rpc(err: impl fmt::Display) -> Self {
        let msg = err.to_string();
        match classify_error(&msg) {
            ErrorClass::Transient => ChainError::Transient(msg),
            ErrorClass::NonceTooLow => ChainError::NonceTooLow(msg),
            ErrorClass::CallException => ChainError::CallException(msg),
            ErrorClass::Unknown => ChainError::Other(msg),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transient(_))
    }
}

/// Errors surfaced by a watcher handler
#[derive(Debug, Error)]
pub enum BonderError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Permanent per-record give-up
    #[error("{0} not found")]
    NotFound(String),

    /// Insufficient credit or balance; deferred to a later poll
    #[error("bond error: {0}")]
    Bond(String),

    /// Anything else; escalates to process exit
    #[error("{0:#}")]
    Unexpected(eyre::Report),
}

impl From<eyre::Report> for BonderError {
    fn from(e: eyre::Report) -> Self {
        BonderError::Unexpected(e)
    }
}

/// How a watcher loop reacts to a handler error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    NotFound,
    Deferred,
    Reverted,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Deferred => "deferred",
            ErrorKind::Reverted => "reverted",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl BonderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BonderError::Chain(ChainError::Reverted { .. }) => ErrorKind::Reverted,
            BonderError::Chain(ChainError::NotFound(_)) | BonderError::NotFound(_) => {
                ErrorKind::NotFound
            }
            BonderError::Chain(_) => ErrorKind::Transient,
            BonderError::Bond(_) => ErrorKind::Deferred,
            BonderError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result of handling a single work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A transaction was mined successfully
    Sent { tx_hash: B256 },
    /// The record already reached its target state, possibly through another bonder
    AlreadyHandled,
    /// Preconditions not met this cycle
    Skipped,
    /// Dry mode: the action was logged but not sent
    DryRun,
}

pub type HandlerResult = Result<Outcome, BonderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rpc_classification() {
        assert!(ChainError::from_rpc("request timed out").is_transient());
        assert!(matches!(
            ChainError::from_rpc("nonce too low: next nonce 5"),
            ChainError::NonceTooLow(_)
        ));
        assert!(matches!(
            ChainError::from_rpc("execution reverted: L2_BRG: Not enough credit"),
            ChainError::CallException(_)
        ));
        assert!(matches!(ChainError::from_rpc("weird"), ChainError::Other(_)));
    }

    #[test]
    fn test_error_kinds() {
        let reverted = BonderError::from(ChainError::Reverted { tx_hash: B256::ZERO });
        assert_eq!(reverted.kind(), ErrorKind::Reverted);
        assert_eq!(BonderError::Bond("credit".into()).kind(), ErrorKind::Deferred);
        assert_eq!(BonderError::NotFound("transfer".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            BonderError::from(ChainError::Transient("503".into())).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            BonderError::from(eyre::eyre!("db down")).kind(),
            ErrorKind::Unexpected
        );
    }
}
