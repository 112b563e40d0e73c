use rust_decimal::Decimal;

use crate::policy::PolicyStatus;

/// Coarse classification of a [`PolicyError`], as seen by the caller deciding
/// whether to retry or abandon a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    CorruptState,
    InvalidArgument,
    PreconditionFailed,
    HostFailure,
}

#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    #[error("policy {0} does not exist")]
    NotFound(u64),
    #[error("policy counter does not exist, the ledger has not been initialised")]
    NotInitialized,
    #[error("stored value under '{key}' is corrupt: {reason}")]
    CorruptState { key: String, reason: String },
    #[error("policy id {0} is already in use")]
    IdInUse(u64),

    #[error("package {0} does not exist")]
    UnknownPackage(String),
    #[error("amount must be greater than zero, got {0}")]
    InvalidAmount(Decimal),
    #[error("installment number must be greater than zero")]
    InvalidInstallmentNo,
    #[error("profit percentage must be greater than zero, got {0}")]
    InvalidProfitRate(Decimal),
    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),

    #[error("policy {id} is {status}, the operation requires an active policy")]
    NotActive { id: u64, status: PolicyStatus },
    #[error("maximum number of premium payments reached ({0})")]
    InstallmentLimitReached(u32),
    #[error("payment can only be made {required}s after the last one, {elapsed}s elapsed")]
    TooSoon { elapsed: i64, required: i64 },
    #[error("coverage for policy {0} has already been claimed")]
    AlreadyClaimed(u64),
    #[error("policy {0} has already been cancelled")]
    AlreadyCancelled(u64),
    #[error("total paid {paid} is below the premium to pay {required}")]
    PremiumShortfall { paid: Decimal, required: Decimal },
    #[error("total paid {paid} already covers the premium to pay {required}, claim instead")]
    PremiumAlreadyComplete { paid: Decimal, required: Decimal },
    #[error("policy {0} has not reached its expiration date")]
    NotExpired(u64),
    #[error("ledger is already initialised")]
    AlreadyInitialized,

    #[error("transaction {0} conflicted with a concurrent commit")]
    Conflict(String),
    #[error("ledger storage failure")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
}

impl PolicyError {
    pub fn corrupt(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PolicyError::CorruptState {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::NotFound(_) | PolicyError::NotInitialized => ErrorKind::NotFound,
            PolicyError::CorruptState { .. } | PolicyError::IdInUse(_) => ErrorKind::CorruptState,
            PolicyError::UnknownPackage(_)
            | PolicyError::InvalidAmount(_)
            | PolicyError::InvalidInstallmentNo
            | PolicyError::InvalidProfitRate(_)
            | PolicyError::Overflow(_) => ErrorKind::InvalidArgument,
            PolicyError::NotActive { .. }
            | PolicyError::InstallmentLimitReached(_)
            | PolicyError::TooSoon { .. }
            | PolicyError::AlreadyClaimed(_)
            | PolicyError::AlreadyCancelled(_)
            | PolicyError::PremiumShortfall { .. }
            | PolicyError::PremiumAlreadyComplete { .. }
            | PolicyError::NotExpired(_)
            | PolicyError::AlreadyInitialized => ErrorKind::PreconditionFailed,
            PolicyError::Conflict(_) | PolicyError::Storage(_) | PolicyError::Encode(_) => {
                ErrorKind::HostFailure
            }
        }
    }
}
