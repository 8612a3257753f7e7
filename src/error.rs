use crate::domain::ids::{AgentId, DepositId, LoanId, SagaId};
use crate::domain::money::{Currency, Money};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Insufficient funds for {agent}: required {required} {currency}, available {available}")]
    InsufficientFunds {
        agent: AgentId,
        currency: Currency,
        required: Money,
        available: Money,
    },
    #[error("Credit rejected for {borrower}: {reason}")]
    CreditRejected { borrower: AgentId, reason: String },
    #[error("Reserve requirement violated: required {required}, available {available}")]
    ReserveViolation { required: Money, available: Money },
    #[error("Saga {saga_id} failed in {stage}: {reason}")]
    SagaStepFailure {
        saga_id: SagaId,
        stage: String,
        reason: String,
    },
    #[error("Rollback integrity error: {0}")]
    RollbackIntegrity(String),
    #[error("Protocol violation: {collaborator} does not provide {capability}")]
    ProtocolViolation {
        collaborator: String,
        capability: String,
    },
    #[error("Balance overflow for {agent}: cannot credit {amount} {currency}")]
    BalanceOverflow {
        agent: AgentId,
        currency: Currency,
        amount: Money,
    },
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),
    #[error("Unknown loan: {0}")]
    UnknownLoan(LoanId),
    #[error("Unknown deposit: {0}")]
    UnknownDeposit(DepositId),
    #[error("Unknown saga: {0}")]
    UnknownSaga(SagaId),
    #[error("Unauthorized: {agent} is not the monetary authority")]
    Unauthorized { agent: AgentId },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl KernelError {
    /// Errors that must halt the simulation instead of being absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KernelError::RollbackIntegrity(_) | KernelError::ProtocolViolation { .. }
        )
    }

    pub(crate) fn step_failure(
        saga_id: SagaId,
        stage: impl ToString,
        reason: impl ToString,
    ) -> Self {
        KernelError::SagaStepFailure {
            saga_id,
            stage: stage.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for KernelError {
    fn from(err: rocksdb::Error) -> Self {
        KernelError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
