use super::ids::{AgentId, LoanId, SagaId, Tick};
use super::money::Money;
use super::saga::SagaStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    LoanDefault,
    Liquidation,
    SagaFinished,
    ConservationViolation,
}

/// Published when a loan misses too many consecutive payments.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LoanDefaultEvent {
    pub event_type: String,
    pub tick: Tick,
    pub agent_id: AgentId,
    pub loan_id: LoanId,
    pub defaulted_amount: Money,
    pub creditor_id: AgentId,
}

impl LoanDefaultEvent {
    pub const EVENT_TYPE: &'static str = "LOAN_DEFAULT";

    pub fn new(
        tick: Tick,
        agent_id: AgentId,
        loan_id: LoanId,
        defaulted_amount: Money,
        creditor_id: AgentId,
    ) -> Self {
        Self {
            event_type: Self::EVENT_TYPE.to_string(),
            tick,
            agent_id,
            loan_id,
            defaulted_amount,
            creditor_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelEvent {
    LoanDefault(LoanDefaultEvent),
    Liquidation {
        tick: Tick,
        debtor: AgentId,
        creditor: AgentId,
        loan_id: LoanId,
        cash_seized: Money,
        asset_value: Money,
    },
    SagaFinished {
        tick: Tick,
        saga_id: SagaId,
        status: SagaStatus,
        buyer: Option<AgentId>,
        seller: Option<AgentId>,
    },
    ConservationViolation {
        tick: Tick,
        expected: Money,
        actual: Money,
    },
}

impl KernelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            KernelEvent::LoanDefault(_) => EventKind::LoanDefault,
            KernelEvent::Liquidation { .. } => EventKind::Liquidation,
            KernelEvent::SagaFinished { .. } => EventKind::SagaFinished,
            KernelEvent::ConservationViolation { .. } => EventKind::ConservationViolation,
        }
    }
}
