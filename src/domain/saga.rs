use super::ids::{AgentId, ApplicationId, LoanId, PropertyId, SagaId, Tick};
use super::loan::BorrowerProfile;
use super::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Initiated,
    CreditCheck,
    Approved,
    EscrowLocked,
    TransferTitle,
    Completed,
    FailedRolledBack,
    Cancelled,
}

impl SagaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::FailedRolledBack | SagaStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Initiated => "INITIATED",
            SagaStatus::CreditCheck => "CREDIT_CHECK",
            SagaStatus::Approved => "APPROVED",
            SagaStatus::EscrowLocked => "ESCROW_LOCKED",
            SagaStatus::TransferTitle => "TRANSFER_TITLE",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::FailedRolledBack => "FAILED_ROLLED_BACK",
            SagaStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a participant captured when the purchase was initiated.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ParticipantSnapshot {
    pub agent_id: Option<AgentId>,
    pub cash: Money,
    pub income: Money,
    pub existing_debt_payments: Money,
}

impl ParticipantSnapshot {
    pub fn of(agent_id: AgentId) -> Self {
        Self {
            agent_id: Some(agent_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LoanApplication {
    pub applicant: AgentId,
    pub lender: AgentId,
    pub principal: Money,
    pub property_id: PropertyId,
    pub property_value: Money,
    pub profile: BorrowerProfile,
    pub staged_id: Option<ApplicationId>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MortgageApproval {
    pub loan_id: LoanId,
    pub lender: AgentId,
    pub principal: Money,
    pub rate: Decimal,
    pub term: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SagaLogEntry {
    pub tick: Tick,
    pub status: SagaStatus,
    pub message: String,
}

/// Multi-tick housing purchase. Owned by the orchestrator and only ever
/// reached through its id.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct HousingSaga {
    pub id: SagaId,
    pub status: SagaStatus,
    pub buyer: ParticipantSnapshot,
    pub seller: ParticipantSnapshot,
    pub property_id: PropertyId,
    pub offer_price: Money,
    pub down_payment: Money,
    pub loan_application: Option<LoanApplication>,
    pub mortgage_approval: Option<MortgageApproval>,
    pub staged_loan_id: Option<LoanId>,
    pub lien_attached: bool,
    pub property_locked: bool,
    pub escrow_settled: bool,
    pub error_message: Option<String>,
    pub last_processed_tick: Option<Tick>,
    pub log: Vec<SagaLogEntry>,
}

impl HousingSaga {
    pub fn new(
        id: SagaId,
        buyer: ParticipantSnapshot,
        seller: ParticipantSnapshot,
        property_id: PropertyId,
        offer_price: Money,
        down_payment: Money,
    ) -> Self {
        Self {
            id,
            status: SagaStatus::Initiated,
            buyer,
            seller,
            property_id,
            offer_price,
            down_payment,
            loan_application: None,
            mortgage_approval: None,
            staged_loan_id: None,
            lien_attached: false,
            property_locked: false,
            escrow_settled: false,
            error_message: None,
            last_processed_tick: None,
            log: Vec::new(),
        }
    }

    pub fn buyer_id(&self) -> Option<AgentId> {
        self.buyer.agent_id
    }

    pub fn seller_id(&self) -> Option<AgentId> {
        self.seller.agent_id
    }

    /// Amount the buyer borrows: price less the down payment.
    pub fn principal(&self) -> Money {
        self.offer_price.saturating_sub(self.down_payment)
    }

    pub fn involves(&self, agent: AgentId) -> bool {
        self.buyer_id() == Some(agent) || self.seller_id() == Some(agent)
    }

    pub(crate) fn record(&mut self, tick: Tick, message: impl Into<String>) {
        self.log.push(SagaLogEntry {
            tick,
            status: self.status,
            message: message.into(),
        });
    }

    pub(crate) fn transition(&mut self, tick: Tick, next: SagaStatus) {
        let message = format!("{} -> {}", self.status, next);
        self.status = next;
        self.record(tick, message);
    }
}
