//! Contracts the kernel consumes from its collaborators, plus the
//! persistence ports for crash recovery.

use super::events::{EventKind, KernelEvent};
use super::ids::{AgentId, ApplicationId, DepositId, LoanId, PropertyId, SagaId, Tick};
use super::loan::{BorrowerProfile, CreditAssessment, Deposit, Loan};
use super::money::Money;
use super::saga::{HousingSaga, LoanApplication, MortgageApproval};
use crate::error::Result;
use async_trait::async_trait;

pub trait CreditScoringService {
    fn assess_creditworthiness(&self, profile: &BorrowerProfile, amount: Money)
    -> CreditAssessment;
}

/// Property registry. Locks are single-writer and keyed by saga id.
pub trait HousingService {
    fn register_property(&mut self, property: PropertyId, owner: AgentId) -> Result<()>;
    fn owner_of(&self, property: PropertyId) -> Option<AgentId>;
    fn lock_holder(&self, property: PropertyId) -> Option<SagaId>;
    fn set_under_contract(&mut self, property: PropertyId, saga_id: SagaId) -> Result<()>;
    fn release_contract(&mut self, property: PropertyId, saga_id: SagaId) -> Result<()>;
    fn add_lien(&mut self, property: PropertyId, loan_id: LoanId, amount: Money) -> Result<()>;
    fn remove_lien(&mut self, property: PropertyId, loan_id: LoanId) -> Result<()>;
    fn transfer_ownership(&mut self, property: PropertyId, from: AgentId, to: AgentId)
    -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected(String),
}

/// Anything able to book an underwritten mortgage.
pub trait MortgageLender {
    fn lender_id(&self) -> AgentId;
    fn book_mortgage(
        &mut self,
        application: &LoanApplication,
        tick: Tick,
    ) -> Result<MortgageApproval>;
}

pub trait LoanMarket {
    fn stage_mortgage_application(
        &mut self,
        application: &LoanApplication,
        tick: Tick,
    ) -> Result<ApplicationId>;
    fn check_staged_application_status(&self, id: ApplicationId, tick: Tick) -> ApplicationStatus;
    fn convert_staged_to_loan(
        &mut self,
        id: ApplicationId,
        lender: &mut dyn MortgageLender,
        tick: Tick,
    ) -> Result<MortgageApproval>;
    fn void_staged_application(&mut self, id: ApplicationId);
}

pub trait ParticipantDirectory {
    fn is_active(&self, agent: AgentId) -> bool;
}

/// External consumer of kernel events (credit freeze, reputation, seizure).
pub trait EventHandler {
    fn name(&self) -> &str;
    /// Event kinds this handler consumes. Must not be empty.
    fn capabilities(&self) -> &[EventKind];
    fn handle(&mut self, event: &KernelEvent);
}

#[async_trait]
pub trait SagaStore: Send + Sync {
    async fn store(&self, saga: HousingSaga) -> Result<()>;
    async fn get(&self, saga_id: SagaId) -> Result<Option<HousingSaga>>;
    async fn remove(&self, saga_id: SagaId) -> Result<()>;
    async fn get_all(&self) -> Result<Vec<HousingSaga>>;
}

#[async_trait]
pub trait LoanBookStore: Send + Sync {
    async fn store_loan(&self, loan: Loan) -> Result<()>;
    async fn store_deposit(&self, deposit: Deposit) -> Result<()>;
    async fn remove_deposit(&self, deposit_id: DepositId) -> Result<()>;
    async fn loans(&self) -> Result<Vec<Loan>>;
    async fn deposits(&self) -> Result<Vec<Deposit>>;
}

pub type SagaStoreBox = Box<dyn SagaStore>;
pub type LoanBookStoreBox = Box<dyn LoanBookStore>;
