use crate::config::KernelConfig;
use crate::domain::events::{EventKind, KernelEvent};
use crate::domain::ids::{AgentId, ApplicationId, DepositId, LoanId, PropertyId, SagaId, Tick};
use crate::domain::loan::{BorrowerProfile, CreditAssessment, Deposit, Loan};
use crate::domain::money::Money;
use crate::domain::ports::{
    ApplicationStatus, CreditScoringService, EventHandler, HousingService, LoanBookStore,
    LoanMarket, MortgageLender, ParticipantDirectory, SagaStore,
};
use crate::domain::saga::{HousingSaga, LoanApplication, MortgageApproval};
use crate::error::{KernelError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock as SyncRwLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub owner: AgentId,
    pub contract: Option<SagaId>,
    pub liens: Vec<(LoanId, Money)>,
}

/// Property registry holding owners, liens and per-property saga locks.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHousingRegistry {
    properties: HashMap<PropertyId, PropertyRecord>,
}

impl InMemoryHousingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(&self, property: PropertyId) -> Option<&PropertyRecord> {
        self.properties.get(&property)
    }

    fn record_mut(&mut self, property: PropertyId) -> Result<&mut PropertyRecord> {
        self.properties
            .get_mut(&property)
            .ok_or_else(|| KernelError::ValidationError(format!("{} is not registered", property)))
    }
}

impl HousingService for InMemoryHousingRegistry {
    fn register_property(&mut self, property: PropertyId, owner: AgentId) -> Result<()> {
        if self.properties.contains_key(&property) {
            return Err(KernelError::ValidationError(format!(
                "{} is already registered",
                property
            )));
        }
        self.properties.insert(
            property,
            PropertyRecord {
                owner,
                contract: None,
                liens: Vec::new(),
            },
        );
        Ok(())
    }

    fn owner_of(&self, property: PropertyId) -> Option<AgentId> {
        self.properties.get(&property).map(|p| p.owner)
    }

    fn lock_holder(&self, property: PropertyId) -> Option<SagaId> {
        self.properties.get(&property).and_then(|p| p.contract)
    }

    fn set_under_contract(&mut self, property: PropertyId, saga_id: SagaId) -> Result<()> {
        let record = self.record_mut(property)?;
        match record.contract {
            Some(holder) if holder != saga_id => Err(KernelError::ValidationError(format!(
                "{} is under contract with {}",
                property, holder
            ))),
            _ => {
                record.contract = Some(saga_id);
                Ok(())
            }
        }
    }

    fn release_contract(&mut self, property: PropertyId, saga_id: SagaId) -> Result<()> {
        let record = self.record_mut(property)?;
        match record.contract {
            Some(holder) if holder != saga_id => Err(KernelError::ValidationError(format!(
                "{} cannot release {} held by {}",
                saga_id, property, holder
            ))),
            _ => {
                record.contract = None;
                Ok(())
            }
        }
    }

    fn add_lien(&mut self, property: PropertyId, loan_id: LoanId, amount: Money) -> Result<()> {
        let record = self.record_mut(property)?;
        if record.liens.iter().any(|(id, _)| *id == loan_id) {
            return Err(KernelError::ValidationError(format!(
                "{} already carries a lien for {}",
                property, loan_id
            )));
        }
        record.liens.push((loan_id, amount));
        Ok(())
    }

    fn remove_lien(&mut self, property: PropertyId, loan_id: LoanId) -> Result<()> {
        let record = self.record_mut(property)?;
        let before = record.liens.len();
        record.liens.retain(|(id, _)| *id != loan_id);
        if record.liens.len() == before {
            return Err(KernelError::ValidationError(format!(
                "{} carries no lien for {}",
                property, loan_id
            )));
        }
        Ok(())
    }

    fn transfer_ownership(
        &mut self,
        property: PropertyId,
        from: AgentId,
        to: AgentId,
    ) -> Result<()> {
        let record = self.record_mut(property)?;
        if record.owner != from {
            return Err(KernelError::ValidationError(format!(
                "{} is owned by {}, not {}",
                property, record.owner, from
            )));
        }
        record.owner = to;
        Ok(())
    }
}

/// Agents barred from new credit after a default. Cloning shares the list.
#[derive(Debug, Default, Clone)]
pub struct CreditFreezeList {
    frozen: Arc<SyncRwLock<BTreeSet<AgentId>>>,
}

impl CreditFreezeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freeze(&self, agent: AgentId) {
        if let Ok(mut frozen) = self.frozen.write() {
            frozen.insert(agent);
        }
    }

    pub fn is_frozen(&self, agent: AgentId) -> bool {
        self.frozen
            .read()
            .map(|frozen| frozen.contains(&agent))
            .unwrap_or(false)
    }

    pub fn frozen_agents(&self) -> Vec<AgentId> {
        self.frozen
            .read()
            .map(|frozen| frozen.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Scores a loan by the debt service it adds against the borrower's income.
#[derive(Debug, Clone)]
pub struct DebtToIncomeScorer {
    max_debt_to_income: Decimal,
    rate: Decimal,
    installments: u64,
    period_fraction: Decimal,
    freeze_list: Option<CreditFreezeList>,
}

impl DebtToIncomeScorer {
    pub fn new(
        max_debt_to_income: Decimal,
        rate: Decimal,
        term: u64,
        billing_interval: u64,
        ticks_per_year: u64,
    ) -> Self {
        let interval = billing_interval.max(1);
        Self {
            max_debt_to_income,
            rate,
            installments: term.div_ceil(interval).max(1),
            period_fraction: Decimal::from(interval) / Decimal::from(ticks_per_year.max(1)),
            freeze_list: None,
        }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(
            config.max_debt_to_income,
            config.mortgage_rate,
            config.default_term,
            config.billing_interval,
            config.ticks_per_year,
        )
    }

    pub fn with_freeze_list(mut self, freeze_list: CreditFreezeList) -> Self {
        self.freeze_list = Some(freeze_list);
        self
    }

    /// Debt service per billing period for each unit borrowed.
    fn service_factor(&self) -> Decimal {
        Decimal::ONE / Decimal::from(self.installments) + self.rate * self.period_fraction
    }

    /// Largest principal whose added debt service keeps the borrower under
    /// the debt-to-income ceiling.
    pub fn capacity(&self, profile: &BorrowerProfile) -> Money {
        let ceiling = Decimal::from(profile.income.0) * self.max_debt_to_income;
        let headroom = ceiling - Decimal::from(profile.existing_debt_payments.0);
        if headroom <= Decimal::ZERO {
            return Money::ZERO;
        }
        let max = (headroom / self.service_factor()).floor();
        Money(max.to_u64().unwrap_or(0))
    }
}

impl CreditScoringService for DebtToIncomeScorer {
    fn assess_creditworthiness(
        &self,
        profile: &BorrowerProfile,
        amount: Money,
    ) -> CreditAssessment {
        if let Some(list) = &self.freeze_list
            && list.is_frozen(profile.borrower)
        {
            return CreditAssessment::decline(format!("credit frozen for {}", profile.borrower));
        }
        let capacity = self.capacity(profile);
        if capacity.is_zero() {
            return CreditAssessment::decline("debt-to-income ceiling reached");
        }
        if amount > capacity {
            return CreditAssessment {
                approved: false,
                max_amount: capacity,
                reason: Some(format!(
                    "requested {} exceeds capacity {}",
                    amount, capacity
                )),
            };
        }
        CreditAssessment::approve(capacity)
    }
}

#[derive(Debug, Clone)]
struct StagedApplication {
    application: LoanApplication,
    staged_tick: Tick,
    decision: ApplicationStatus,
}

/// Underwrites staged mortgage applications after a fixed decision delay.
pub struct InMemoryLoanMarket {
    scorer: Box<dyn CreditScoringService>,
    decision_delay: u64,
    applications: BTreeMap<ApplicationId, StagedApplication>,
    next_id: u64,
}

impl InMemoryLoanMarket {
    pub fn new(scorer: Box<dyn CreditScoringService>, decision_delay: u64) -> Self {
        Self {
            scorer,
            decision_delay,
            applications: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn staged_count(&self) -> usize {
        self.applications.len()
    }
}

impl LoanMarket for InMemoryLoanMarket {
    fn stage_mortgage_application(
        &mut self,
        application: &LoanApplication,
        tick: Tick,
    ) -> Result<ApplicationId> {
        if application.principal.is_zero() {
            return Err(KernelError::ValidationError(
                "Mortgage principal must be positive".to_string(),
            ));
        }
        let assessment = self
            .scorer
            .assess_creditworthiness(&application.profile, application.principal);
        let decision = if assessment.approved && application.principal <= assessment.max_amount {
            ApplicationStatus::Approved
        } else {
            ApplicationStatus::Rejected(
                assessment
                    .reason
                    .unwrap_or_else(|| "declined by underwriting".to_string()),
            )
        };
        let id = ApplicationId(self.next_id);
        self.next_id += 1;
        debug!(application_id = %id, applicant = %application.applicant, ?decision, "mortgage application staged");
        self.applications.insert(
            id,
            StagedApplication {
                application: application.clone(),
                staged_tick: tick,
                decision,
            },
        );
        Ok(id)
    }

    fn check_staged_application_status(&self, id: ApplicationId, tick: Tick) -> ApplicationStatus {
        match self.applications.get(&id) {
            None => ApplicationStatus::Rejected(format!("{} is not staged", id)),
            Some(staged) if tick < staged.staged_tick + self.decision_delay => {
                ApplicationStatus::Pending
            }
            Some(staged) => staged.decision.clone(),
        }
    }

    fn convert_staged_to_loan(
        &mut self,
        id: ApplicationId,
        lender: &mut dyn MortgageLender,
        tick: Tick,
    ) -> Result<MortgageApproval> {
        let staged = self
            .applications
            .get(&id)
            .ok_or_else(|| KernelError::ValidationError(format!("{} is not staged", id)))?;
        if self.check_staged_application_status(id, tick) != ApplicationStatus::Approved {
            return Err(KernelError::ValidationError(format!(
                "{} is not approved",
                id
            )));
        }
        let approval = lender.book_mortgage(&staged.application, tick)?;
        self.applications.remove(&id);
        info!(application_id = %id, loan_id = %approval.loan_id, lender = %lender.lender_id(), "mortgage application converted");
        Ok(approval)
    }

    fn void_staged_application(&mut self, id: ApplicationId) {
        if self.applications.remove(&id).is_some() {
            debug!(application_id = %id, "mortgage application voided");
        }
    }
}

/// Tracks agents that left the economy. Cloning shares the roster.
#[derive(Debug, Default, Clone)]
pub struct InMemoryParticipantDirectory {
    retired: Arc<SyncRwLock<HashSet<AgentId>>>,
}

impl InMemoryParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retire(&self, agent: AgentId) {
        if let Ok(mut retired) = self.retired.write() {
            retired.insert(agent);
        }
    }
}

impl ParticipantDirectory for InMemoryParticipantDirectory {
    fn is_active(&self, agent: AgentId) -> bool {
        self.retired
            .read()
            .map(|retired| !retired.contains(&agent))
            .unwrap_or(false)
    }
}

/// Freezes the credit of every agent that defaults.
#[derive(Debug, Clone)]
pub struct CreditFreezeHandler {
    freeze_list: CreditFreezeList,
}

impl CreditFreezeHandler {
    const CAPABILITIES: [EventKind; 1] = [EventKind::LoanDefault];

    pub fn new(freeze_list: CreditFreezeList) -> Self {
        Self { freeze_list }
    }
}

impl EventHandler for CreditFreezeHandler {
    fn name(&self) -> &str {
        "credit-freeze"
    }

    fn capabilities(&self) -> &[EventKind] {
        &Self::CAPABILITIES
    }

    fn handle(&mut self, event: &KernelEvent) {
        if let KernelEvent::LoanDefault(default) = event {
            warn!(agent = %default.agent_id, loan_id = %default.loan_id, "credit frozen after default");
            self.freeze_list.freeze(default.agent_id);
        }
    }
}

/// A thread-safe in-memory store for saga records.
#[derive(Default, Clone)]
pub struct InMemorySagaStore {
    sagas: Arc<RwLock<HashMap<SagaId, HousingSaga>>>,
}

impl InMemorySagaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn store(&self, saga: HousingSaga) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        sagas.insert(saga.id, saga);
        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<HousingSaga>> {
        let sagas = self.sagas.read().await;
        Ok(sagas.get(&saga_id).cloned())
    }

    async fn remove(&self, saga_id: SagaId) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        sagas.remove(&saga_id);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<HousingSaga>> {
        let sagas = self.sagas.read().await;
        let mut all: Vec<HousingSaga> = sagas.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }
}

/// A thread-safe in-memory store for the bank's loan and deposit records.
#[derive(Default, Clone)]
pub struct InMemoryLoanBookStore {
    loans: Arc<RwLock<HashMap<LoanId, Loan>>>,
    deposits: Arc<RwLock<HashMap<DepositId, Deposit>>>,
}

impl InMemoryLoanBookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanBookStore for InMemoryLoanBookStore {
    async fn store_loan(&self, loan: Loan) -> Result<()> {
        let mut loans = self.loans.write().await;
        loans.insert(loan.id, loan);
        Ok(())
    }

    async fn store_deposit(&self, deposit: Deposit) -> Result<()> {
        let mut deposits = self.deposits.write().await;
        deposits.insert(deposit.id, deposit);
        Ok(())
    }

    async fn remove_deposit(&self, deposit_id: DepositId) -> Result<()> {
        let mut deposits = self.deposits.write().await;
        deposits.remove(&deposit_id);
        Ok(())
    }

    async fn loans(&self) -> Result<Vec<Loan>> {
        let loans = self.loans.read().await;
        let mut all: Vec<Loan> = loans.values().cloned().collect();
        all.sort_by_key(|l| l.id);
        Ok(all)
    }

    async fn deposits(&self) -> Result<Vec<Deposit>> {
        let deposits = self.deposits.read().await;
        let mut all: Vec<Deposit> = deposits.values().cloned().collect();
        all.sort_by_key(|d| d.id);
        Ok(all)
    }
}
