use crate::application::bank::Bank;
use crate::application::bank::loans::{LoanEvent, LoanRequest};
use crate::application::commands::{Command, CommandQueue, CommandSender};
use crate::application::events::EventBus;
use crate::application::ledger::{ConservationReport, MonetaryLedger};
use crate::application::saga::SagaContext;
use crate::application::saga::orchestrator::{SagaOrchestrator, SagaOutcome};
use crate::application::settlement::{AssetValuation, SettlementSystem};
use crate::config::KernelConfig;
use crate::domain::events::KernelEvent;
use crate::domain::ids::{AgentId, PropertyId, Tick};
use crate::domain::loan::BorrowerProfile;
use crate::domain::money::Money;
use crate::domain::ports::{
    CreditScoringService, EventHandler, HousingService, LoanBookStoreBox, LoanMarket,
    ParticipantDirectory, SagaStoreBox,
};
use crate::domain::saga::{HousingSaga, ParticipantSnapshot};
use crate::error::{KernelError, Result};
use crate::infrastructure::in_memory::{
    CreditFreezeHandler, CreditFreezeList, DebtToIncomeScorer, InMemoryHousingRegistry,
    InMemoryLoanMarket, InMemoryParticipantDirectory,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub commands_applied: usize,
    pub commands_rejected: Vec<String>,
    pub saga_outcomes: Vec<SagaOutcome>,
    pub loan_events: Vec<LoanEvent>,
    pub conservation: ConservationReport,
}

/// Assembles a [`Simulation`], checking every required collaborator is
/// present.
#[derive(Default)]
pub struct SimulationBuilder {
    config: KernelConfig,
    housing: Option<Box<dyn HousingService>>,
    loan_market: Option<Box<dyn LoanMarket>>,
    directory: Option<Box<dyn ParticipantDirectory>>,
    credit_scoring: Option<Box<dyn CreditScoringService>>,
    handlers: Vec<Box<dyn EventHandler>>,
    saga_store: Option<SagaStoreBox>,
    loan_store: Option<LoanBookStoreBox>,
}

impl SimulationBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Builder wired with the in-memory collaborators: housing registry,
    /// loan market, participant directory, debt-to-income scoring and a
    /// credit freeze on default.
    pub fn in_memory(config: KernelConfig) -> Self {
        let freeze_list = CreditFreezeList::new();
        let scorer = DebtToIncomeScorer::from_config(&config).with_freeze_list(freeze_list.clone());
        let decision_delay = config.decision_delay;
        Self::new(config)
            .housing(Box::new(InMemoryHousingRegistry::new()))
            .loan_market(Box::new(InMemoryLoanMarket::new(
                Box::new(scorer.clone()),
                decision_delay,
            )))
            .participant_directory(Box::new(InMemoryParticipantDirectory::new()))
            .credit_scoring(Box::new(scorer))
            .event_handler(Box::new(CreditFreezeHandler::new(freeze_list)))
    }

    pub fn housing(mut self, housing: Box<dyn HousingService>) -> Self {
        self.housing = Some(housing);
        self
    }

    pub fn loan_market(mut self, loan_market: Box<dyn LoanMarket>) -> Self {
        self.loan_market = Some(loan_market);
        self
    }

    pub fn participant_directory(mut self, directory: Box<dyn ParticipantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn credit_scoring(mut self, credit_scoring: Box<dyn CreditScoringService>) -> Self {
        self.credit_scoring = Some(credit_scoring);
        self
    }

    pub fn event_handler(mut self, handler: Box<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn saga_store(mut self, store: SagaStoreBox) -> Self {
        self.saga_store = Some(store);
        self
    }

    pub fn loan_book_store(mut self, store: LoanBookStoreBox) -> Self {
        self.loan_store = Some(store);
        self
    }

    pub fn build(self) -> Result<Simulation> {
        let housing = self.housing.ok_or_else(|| missing("HousingService"))?;
        let loan_market = self.loan_market.ok_or_else(|| missing("LoanMarket"))?;
        let directory = self
            .directory
            .ok_or_else(|| missing("ParticipantDirectory"))?;

        let mut events = EventBus::new();
        for handler in self.handlers {
            events.subscribe(handler)?;
        }

        let config = self.config;
        if config.bank_id == config.authority_id {
            return Err(KernelError::ValidationError(
                "The bank and the monetary authority must be distinct agents".to_string(),
            ));
        }
        let mut settlement = SettlementSystem::new(config.authority_id, config.currency);
        settlement.open_wallet(config.bank_id);
        settlement.mark_reserve_account(config.bank_id);
        settlement.endow(config.bank_id, config.bank_reserves, config.currency)?;
        let mut incomes = HashMap::new();
        for endowment in &config.endowments {
            settlement.endow(endowment.agent, endowment.amount, config.currency)?;
            if !endowment.income.is_zero() {
                incomes.insert(endowment.agent, endowment.income);
            }
        }

        let bank = Bank::from_config(&config);
        let (commands, sender) = CommandQueue::channel();
        let mut simulation = Simulation {
            tick: 0,
            ledger: MonetaryLedger::new(Money::ZERO, config.conservation_tolerance),
            settlement,
            bank,
            orchestrator: SagaOrchestrator::new(),
            housing,
            loan_market,
            directory,
            credit_scoring: self.credit_scoring,
            events,
            commands,
            sender,
            incomes,
            retired: HashSet::new(),
            saga_store: self.saga_store,
            loan_store: self.loan_store,
            config,
        };
        let baseline = simulation.measure_m2();
        simulation.ledger.set_baseline(baseline);
        info!(%baseline, "simulation built");
        Ok(simulation)
    }
}

fn missing(capability: &str) -> KernelError {
    KernelError::ProtocolViolation {
        collaborator: "SimulationBuilder".to_string(),
        capability: capability.to_string(),
    }
}

/// Root of the kernel. Owns every component and runs the tick loop.
pub struct Simulation {
    config: KernelConfig,
    tick: Tick,
    settlement: SettlementSystem,
    ledger: MonetaryLedger,
    bank: Bank,
    orchestrator: SagaOrchestrator,
    housing: Box<dyn HousingService>,
    loan_market: Box<dyn LoanMarket>,
    directory: Box<dyn ParticipantDirectory>,
    credit_scoring: Option<Box<dyn CreditScoringService>>,
    events: EventBus,
    commands: CommandQueue,
    sender: CommandSender,
    incomes: HashMap<AgentId, Money>,
    retired: HashSet<AgentId>,
    saga_store: Option<SagaStoreBox>,
    loan_store: Option<LoanBookStoreBox>,
}

impl Simulation {
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn settlement(&self) -> &SettlementSystem {
        &self.settlement
    }

    pub fn ledger(&self) -> &MonetaryLedger {
        &self.ledger
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn orchestrator(&self) -> &SagaOrchestrator {
        &self.orchestrator
    }

    pub fn housing(&self) -> &dyn HousingService {
        &*self.housing
    }

    pub fn events(&self) -> &[KernelEvent] {
        self.events.history()
    }

    /// Money in circulation: non-reserve wallets plus deposit liabilities.
    pub fn measure_m2(&self) -> Money {
        self.settlement.total_in_circulation(self.config.currency)
            + self.bank.deposits().total_deposits()
    }

    /// Advances one tick.
    ///
    /// Order: drain commands, step sagas, service loans and handle defaults,
    /// accrue deposit interest on billing ticks, check conservation. Only
    /// fatal errors are returned; everything else is logged and reported.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick += 1;
        let tick = self.tick;

        let mut commands_applied = 0;
        let mut commands_rejected = Vec::new();
        for command in self.commands.drain(tick) {
            match self.apply_command(&command) {
                Ok(()) => commands_applied += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(tick, ?command, "command rejected: {}", e);
                    commands_rejected.push(e.to_string());
                }
            }
        }

        let saga_outcomes = {
            let mut ctx = SagaContext {
                settlement: &mut self.settlement,
                ledger: &mut self.ledger,
                bank: &mut self.bank,
                housing: &mut *self.housing,
                loan_market: &mut *self.loan_market,
                tick,
            };
            self.orchestrator
                .process_sagas(&mut ctx, &*self.directory)?
        };
        self.publish_outcomes(&saga_outcomes);

        let loan_events = self
            .bank
            .service_loans(&mut self.settlement, &mut self.ledger, tick);
        for event in &loan_events {
            if let LoanEvent::Default(default) = event {
                self.events.publish(KernelEvent::LoanDefault(default.clone()));
                let record = self.bank.liquidate(
                    &mut self.settlement,
                    &mut self.ledger,
                    default,
                    AssetValuation::default(),
                    tick,
                )?;
                self.events.publish(KernelEvent::Liquidation {
                    tick,
                    debtor: record.debtor,
                    creditor: record.creditor,
                    loan_id: default.loan_id,
                    cash_seized: record.cash_seized,
                    asset_value: record.inventory_value + record.capital_value,
                });
            }
        }

        if tick % self.config.billing_interval.max(1) == 0 {
            let credited = self.bank.accrue_deposit_interest(&mut self.ledger);
            debug!(tick, %credited, "deposit interest accrued");
        }

        let conservation = self.ledger.check_conservation(self.measure_m2(), tick);
        if conservation.violated {
            self.events.publish(KernelEvent::ConservationViolation {
                tick,
                expected: conservation.expected,
                actual: conservation.actual,
            });
        }

        Ok(TickReport {
            tick,
            commands_applied,
            commands_rejected,
            saga_outcomes,
            loan_events,
            conservation,
        })
    }

    /// Runs `ticks` ticks and returns their reports.
    pub fn run(&mut self, ticks: u64) -> Result<Vec<TickReport>> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    fn apply_command(&mut self, command: &Command) -> Result<()> {
        let tick = self.tick;
        let currency = self.config.currency;
        match *command {
            Command::Mint { agent, amount } => {
                if !self.settlement.is_reserve_account(agent) {
                    self.ensure_participant(agent)?;
                }
                let authority = self.settlement.authority();
                self.settlement.create_and_transfer(
                    &mut self.ledger,
                    authority,
                    agent,
                    amount,
                    "mint",
                    tick,
                )?;
            }
            Command::Burn { agent, amount } => {
                let authority = self.settlement.authority();
                self.settlement.transfer_and_destroy(
                    &mut self.ledger,
                    agent,
                    authority,
                    amount,
                    "burn",
                    tick,
                )?;
            }
            Command::Transfer { from, to, amount } => {
                if self.settlement.is_reserve_account(from) {
                    return Err(KernelError::ValidationError(format!(
                        "{} is a reserve account and cannot transfer into circulation",
                        from
                    )));
                }
                self.ensure_participant(to)?;
                let available = self.settlement.get_balance(from, currency);
                self.settlement
                    .transfer(from, to, amount, "transfer", tick, currency)
                    .ok_or(KernelError::InsufficientFunds {
                        agent: from,
                        currency,
                        required: amount,
                        available,
                    })?;
            }
            Command::SetIncome { agent, income } => {
                self.ensure_participant(agent)?;
                self.incomes.insert(agent, income);
            }
            Command::GrantLoan { borrower, amount } => {
                self.ensure_participant(borrower)?;
                let request = LoanRequest {
                    borrower,
                    amount,
                    rate: self.config.loan_rate,
                    due_tick: None,
                    profile: Some(self.profile_of(borrower)),
                };
                self.bank.grant_loan(
                    &self.settlement,
                    &mut self.ledger,
                    &request,
                    self.credit_scoring.as_deref(),
                    tick,
                )?;
            }
            Command::OpenDeposit { agent, amount } => {
                self.bank
                    .open_deposit(&mut self.settlement, agent, amount, tick)?;
            }
            Command::WithdrawDeposit { agent, amount } => {
                self.bank
                    .withdraw_deposit(&mut self.settlement, agent, amount, tick)?;
            }
            Command::ListProperty { owner, property } => {
                self.ensure_participant(owner)?;
                self.housing.register_property(property, owner)?;
            }
            Command::Purchase {
                buyer,
                seller,
                property,
                price,
                down_payment,
            } => {
                self.initiate_purchase(buyer, seller, property, price, down_payment)?;
            }
            Command::Retire { agent, heir } => {
                self.remove_agent(agent, heir)?;
            }
        }
        Ok(())
    }

    /// Opens a wallet for a newly seen agent. Retired agents and reserve
    /// accounts cannot act as ordinary participants.
    fn ensure_participant(&mut self, agent: AgentId) -> Result<()> {
        if self.retired.contains(&agent) {
            return Err(KernelError::UnknownAgent(agent));
        }
        if self.settlement.is_reserve_account(agent) {
            return Err(KernelError::ValidationError(format!(
                "{} is a reserve account",
                agent
            )));
        }
        self.settlement.open_wallet(agent);
        Ok(())
    }

    fn profile_of(&self, agent: AgentId) -> BorrowerProfile {
        let interval = self.config.billing_interval.max(1);
        let existing_debt_payments = self
            .bank
            .loans()
            .loans_of(agent)
            .into_iter()
            .filter(|loan| !loan.status.is_terminal())
            .map(|loan| Money(loan.principal.0.div_ceil(loan.term.div_ceil(interval).max(1))))
            .sum();
        BorrowerProfile {
            borrower: agent,
            income: self.incomes.get(&agent).copied().unwrap_or_default(),
            existing_debt_payments,
            liquid_assets: self.settlement.get_balance(agent, self.config.currency)
                + self.bank.deposits().balance_of(agent),
        }
    }

    /// Starts a housing purchase saga. Returns its id.
    pub fn initiate_purchase(
        &mut self,
        buyer: AgentId,
        seller: AgentId,
        property: PropertyId,
        price: Money,
        down_payment: Money,
    ) -> Result<crate::domain::ids::SagaId> {
        self.ensure_participant(buyer)?;
        self.ensure_participant(seller)?;
        if self.housing.owner_of(property) != Some(seller) {
            return Err(KernelError::ValidationError(format!(
                "{} is not owned by {}",
                property, seller
            )));
        }
        let profile = self.profile_of(buyer);
        let buyer_snapshot = ParticipantSnapshot {
            agent_id: Some(buyer),
            cash: self.settlement.get_balance(buyer, self.config.currency),
            income: profile.income,
            existing_debt_payments: profile.existing_debt_payments,
        };
        let seller_snapshot = ParticipantSnapshot {
            agent_id: Some(seller),
            cash: self.settlement.get_balance(seller, self.config.currency),
            income: self.incomes.get(&seller).copied().unwrap_or_default(),
            existing_debt_payments: Money::ZERO,
        };
        let saga_id = self.orchestrator.next_saga_id();
        let saga = HousingSaga::new(
            saga_id,
            buyer_snapshot,
            seller_snapshot,
            property,
            price,
            down_payment,
        );
        self.orchestrator.submit_saga(saga)
    }

    /// Removes an agent from the economy: cancels its sagas with
    /// compensation, then hands its wallet and bank book to the heir.
    pub fn remove_agent(&mut self, agent: AgentId, heir: AgentId) -> Result<()> {
        if self.settlement.is_reserve_account(agent) {
            return Err(KernelError::ValidationError(format!(
                "{} is a reserve account and cannot retire",
                agent
            )));
        }
        if !self.settlement.has_wallet(agent) {
            return Err(KernelError::UnknownAgent(agent));
        }
        if agent == heir {
            return Err(KernelError::ValidationError(
                "An agent cannot inherit its own estate".to_string(),
            ));
        }
        self.ensure_participant(heir)?;

        let outcomes = {
            let mut ctx = SagaContext {
                settlement: &mut self.settlement,
                ledger: &mut self.ledger,
                bank: &mut self.bank,
                housing: &mut *self.housing,
                loan_market: &mut *self.loan_market,
                tick: self.tick,
            };
            self.orchestrator.cancel_sagas_for(agent, &mut ctx)?
        };
        self.publish_outcomes(&outcomes);

        self.bank.settle_estate(agent, heir);
        self.settlement.settle_estate(agent, heir, self.tick)?;
        if let Some(income) = self.incomes.remove(&agent) {
            *self.incomes.entry(heir).or_default() += income;
        }
        self.retired.insert(agent);
        info!(%agent, %heir, cancelled = outcomes.len(), "agent removed");
        Ok(())
    }

    fn publish_outcomes(&mut self, outcomes: &[SagaOutcome]) {
        for outcome in outcomes {
            self.events.publish(KernelEvent::SagaFinished {
                tick: outcome.tick,
                saga_id: outcome.saga_id,
                status: outcome.status,
                buyer: outcome.buyer,
                seller: outcome.seller,
            });
        }
    }

    /// Writes live sagas and the loan book to the configured stores.
    pub async fn checkpoint(&self) -> Result<()> {
        if let Some(store) = &self.saga_store {
            let live: HashSet<_> = self.orchestrator.get_active_sagas().map(|s| s.id).collect();
            for stale in store.get_all().await?.into_iter().filter(|s| !live.contains(&s.id)) {
                store.remove(stale.id).await?;
            }
            for saga in self.orchestrator.snapshot() {
                store.store(saga).await?;
            }
        }
        if let Some(store) = &self.loan_store {
            let (loans, deposits) = self.bank.records();
            for loan in loans {
                store.store_loan(loan).await?;
            }
            let live: HashSet<_> = deposits.iter().map(|d| d.id).collect();
            for stale in store.deposits().await?.into_iter().filter(|d| !live.contains(&d.id)) {
                store.remove_deposit(stale.id).await?;
            }
            for deposit in deposits {
                store.store_deposit(deposit).await?;
            }
        }
        debug!(tick = self.tick, "checkpoint written");
        Ok(())
    }

    /// Reloads sagas and the loan book from the configured stores and
    /// re-bases the ledger on the restored money supply. Sagas past escrow
    /// are not resumed; the next checkpoint removes them from the store.
    pub async fn restore(&mut self) -> Result<()> {
        if let Some(store) = &self.saga_store {
            let sagas = store.get_all().await?;
            let discarded = self.orchestrator.restore(sagas);
            if !discarded.is_empty() {
                warn!(?discarded, "sagas past escrow not resumed");
            }
        }
        if let Some(store) = &self.loan_store {
            let loans = store.loans().await?;
            let deposits = store.deposits().await?;
            self.bank.restore(loans, deposits);
        }
        let baseline = self.measure_m2();
        self.ledger.reset(baseline);
        info!(%baseline, sagas = self.orchestrator.len(), "state restored");
        Ok(())
    }
}
