pub mod deposits;
pub mod loans;

use crate::application::accounts::AccountRegistry;
use crate::application::ledger::MonetaryLedger;
use crate::application::settlement::{AssetValuation, LiquidationRecord, SettlementSystem};
use crate::config::KernelConfig;
use crate::domain::events::LoanDefaultEvent;
use crate::domain::ids::{AgentId, DepositId, LoanId, Tick};
use crate::domain::loan::{Deposit, Loan, LoanInfo};
use crate::domain::money::Money;
use crate::domain::ports::{CreditScoringService, MortgageLender};
use crate::domain::saga::{LoanApplication, MortgageApproval};
use crate::domain::transaction::{SettlementLeg, Transaction, TransactionKind};
use crate::error::{KernelError, Result};
use deposits::DepositManager;
use loans::{LoanEvent, LoanManager, LoanRequest, ReservePolicy, ServicingTerms};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Lending parameters of a bank.
#[derive(Debug, Clone, PartialEq)]
pub struct LendingPolicy {
    pub reserve: ReservePolicy,
    pub loan_rate: Decimal,
    pub mortgage_rate: Decimal,
    pub billing_interval: u64,
    pub ticks_per_year: u64,
}

impl From<&KernelConfig> for LendingPolicy {
    fn from(config: &KernelConfig) -> Self {
        Self {
            reserve: ReservePolicy {
                currency: config.currency,
                reserve_ratio: config.reserve_ratio,
                gold_standard: config.gold_standard,
                default_term: config.default_term,
                deposit_rate: config.deposit_rate,
            },
            loan_rate: config.loan_rate,
            mortgage_rate: config.mortgage_rate,
            billing_interval: config.billing_interval,
            ticks_per_year: config.ticks_per_year,
        }
    }
}

/// A commercial bank: loan book, deposit book and the account index.
///
/// The bank's cash lives in its reserve wallet inside the settlement system;
/// every operation that moves it takes the settlement system and the ledger
/// explicitly so the M2 effect is recorded at the point it happens.
#[derive(Debug, Clone)]
pub struct Bank {
    id: AgentId,
    policy: LendingPolicy,
    loans: LoanManager,
    deposits: DepositManager,
    accounts: AccountRegistry,
}

impl Bank {
    pub fn new(id: AgentId, policy: LendingPolicy, max_missed_payments: u32) -> Self {
        let terms = ServicingTerms {
            billing_interval: policy.billing_interval,
            ticks_per_year: policy.ticks_per_year,
            max_missed_payments,
        };
        Self {
            id,
            policy,
            loans: LoanManager::new(id, terms),
            deposits: DepositManager::new(),
            accounts: AccountRegistry::new(),
        }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(
            config.bank_id,
            LendingPolicy::from(config),
            config.max_missed_payments,
        )
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub fn loans(&self) -> &LoanManager {
        &self.loans
    }

    pub fn deposits(&self) -> &DepositManager {
        &self.deposits
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    /// Cash held in the bank's reserve wallet.
    pub fn reserves(&self, settlement: &SettlementSystem) -> Money {
        settlement.get_balance(self.id, self.policy.reserve.currency)
    }

    /// Grants a book-entry loan: the principal is credited as a new deposit,
    /// which is new money.
    pub fn grant_loan(
        &mut self,
        settlement: &SettlementSystem,
        ledger: &mut MonetaryLedger,
        request: &LoanRequest,
        credit_scoring: Option<&dyn CreditScoringService>,
        tick: Tick,
    ) -> Result<(LoanInfo, DepositId)> {
        let wallet = settlement
            .wallet(self.id)
            .ok_or(KernelError::UnknownAgent(self.id))?;
        let (info, deposit_id) = self.loans.assess_and_create_loan(
            request,
            credit_scoring,
            wallet,
            &mut self.deposits,
            tick,
            &self.policy.reserve,
        )?;
        self.accounts.register_account(self.id, request.borrower);
        ledger.record_credit_expansion(
            info.principal,
            None,
            Some(info.loan_id),
            "loan origination",
        );
        Ok((info, deposit_id))
    }

    /// Moves cash from the depositor into a new deposit. Neutral for M2.
    pub fn open_deposit(
        &mut self,
        settlement: &mut SettlementSystem,
        depositor: AgentId,
        amount: Money,
        tick: Tick,
    ) -> Result<DepositId> {
        if settlement.is_reserve_account(depositor) {
            return Err(KernelError::ValidationError(format!(
                "{} is a reserve account and cannot hold deposits",
                depositor
            )));
        }
        let currency = self.policy.reserve.currency;
        let available = settlement.get_balance(depositor, currency);
        settlement
            .transfer(depositor, self.id, amount, "deposit", tick, currency)
            .ok_or(KernelError::InsufficientFunds {
                agent: depositor,
                currency,
                required: amount,
                available,
            })?;
        let id = self.deposits.create_deposit(
            depositor,
            self.id,
            amount,
            self.policy.reserve.deposit_rate,
            None,
        );
        self.accounts.register_account(self.id, depositor);
        info!(%depositor, %amount, deposit_id = %id, "deposit opened");
        Ok(id)
    }

    /// Converts deposit money into cash paid out of reserves. Neutral for M2.
    pub fn withdraw_deposit(
        &mut self,
        settlement: &mut SettlementSystem,
        depositor: AgentId,
        amount: Money,
        tick: Tick,
    ) -> Result<Transaction> {
        let held = self.deposits.balance_of(depositor);
        if held < amount {
            return Err(KernelError::ValidationError(format!(
                "{} holds {} in deposits, cannot withdraw {}",
                depositor, held, amount
            )));
        }
        let currency = self.policy.reserve.currency;
        let reserves = self.reserves(settlement);
        if reserves < amount {
            return Err(KernelError::ReserveViolation {
                required: amount,
                available: reserves,
            });
        }
        let tx = settlement
            .transfer(self.id, depositor, amount, "deposit withdrawal", tick, currency)
            .ok_or(KernelError::UnknownAgent(depositor))?;
        self.deposits.debit_depositor(depositor, amount);
        info!(%depositor, %amount, "deposit withdrawn");
        Ok(tx)
    }

    /// Bills the loan book. Borrowers pay from cash first and from their
    /// deposits otherwise; either way the money leaves circulation.
    pub fn service_loans(
        &mut self,
        settlement: &mut SettlementSystem,
        ledger: &mut MonetaryLedger,
        tick: Tick,
    ) -> Vec<LoanEvent> {
        let bank = self.id;
        let deposits = &mut self.deposits;
        self.loans.service_loans(tick, |request| {
            let amount = request.amount();
            let leg = SettlementLeg::new(request.borrower, bank, amount, "loan repayment");
            let paid = settlement.settle_legs(&[leg], tick, TransactionKind::LoanRepayment)
                || deposits.debit_depositor(request.borrower, amount);
            if paid {
                ledger.record_credit_destruction(
                    amount,
                    None,
                    Some(request.loan_id),
                    "loan repayment",
                );
            }
            paid
        })
    }

    /// Credits a billing period of interest on every deposit. The interest is
    /// new money.
    pub fn accrue_deposit_interest(&mut self, ledger: &mut MonetaryLedger) -> Money {
        let fraction = Decimal::from(self.policy.billing_interval)
            / Decimal::from(self.policy.ticks_per_year.max(1));
        let credited = self.deposits.accrue_interest(fraction);
        ledger.record_credit_expansion(credited, None, None, "deposit interest");
        credited
    }

    /// Seizes what it can from a defaulted borrower and writes off the rest.
    pub fn liquidate(
        &mut self,
        settlement: &mut SettlementSystem,
        ledger: &mut MonetaryLedger,
        event: &LoanDefaultEvent,
        assets: AssetValuation,
        tick: Tick,
    ) -> Result<LiquidationRecord> {
        let record = settlement.record_liquidation(
            event.agent_id,
            event.creditor_id,
            event.defaulted_amount,
            assets,
            tick,
        );
        if settlement.is_reserve_account(event.creditor_id) {
            ledger.record_credit_destruction(
                record.cash_seized,
                None,
                Some(event.loan_id),
                "default liquidation",
            );
        }
        let written_off = self
            .loans
            .write_down(event.loan_id, record.total_recovered())?;
        warn!(
            loan_id = %event.loan_id,
            debtor = %event.agent_id,
            recovered = %record.total_recovered(),
            %written_off,
            "default liquidated"
        );
        Ok(record)
    }

    /// Voids a cash-disbursed mortgage. Any disbursed money was already
    /// destroyed by the settlement reversal.
    pub fn terminate_loan(&mut self, loan_id: LoanId) -> Result<Money> {
        self.loans.terminate_loan(loan_id)
    }

    /// Voids a loan and its paired deposit, destroying the deposit money.
    pub fn void_loan(&mut self, ledger: &mut MonetaryLedger, loan_id: LoanId) -> Result<Money> {
        let destroyed = self.loans.void_loan(loan_id, &mut self.deposits)?;
        ledger.record_credit_destruction(destroyed, None, Some(loan_id), "loan voided");
        Ok(destroyed)
    }

    /// Hands the deceased's deposits, loans and accounts to the heir.
    pub fn settle_estate(&mut self, deceased: AgentId, heir: AgentId) {
        let deposits = self.deposits.reassign(deceased, heir);
        let loans = self.loans.reassign(deceased, heir);
        for bank in self.accounts.remove_agent_from_all_accounts(deceased) {
            self.accounts.register_account(bank, heir);
        }
        info!(%deceased, %heir, deposits, loans, "bank estate reassigned");
    }

    /// Lender view used while converting a staged mortgage application.
    pub fn mortgage_desk<'a>(&'a mut self, settlement: &SettlementSystem) -> MortgageDesk<'a> {
        let reserves = self.reserves(settlement);
        MortgageDesk {
            bank: self,
            reserves,
        }
    }

    pub fn records(&self) -> (Vec<Loan>, Vec<Deposit>) {
        (self.loans.records(), self.deposits.records())
    }

    pub fn restore(&mut self, loans: Vec<Loan>, deposits: Vec<Deposit>) {
        for loan in &loans {
            if !loan.status.is_terminal() {
                self.accounts.register_account(self.id, loan.borrower);
            }
        }
        for deposit in &deposits {
            self.accounts.register_account(self.id, deposit.depositor);
        }
        self.loans.restore(loans);
        self.deposits.restore(deposits);
    }
}

/// Books mortgages against a bank whose reserves were read up front.
pub struct MortgageDesk<'a> {
    bank: &'a mut Bank,
    reserves: Money,
}

impl MortgageLender for MortgageDesk<'_> {
    fn lender_id(&self) -> AgentId {
        self.bank.id
    }

    fn book_mortgage(
        &mut self,
        application: &LoanApplication,
        tick: Tick,
    ) -> Result<MortgageApproval> {
        let policy = &self.bank.policy;
        policy.reserve.check_cash_disbursal(
            self.reserves,
            self.bank.deposits.total_deposits(),
            application.principal,
        )?;
        let rate = policy.mortgage_rate;
        let term = policy.reserve.default_term;
        let info = self.bank.loans.book_mortgage(
            application.applicant,
            application.principal,
            rate,
            term,
            tick,
        );
        self.bank
            .accounts
            .register_account(self.bank.id, application.applicant);
        self.reserves = self.reserves.saturating_sub(application.principal);
        Ok(MortgageApproval {
            loan_id: info.loan_id,
            lender: self.bank.id,
            principal: info.principal,
            rate,
            term: info.term,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::PropertyId;
    use crate::domain::loan::{BorrowerProfile, LoanStatus};
    use crate::domain::money::Currency;
    use rust_decimal_macros::dec;

    const AUTHORITY: AgentId = AgentId(0);
    const BANK: AgentId = AgentId(1);
    const ALICE: AgentId = AgentId(10);

    struct Fixture {
        settlement: SettlementSystem,
        ledger: MonetaryLedger,
        bank: Bank,
    }

    fn fixture(reserves: u64, alice_cash: u64) -> Fixture {
        let config = KernelConfig {
            bank_reserves: Money(reserves),
            ..KernelConfig::default()
        };
        let mut settlement = SettlementSystem::new(AUTHORITY, Currency::Usd);
        settlement.endow(BANK, Money(reserves), Currency::Usd).unwrap();
        settlement.mark_reserve_account(BANK);
        settlement.endow(ALICE, Money(alice_cash), Currency::Usd).unwrap();
        let ledger = MonetaryLedger::new(settlement.total_in_circulation(Currency::Usd), 100);
        Fixture {
            settlement,
            ledger,
            bank: Bank::from_config(&config),
        }
    }

    impl Fixture {
        fn actual_m2(&self) -> Money {
            self.settlement.total_in_circulation(Currency::Usd) + self.bank.deposits().total_deposits()
        }

        fn assert_conserved(&mut self) {
            let actual = self.actual_m2();
            let report = self.ledger.check_conservation(actual, 0);
            assert!(!report.violated, "{:?}", report);
        }
    }

    fn request(amount: u64) -> LoanRequest {
        LoanRequest {
            borrower: ALICE,
            amount: Money(amount),
            rate: dec!(0.07),
            due_tick: None,
            profile: None,
        }
    }

    #[test]
    fn test_grant_loan_leaves_reserves_unchanged() {
        let mut f = fixture(1_000_000, 0);
        let (info, deposit_id) = f
            .bank
            .grant_loan(&f.settlement, &mut f.ledger, &request(100_000), None, 1)
            .unwrap();

        assert_eq!(info.status, LoanStatus::Active);
        assert_eq!(f.bank.deposits().get(deposit_id).unwrap().amount, Money(100_000));
        assert_eq!(f.bank.reserves(&f.settlement), Money(1_000_000));
        assert!(f.bank.accounts().has_account(BANK, ALICE));
        f.assert_conserved();
    }

    #[test]
    fn test_reserve_accounts_cannot_open_deposits() {
        let mut f = fixture(1_000_000, 0);
        f.settlement
            .create_and_transfer(&mut f.ledger, AUTHORITY, AUTHORITY, Money(50_000), "mint", 0)
            .unwrap();

        for depositor in [BANK, AUTHORITY] {
            let result = f
                .bank
                .open_deposit(&mut f.settlement, depositor, Money(50_000), 1);
            assert!(matches!(result, Err(KernelError::ValidationError(_))));
        }
        assert_eq!(f.bank.deposits().total_deposits(), Money::ZERO);
        assert_eq!(f.bank.reserves(&f.settlement), Money(1_000_000));
        f.assert_conserved();
    }

    #[test]
    fn test_withdraw_then_repay_conserves_money() {
        let mut f = fixture(1_000_000, 0);
        f.bank
            .grant_loan(&f.settlement, &mut f.ledger, &request(12_000), None, 0)
            .unwrap();
        f.bank
            .withdraw_deposit(&mut f.settlement, ALICE, Money(12_000), 1)
            .unwrap();
        assert_eq!(f.settlement.get_balance(ALICE, Currency::Usd), Money(12_000));
        f.assert_conserved();

        let events = f.bank.service_loans(&mut f.settlement, &mut f.ledger, 30);
        assert!(matches!(events[0], LoanEvent::PaymentCollected { .. }));
        assert_eq!(
            f.settlement.journal().last().unwrap().kind,
            TransactionKind::LoanRepayment
        );
        f.assert_conserved();
    }

    #[test]
    fn test_repayment_falls_back_to_deposits() {
        let mut f = fixture(1_000_000, 0);
        f.bank
            .grant_loan(&f.settlement, &mut f.ledger, &request(12_000), None, 0)
            .unwrap();
        f.bank.service_loans(&mut f.settlement, &mut f.ledger, 30);

        assert!(f.bank.deposits().balance_of(ALICE) < Money(12_000));
        f.assert_conserved();
    }

    #[test]
    fn test_open_deposit_is_neutral() {
        let mut f = fixture(1_000, 500);
        f.bank
            .open_deposit(&mut f.settlement, ALICE, Money(300), 1)
            .unwrap();
        assert_eq!(f.bank.reserves(&f.settlement), Money(1_300));
        assert!(f.ledger.entries().is_empty());
        f.assert_conserved();

        let err = f
            .bank
            .open_deposit(&mut f.settlement, ALICE, Money(300), 1)
            .unwrap_err();
        assert!(matches!(err, KernelError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_deposit_interest_is_expansion() {
        let mut f = fixture(1_000_000, 120_000);
        f.bank
            .open_deposit(&mut f.settlement, ALICE, Money(120_000), 0)
            .unwrap();
        let credited = f.bank.accrue_deposit_interest(&mut f.ledger);
        assert_eq!(credited, Money(100));
        f.assert_conserved();
    }

    #[test]
    fn test_void_loan_records_destruction() {
        let mut f = fixture(1_000_000, 0);
        let (info, _) = f
            .bank
            .grant_loan(&f.settlement, &mut f.ledger, &request(5_000), None, 0)
            .unwrap();
        assert_eq!(f.bank.void_loan(&mut f.ledger, info.loan_id).unwrap(), Money(5_000));
        f.assert_conserved();
        assert_eq!(f.ledger.expected_m2(), Money::ZERO);
    }

    #[test]
    fn test_liquidation_writes_down_default() {
        let mut f = fixture(1_000_000, 0);
        let (info, _) = f
            .bank
            .grant_loan(&f.settlement, &mut f.ledger, &request(9_000), None, 0)
            .unwrap();
        f.bank
            .withdraw_deposit(&mut f.settlement, ALICE, Money(9_000), 0)
            .unwrap();
        f.settlement
            .transfer(ALICE, AUTHORITY, Money(8_500), "spent", 0, Currency::Usd)
            .unwrap();
        f.ledger
            .record_credit_destruction(Money(8_500), None, None, "spent into reserves");

        let mut defaults = Vec::new();
        for tick in [30, 60, 90] {
            for event in f.bank.service_loans(&mut f.settlement, &mut f.ledger, tick) {
                if let LoanEvent::Default(event) = event {
                    defaults.push(event);
                }
            }
        }
        assert_eq!(defaults.len(), 1);

        let record = f
            .bank
            .liquidate(
                &mut f.settlement,
                &mut f.ledger,
                &defaults[0],
                AssetValuation::default(),
                90,
            )
            .unwrap();
        assert_eq!(record.cash_seized, Money(500));
        assert_eq!(
            f.bank.loans().get_loan(info.loan_id).unwrap().remaining_balance,
            Money::ZERO
        );
        f.assert_conserved();
    }

    #[test]
    fn test_mortgage_desk_checks_cash() {
        let mut f = fixture(50_000, 0);
        let application = LoanApplication {
            applicant: ALICE,
            lender: BANK,
            principal: Money(80_000),
            property_id: PropertyId(1),
            property_value: Money(100_000),
            profile: BorrowerProfile::default(),
            staged_id: None,
        };
        let mut desk = f.bank.mortgage_desk(&f.settlement);
        assert!(matches!(
            desk.book_mortgage(&application, 1),
            Err(KernelError::ReserveViolation { .. })
        ));

        let mut f = fixture(1_000_000, 0);
        let mut desk = f.bank.mortgage_desk(&f.settlement);
        let approval = desk.book_mortgage(&application, 1).unwrap();
        assert_eq!(approval.principal, Money(80_000));
        assert_eq!(approval.rate, dec!(0.05));
        assert!(f.bank.deposits().find_by_loan(approval.loan_id).is_none());
    }

    #[test]
    fn test_estate_reassigns_bank_book() {
        let mut f = fixture(1_000_000, 0);
        f.bank
            .grant_loan(&f.settlement, &mut f.ledger, &request(1_000), None, 0)
            .unwrap();
        f.bank.settle_estate(ALICE, AgentId(11));
        assert_eq!(f.bank.deposits().balance_of(AgentId(11)), Money(1_000));
        assert_eq!(f.bank.loans().loans_of(AgentId(11)).len(), 1);
        assert!(f.bank.accounts().has_account(BANK, AgentId(11)));
        assert!(!f.bank.accounts().has_account(BANK, ALICE));
    }
}
