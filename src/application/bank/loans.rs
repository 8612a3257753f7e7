use super::deposits::DepositManager;
use crate::domain::events::LoanDefaultEvent;
use crate::domain::ids::{AgentId, DepositId, LoanId, Tick};
use crate::domain::loan::{BorrowerProfile, Loan, LoanInfo, LoanStatus, PaymentRequest};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::CreditScoringService;
use crate::domain::wallet::Wallet;
use crate::error::{KernelError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What a borrower asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanRequest {
    pub borrower: AgentId,
    pub amount: Money,
    pub rate: Decimal,
    /// Explicit maturity; defaults to origination plus the default term.
    pub due_tick: Option<Tick>,
    pub profile: Option<BorrowerProfile>,
}

/// Reserve rules the lender must satisfy before creating money.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservePolicy {
    pub currency: Currency,
    pub reserve_ratio: Decimal,
    /// Full-reserve mode: every unit lent must already be held in cash.
    pub gold_standard: bool,
    pub default_term: u64,
    pub deposit_rate: Decimal,
}

impl ReservePolicy {
    /// Cash the lender can commit after backing its existing deposits.
    fn free_reserves(&self, cash: Money, deposits: Money) -> Money {
        if self.gold_standard {
            cash.saturating_sub(deposits)
        } else {
            cash.saturating_sub(deposits.scale_ceil(self.reserve_ratio))
        }
    }

    /// Checks the lender can back `new_money` of fresh deposits.
    pub fn check_new_money(&self, cash: Money, deposits: Money, new_money: Money) -> Result<()> {
        let available = self.free_reserves(cash, deposits);
        let required = if self.gold_standard {
            new_money
        } else {
            new_money.scale_ceil(self.reserve_ratio)
        };
        if available < required {
            return Err(KernelError::ReserveViolation {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Checks the lender can pay out `amount` in cash and still back its
    /// deposits.
    pub fn check_cash_disbursal(&self, cash: Money, deposits: Money, amount: Money) -> Result<()> {
        let available = self.free_reserves(cash, deposits);
        if available < amount {
            return Err(KernelError::ReserveViolation {
                required: amount,
                available,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServicingTerms {
    pub billing_interval: u64,
    pub ticks_per_year: u64,
    pub max_missed_payments: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoanEvent {
    PaymentCollected {
        loan_id: LoanId,
        borrower: AgentId,
        principal: Money,
        interest: Money,
    },
    PaymentMissed {
        loan_id: LoanId,
        borrower: AgentId,
        consecutive: u32,
    },
    Repaid {
        loan_id: LoanId,
        borrower: AgentId,
    },
    Default(LoanDefaultEvent),
}

/// The bank's loan book.
#[derive(Debug, Clone)]
pub struct LoanManager {
    lender: AgentId,
    terms: ServicingTerms,
    loans: BTreeMap<LoanId, Loan>,
    archived: Vec<Loan>,
    next_id: u64,
}

impl LoanManager {
    pub fn new(lender: AgentId, terms: ServicingTerms) -> Self {
        Self {
            lender,
            terms,
            loans: BTreeMap::new(),
            archived: Vec::new(),
            next_id: 1,
        }
    }

    pub fn lender(&self) -> AgentId {
        self.lender
    }

    /// Runs the credit and reserve gates, then books a loan together with the
    /// deposit that carries its principal. Nothing is created unless every
    /// gate passes.
    #[allow(clippy::too_many_arguments)]
    pub fn assess_and_create_loan(
        &mut self,
        request: &LoanRequest,
        credit_scoring: Option<&dyn CreditScoringService>,
        lender_wallet: &Wallet,
        deposits: &mut DepositManager,
        current_tick: Tick,
        policy: &ReservePolicy,
    ) -> Result<(LoanInfo, DepositId)> {
        if request.amount.is_zero() {
            return Err(KernelError::ValidationError(
                "Loan amount must be positive".to_string(),
            ));
        }

        if let Some(scoring) = credit_scoring {
            let profile = request.profile.clone().unwrap_or_else(|| BorrowerProfile {
                borrower: request.borrower,
                ..BorrowerProfile::default()
            });
            let assessment = scoring.assess_creditworthiness(&profile, request.amount);
            if !assessment.approved || request.amount > assessment.max_amount {
                let reason = assessment
                    .reason
                    .unwrap_or_else(|| format!("requested {} above limit", request.amount));
                info!(borrower = %request.borrower, amount = %request.amount, %reason, "loan declined");
                return Err(KernelError::CreditRejected {
                    borrower: request.borrower,
                    reason,
                });
            }
        }

        let cash = lender_wallet.get_balance(policy.currency);
        policy.check_new_money(cash, deposits.total_deposits(), request.amount)?;

        let loan_id = self.allocate_id();
        let deposit_id = deposits.create_deposit(
            request.borrower,
            self.lender,
            request.amount,
            policy.deposit_rate,
            Some(loan_id),
        );
        let term = policy.default_term;
        let due_tick = request.due_tick.unwrap_or(current_tick + term);
        let loan = Loan {
            id: loan_id,
            borrower: request.borrower,
            lender: self.lender,
            principal: request.amount,
            remaining_balance: request.amount,
            rate: request.rate,
            origination_tick: current_tick,
            term: due_tick.saturating_sub(current_tick).max(1),
            due_tick,
            status: LoanStatus::Active,
            missed_payments: 0,
            interest_paid: Money::ZERO,
            deposit_id: Some(deposit_id),
        };
        let info = loan.info();
        self.loans.insert(loan_id, loan);
        info!(%loan_id, borrower = %request.borrower, amount = %request.amount, %deposit_id, "loan granted");
        Ok((info, deposit_id))
    }

    /// Books a cash-disbursed loan with no paired deposit.
    pub fn book_mortgage(
        &mut self,
        borrower: AgentId,
        principal: Money,
        rate: Decimal,
        term: u64,
        current_tick: Tick,
    ) -> LoanInfo {
        let loan_id = self.allocate_id();
        let term = term.max(1);
        let loan = Loan {
            id: loan_id,
            borrower,
            lender: self.lender,
            principal,
            remaining_balance: principal,
            rate,
            origination_tick: current_tick,
            term,
            due_tick: current_tick + term,
            status: LoanStatus::Active,
            missed_payments: 0,
            interest_paid: Money::ZERO,
            deposit_id: None,
        };
        let info = loan.info();
        self.loans.insert(loan_id, loan);
        info!(%loan_id, %borrower, %principal, "mortgage booked");
        info
    }

    /// Bills every loan whose billing date is `tick`.
    ///
    /// A failed payment counts as a miss; reaching the missed-payment limit
    /// moves the loan to `DEFAULT` and emits one default event carrying the
    /// remaining balance.
    pub fn service_loans<F>(&mut self, tick: Tick, mut payment_callback: F) -> Vec<LoanEvent>
    where
        F: FnMut(&PaymentRequest) -> bool,
    {
        let mut events = Vec::new();
        let mut finished = Vec::new();

        for loan in self.loans.values_mut() {
            if loan.status != LoanStatus::Active || !Self::is_billing_tick(loan, tick, &self.terms)
            {
                continue;
            }
            let request = Self::payment_due(loan, tick, &self.terms);
            if request.amount().is_zero() {
                continue;
            }

            if payment_callback(&request) {
                loan.reduce_balance(request.principal_part);
                loan.interest_paid += request.interest_part;
                loan.missed_payments = 0;
                events.push(LoanEvent::PaymentCollected {
                    loan_id: loan.id,
                    borrower: loan.borrower,
                    principal: request.principal_part,
                    interest: request.interest_part,
                });
                if loan.remaining_balance.is_zero() {
                    loan.status = LoanStatus::Repaid;
                    finished.push(loan.id);
                    info!(loan_id = %loan.id, borrower = %loan.borrower, "loan repaid");
                    events.push(LoanEvent::Repaid {
                        loan_id: loan.id,
                        borrower: loan.borrower,
                    });
                }
                continue;
            }

            loan.missed_payments += 1;
            events.push(LoanEvent::PaymentMissed {
                loan_id: loan.id,
                borrower: loan.borrower,
                consecutive: loan.missed_payments,
            });
            if loan.missed_payments >= self.terms.max_missed_payments {
                loan.status = LoanStatus::Default;
                warn!(
                    loan_id = %loan.id,
                    borrower = %loan.borrower,
                    creditor = %loan.lender,
                    defaulted_amount = %loan.remaining_balance,
                    "loan defaulted"
                );
                events.push(LoanEvent::Default(LoanDefaultEvent::new(
                    tick,
                    loan.borrower,
                    loan.id,
                    loan.remaining_balance,
                    loan.lender,
                )));
            }
        }

        for loan_id in finished {
            self.archive(loan_id);
        }
        events
    }

    fn is_billing_tick(loan: &Loan, tick: Tick, terms: &ServicingTerms) -> bool {
        let interval = terms.billing_interval.max(1);
        tick > loan.origination_tick && (tick - loan.origination_tick) % interval == 0
    }

    fn payment_due(loan: &Loan, tick: Tick, terms: &ServicingTerms) -> PaymentRequest {
        let interval = terms.billing_interval.max(1);
        let installments = loan.term.div_ceil(interval).max(1);
        let principal_part = if tick >= loan.due_tick {
            loan.remaining_balance
        } else {
            Money(loan.principal.0.div_ceil(installments)).min(loan.remaining_balance)
        };
        let period_fraction =
            Decimal::from(interval) / Decimal::from(terms.ticks_per_year.max(1));
        let interest_part = loan.remaining_balance.scale(loan.rate * period_fraction);
        PaymentRequest {
            loan_id: loan.id,
            borrower: loan.borrower,
            lender: loan.lender,
            principal_part,
            interest_part,
            tick,
        }
    }

    /// Voids a loan before its money went out. Returns the balance destroyed.
    pub fn terminate_loan(&mut self, loan_id: LoanId) -> Result<Money> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(KernelError::UnknownLoan(loan_id))?;
        let destroyed = loan.remaining_balance;
        loan.remaining_balance = Money::ZERO;
        loan.status = LoanStatus::Terminated;
        info!(%loan_id, borrower = %loan.borrower, %destroyed, "loan terminated");
        self.archive(loan_id);
        Ok(destroyed)
    }

    /// Reverses a loan together with its paired deposit. Returns the deposit
    /// amount destroyed.
    ///
    /// A missing or drawn-down paired deposit means money already left the
    /// book; that is a rollback-integrity failure, never silently ignored.
    pub fn void_loan(&mut self, loan_id: LoanId, deposits: &mut DepositManager) -> Result<Money> {
        let loan = self
            .loans
            .get(&loan_id)
            .ok_or(KernelError::UnknownLoan(loan_id))?;
        let deposit_id = loan.deposit_id.ok_or_else(|| {
            KernelError::RollbackIntegrity(format!("{} has no paired deposit to void", loan_id))
        })?;
        let deposit = deposits.get(deposit_id).ok_or_else(|| {
            KernelError::RollbackIntegrity(format!(
                "paired {} of {} not found",
                deposit_id, loan_id
            ))
        })?;
        if deposit.amount < loan.remaining_balance {
            return Err(KernelError::RollbackIntegrity(format!(
                "paired {} of {} holds {} but {} is outstanding",
                deposit_id, loan_id, deposit.amount, loan.remaining_balance
            )));
        }

        let destroyed = deposits
            .remove(deposit_id)
            .map(|d| d.amount)
            .unwrap_or_default();
        if let Some(loan) = self.loans.get_mut(&loan_id) {
            loan.remaining_balance = Money::ZERO;
            loan.status = LoanStatus::Terminated;
        }
        self.archive(loan_id);
        info!(%loan_id, %deposit_id, %destroyed, "loan voided");
        Ok(destroyed)
    }

    /// Books the value recovered on a defaulted loan and writes off the
    /// rest. Returns the amount written off.
    pub fn write_down(&mut self, loan_id: LoanId, recovered: Money) -> Result<Money> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(KernelError::UnknownLoan(loan_id))?;
        if loan.status != LoanStatus::Default {
            return Err(KernelError::ValidationError(format!(
                "{} is {:?}, only defaulted loans can be written down",
                loan_id, loan.status
            )));
        }
        loan.reduce_balance(recovered);
        let written_off = loan.remaining_balance;
        loan.remaining_balance = Money::ZERO;
        info!(%loan_id, %recovered, %written_off, "defaulted loan written down");
        self.archive(loan_id);
        Ok(written_off)
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans
            .get(&loan_id)
            .or_else(|| self.archived.iter().find(|l| l.id == loan_id))
    }

    pub fn active_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans
            .values()
            .filter(|l| l.status == LoanStatus::Active)
    }

    pub fn loans_of(&self, borrower: AgentId) -> Vec<&Loan> {
        self.loans
            .values()
            .filter(|l| l.borrower == borrower)
            .collect()
    }

    pub fn archived(&self) -> &[Loan] {
        &self.archived
    }

    /// Reassigns outstanding loans of a deceased borrower to the estate heir.
    pub fn reassign(&mut self, from: AgentId, to: AgentId) -> usize {
        let mut moved = 0;
        for loan in self.loans.values_mut().filter(|l| l.borrower == from) {
            loan.borrower = to;
            moved += 1;
        }
        moved
    }

    /// Every loan on the book, live and archived, as flat records.
    pub fn records(&self) -> Vec<Loan> {
        self.loans
            .values()
            .chain(self.archived.iter())
            .cloned()
            .collect()
    }

    pub fn restore(&mut self, records: Vec<Loan>) {
        for loan in records {
            self.next_id = self.next_id.max(loan.id.0 + 1);
            if matches!(loan.status, LoanStatus::Repaid | LoanStatus::Terminated) {
                self.archived.push(loan);
            } else {
                self.loans.insert(loan.id, loan);
            }
        }
    }

    fn allocate_id(&mut self) -> LoanId {
        let id = LoanId(self.next_id);
        self.next_id += 1;
        id
    }

    fn archive(&mut self, loan_id: LoanId) {
        if let Some(loan) = self.loans.remove(&loan_id) {
            self.archived.push(loan);
        }
    }
}
