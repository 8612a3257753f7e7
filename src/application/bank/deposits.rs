use crate::domain::ids::{AgentId, DepositId, LoanId};
use crate::domain::loan::Deposit;
use crate::domain::money::Money;
use crate::error::{KernelError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// The bank's deposit liabilities.
#[derive(Debug, Clone)]
pub struct DepositManager {
    deposits: BTreeMap<DepositId, Deposit>,
    next_id: u64,
}

impl Default for DepositManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DepositManager {
    pub fn new() -> Self {
        Self {
            deposits: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn create_deposit(
        &mut self,
        depositor: AgentId,
        bank: AgentId,
        amount: Money,
        rate: Decimal,
        loan_id: Option<LoanId>,
    ) -> DepositId {
        let id = DepositId(self.next_id);
        self.next_id += 1;
        self.deposits.insert(
            id,
            Deposit {
                id,
                depositor,
                bank,
                amount,
                rate,
                loan_id,
            },
        );
        id
    }

    pub fn get(&self, id: DepositId) -> Option<&Deposit> {
        self.deposits.get(&id)
    }

    pub fn remove(&mut self, id: DepositId) -> Option<Deposit> {
        self.deposits.remove(&id)
    }

    pub fn find_by_loan(&self, loan_id: LoanId) -> Option<&Deposit> {
        self.deposits.values().find(|d| d.loan_id == Some(loan_id))
    }

    pub fn deposits_of(&self, depositor: AgentId) -> impl Iterator<Item = &Deposit> {
        self.deposits
            .values()
            .filter(move |d| d.depositor == depositor)
    }

    pub fn balance_of(&self, depositor: AgentId) -> Money {
        self.deposits_of(depositor).map(|d| d.amount).sum()
    }

    pub fn total_deposits(&self) -> Money {
        self.deposits.values().map(|d| d.amount).sum()
    }

    pub fn credit(&mut self, id: DepositId, amount: Money) -> Result<()> {
        let deposit = self
            .deposits
            .get_mut(&id)
            .ok_or(KernelError::UnknownDeposit(id))?;
        deposit.amount += amount;
        Ok(())
    }

    pub fn withdraw(&mut self, id: DepositId, amount: Money) -> Result<()> {
        let deposit = self
            .deposits
            .get_mut(&id)
            .ok_or(KernelError::UnknownDeposit(id))?;
        match deposit.amount.checked_sub(amount) {
            Some(remaining) => {
                deposit.amount = remaining;
                Ok(())
            }
            None => Err(KernelError::ValidationError(format!(
                "{} holds {}, cannot withdraw {}",
                id, deposit.amount, amount
            ))),
        }
    }

    /// Debits `amount` across the depositor's deposits, oldest first. Refuses
    /// without touching anything if their combined balance is short.
    pub fn debit_depositor(&mut self, depositor: AgentId, amount: Money) -> bool {
        if self.balance_of(depositor) < amount {
            return false;
        }
        let mut outstanding = amount;
        for deposit in self
            .deposits
            .values_mut()
            .filter(|d| d.depositor == depositor)
        {
            if outstanding.is_zero() {
                break;
            }
            let taken = outstanding.min(deposit.amount);
            deposit.amount -= taken;
            outstanding -= taken;
        }
        true
    }

    /// Credits interest for `period_fraction` of a year on every deposit.
    /// Returns the total credited.
    pub fn accrue_interest(&mut self, period_fraction: Decimal) -> Money {
        let mut total = Money::ZERO;
        for deposit in self.deposits.values_mut() {
            let interest = deposit.amount.scale(deposit.rate * period_fraction);
            deposit.amount += interest;
            total += interest;
        }
        total
    }

    /// Hands every deposit of `from` over to `to`.
    pub fn reassign(&mut self, from: AgentId, to: AgentId) -> usize {
        let mut moved = 0;
        for deposit in self.deposits.values_mut().filter(|d| d.depositor == from) {
            deposit.depositor = to;
            moved += 1;
        }
        moved
    }

    pub fn records(&self) -> Vec<Deposit> {
        self.deposits.values().cloned().collect()
    }

    pub fn restore(&mut self, records: Vec<Deposit>) {
        for deposit in records {
            self.next_id = self.next_id.max(deposit.id.0 + 1);
            self.deposits.insert(deposit.id, deposit);
        }
    }
}
