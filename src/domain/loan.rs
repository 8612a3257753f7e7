use super::ids::{AgentId, DepositId, LoanId, Tick};
use super::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Active,
    Default,
    Terminated,
    Repaid,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Active)
    }
}

/// A loan on the bank's book. Flat so it can be persisted as-is.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: AgentId,
    pub lender: AgentId,
    pub principal: Money,
    /// Never increases after origination.
    pub remaining_balance: Money,
    /// Annual nominal rate.
    pub rate: Decimal,
    pub origination_tick: Tick,
    /// Term in ticks.
    pub term: u64,
    pub due_tick: Tick,
    pub status: LoanStatus,
    pub missed_payments: u32,
    pub interest_paid: Money,
    /// Deposit created together with the loan, if it was book-entry money.
    pub deposit_id: Option<DepositId>,
}

impl Loan {
    pub fn info(&self) -> LoanInfo {
        LoanInfo {
            loan_id: self.id,
            borrower: self.borrower,
            lender: self.lender,
            principal: self.principal,
            remaining_balance: self.remaining_balance,
            rate: self.rate,
            origination_tick: self.origination_tick,
            term: self.term,
            due_tick: self.due_tick,
            status: self.status,
        }
    }

    /// Reduces the remaining balance, capped at what is still owed.
    pub(crate) fn reduce_balance(&mut self, amount: Money) -> Money {
        let applied = amount.min(self.remaining_balance);
        self.remaining_balance -= applied;
        applied
    }
}

/// Read-only summary handed out to callers.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LoanInfo {
    pub loan_id: LoanId,
    pub borrower: AgentId,
    pub lender: AgentId,
    pub principal: Money,
    pub remaining_balance: Money,
    pub rate: Decimal,
    pub origination_tick: Tick,
    pub term: u64,
    pub due_tick: Tick,
    pub status: LoanStatus,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Deposit {
    pub id: DepositId,
    pub depositor: AgentId,
    pub bank: AgentId,
    pub amount: Money,
    pub rate: Decimal,
    pub loan_id: Option<LoanId>,
}

/// Borrower facts the credit scorer works from.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct BorrowerProfile {
    pub borrower: AgentId,
    /// Income per billing period.
    pub income: Money,
    /// Existing debt service per billing period.
    pub existing_debt_payments: Money,
    pub liquid_assets: Money,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CreditAssessment {
    pub approved: bool,
    pub max_amount: Money,
    pub reason: Option<String>,
}

impl CreditAssessment {
    pub fn approve(max_amount: Money) -> Self {
        Self {
            approved: true,
            max_amount,
            reason: None,
        }
    }

    pub fn decline(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            max_amount: Money::ZERO,
            reason: Some(reason.into()),
        }
    }
}

/// A billing request produced while servicing the loan book.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub borrower: AgentId,
    pub lender: AgentId,
    pub principal_part: Money,
    pub interest_part: Money,
    pub tick: Tick,
}

impl PaymentRequest {
    pub fn amount(&self) -> Money {
        self.principal_part + self.interest_part
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        Loan {
            id: LoanId(1),
            borrower: AgentId(10),
            lender: AgentId(1),
            principal: Money(1_000),
            remaining_balance: Money(1_000),
            rate: dec!(0.05),
            origination_tick: 0,
            term: 360,
            due_tick: 360,
            status: LoanStatus::Active,
            missed_payments: 0,
            interest_paid: Money::ZERO,
            deposit_id: None,
        }
    }

    #[test]
    fn test_reduce_balance_is_capped() {
        let mut loan = loan();
        assert_eq!(loan.reduce_balance(Money(400)), Money(400));
        assert_eq!(loan.reduce_balance(Money(900)), Money(600));
        assert_eq!(loan.remaining_balance, Money::ZERO);
    }

    #[test]
    fn test_loan_status_serialization() {
        let json = serde_json::to_string(&LoanStatus::Default).unwrap();
        assert_eq!(json, "\"DEFAULT\"");
        assert!(LoanStatus::Repaid.is_terminal());
        assert!(!LoanStatus::Active.is_terminal());
    }

    #[test]
    fn test_loan_record_roundtrips_through_json() {
        let loan = loan();
        let bytes = serde_json::to_vec(&loan).unwrap();
        let back: Loan = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, loan);
    }
}
