use super::ids::{AgentId, Tick, TransactionId};
use super::money::{Currency, Money};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    SettlementLeg,
    Mint,
    Burn,
    LoanRepayment,
    Liquidation,
    Estate,
    Reversal,
}

/// Immutable record of one completed money movement.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub debit: AgentId,
    pub credit: AgentId,
    pub amount: Money,
    pub currency: Currency,
    pub memo: String,
    pub tick: Tick,
    pub kind: TransactionKind,
}

/// One leg of a multi-party settlement batch.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct SettlementLeg {
    pub debit: AgentId,
    pub credit: AgentId,
    pub amount: Money,
    pub memo: String,
}

impl SettlementLeg {
    pub fn new(debit: AgentId, credit: AgentId, amount: Money, memo: impl Into<String>) -> Self {
        Self {
            debit,
            credit,
            amount,
            memo: memo.into(),
        }
    }

    /// The leg that undoes this one.
    pub fn mirrored(&self) -> Self {
        Self {
            debit: self.credit,
            credit: self.debit,
            amount: self.amount,
            memo: format!("reversal: {}", self.memo),
        }
    }
}
