use crate::domain::ids::AgentId;
use crate::domain::money::{Currency, Money};
use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endowment {
    pub agent: AgentId,
    pub amount: Money,
    /// Income per billing period, seen by the credit scorer.
    #[serde(default)]
    pub income: Money,
}

/// Kernel configuration. Every field has a default so a partial JSON file is
/// enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Currency the monetary ledger measures.
    pub currency: Currency,
    pub authority_id: AgentId,
    pub bank_id: AgentId,
    pub bank_reserves: Money,
    /// Opening cash balances; they form the ledger baseline.
    pub endowments: Vec<Endowment>,
    pub reserve_ratio: Decimal,
    /// Full-reserve lending: principal must be covered by cash.
    pub gold_standard: bool,
    pub default_term: u64,
    pub billing_interval: u64,
    pub ticks_per_year: u64,
    pub loan_rate: Decimal,
    pub mortgage_rate: Decimal,
    pub deposit_rate: Decimal,
    pub max_missed_payments: u32,
    pub conservation_tolerance: u64,
    /// Ticks the loan market takes to decide on a staged application.
    pub decision_delay: u64,
    /// Ceiling on debt service as a share of income.
    pub max_debt_to_income: Decimal,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Usd,
            authority_id: AgentId(0),
            bank_id: AgentId(1),
            bank_reserves: Money(1_000_000),
            endowments: Vec::new(),
            reserve_ratio: dec!(0.10),
            gold_standard: false,
            default_term: 360,
            billing_interval: 30,
            ticks_per_year: 360,
            loan_rate: dec!(0.07),
            mortgage_rate: dec!(0.05),
            deposit_rate: dec!(0.01),
            max_missed_payments: 3,
            conservation_tolerance: 100,
            decision_delay: 1,
            max_debt_to_income: dec!(0.43),
        }
    }
}

impl KernelConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
