//! Multi-tick compound transactions with compensation.

pub mod handler;
pub mod orchestrator;

use crate::application::bank::Bank;
use crate::application::ledger::MonetaryLedger;
use crate::application::settlement::SettlementSystem;
use crate::domain::ids::Tick;
use crate::domain::ports::{HousingService, LoanMarket};

/// Everything a saga step may touch during one tick.
pub struct SagaContext<'a> {
    pub settlement: &'a mut SettlementSystem,
    pub ledger: &'a mut MonetaryLedger,
    pub bank: &'a mut Bank,
    pub housing: &'a mut dyn HousingService,
    pub loan_market: &'a mut dyn LoanMarket,
    pub tick: Tick,
}
