use crate::domain::ids::{LoanId, SagaId, Tick};
use crate::domain::money::Money;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Expansion,
    Destruction,
    /// Money created straight into a reserve account. Audited, outside M2.
    ReserveInjection,
    /// Money destroyed out of a reserve account. Audited, outside M2.
    ReserveDrain,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LedgerEntry {
    pub kind: LedgerEntryKind,
    pub amount: Money,
    pub saga_id: Option<SagaId>,
    pub loan_id: Option<LoanId>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConservationReport {
    pub tick: Tick,
    pub expected: Money,
    pub actual: Money,
    pub drift: i128,
    pub violated: bool,
}

/// Tracks expected versus measured money supply.
///
/// Owned by the simulation root; there is no global instance.
#[derive(Debug, Clone)]
pub struct MonetaryLedger {
    baseline: Money,
    expansions: Money,
    destructions: Money,
    tolerance: u64,
    entries: Vec<LedgerEntry>,
    violations: u64,
}

impl MonetaryLedger {
    pub const DEFAULT_TOLERANCE: u64 = 100;

    pub fn new(baseline: Money, tolerance: u64) -> Self {
        Self {
            baseline,
            expansions: Money::ZERO,
            destructions: Money::ZERO,
            tolerance,
            entries: Vec::new(),
            violations: 0,
        }
    }

    pub fn set_baseline(&mut self, baseline: Money) {
        self.baseline = baseline;
    }

    /// Drops every recorded entry and re-bases on `baseline`.
    pub fn reset(&mut self, baseline: Money) {
        self.baseline = baseline;
        self.expansions = Money::ZERO;
        self.destructions = Money::ZERO;
        self.entries.clear();
        self.violations = 0;
    }

    pub fn record_credit_expansion(
        &mut self,
        amount: Money,
        saga_id: Option<SagaId>,
        loan_id: Option<LoanId>,
        reason: impl Into<String>,
    ) {
        self.append(LedgerEntryKind::Expansion, amount, saga_id, loan_id, reason.into());
    }

    pub fn record_credit_destruction(
        &mut self,
        amount: Money,
        saga_id: Option<SagaId>,
        loan_id: Option<LoanId>,
        reason: impl Into<String>,
    ) {
        self.append(LedgerEntryKind::Destruction, amount, saga_id, loan_id, reason.into());
    }

    pub fn record_reserve_injection(&mut self, amount: Money, reason: impl Into<String>) {
        self.append(LedgerEntryKind::ReserveInjection, amount, None, None, reason.into());
    }

    pub fn record_reserve_drain(&mut self, amount: Money, reason: impl Into<String>) {
        self.append(LedgerEntryKind::ReserveDrain, amount, None, None, reason.into());
    }

    fn append(
        &mut self,
        kind: LedgerEntryKind,
        amount: Money,
        saga_id: Option<SagaId>,
        loan_id: Option<LoanId>,
        reason: String,
    ) {
        if amount.is_zero() {
            return;
        }
        match kind {
            LedgerEntryKind::Expansion => self.expansions += amount,
            LedgerEntryKind::Destruction => self.destructions += amount,
            LedgerEntryKind::ReserveInjection | LedgerEntryKind::ReserveDrain => {}
        }
        debug!(?kind, %amount, ?saga_id, ?loan_id, reason = %reason, "monetary ledger entry");
        self.entries.push(LedgerEntry {
            kind,
            amount,
            saga_id,
            loan_id,
            reason,
        });
    }

    /// `baseline + expansions - destructions`, floored at zero.
    pub fn expected_m2(&self) -> Money {
        (self.baseline + self.expansions).saturating_sub(self.destructions)
    }

    pub fn baseline(&self) -> Money {
        self.baseline
    }

    pub fn total_expansions(&self) -> Money {
        self.expansions
    }

    pub fn total_destructions(&self) -> Money {
        self.destructions
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    /// Compares a measured M2 against the expectation.
    pub fn check_conservation(&mut self, actual_m2: Money, tick: Tick) -> ConservationReport {
        let expected = self.expected_m2();
        let drift = i128::from(actual_m2.0) - i128::from(expected.0);
        let violated = drift.unsigned_abs() > u128::from(self.tolerance);
        if violated {
            self.violations += 1;
            error!(
                tick,
                %expected,
                actual = %actual_m2,
                drift = %drift,
                "monetary conservation violated"
            );
        }
        ConservationReport {
            tick,
            expected,
            actual: actual_m2,
            drift,
            violated,
        }
    }
}

impl Default for MonetaryLedger {
    fn default() -> Self {
        Self::new(Money::ZERO, Self::DEFAULT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_m2_tracks_entries() {
        let mut ledger = MonetaryLedger::new(Money(1_000), 100);
        ledger.record_credit_expansion(Money(500), Some(SagaId(1)), Some(LoanId(2)), "mortgage");
        ledger.record_credit_destruction(Money(200), None, Some(LoanId(2)), "repayment");

        assert_eq!(ledger.expected_m2(), Money(1_300));
        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.entries()[0].saga_id, Some(SagaId(1)));
    }

    #[test]
    fn test_reserve_entries_do_not_move_expected_m2() {
        let mut ledger = MonetaryLedger::new(Money(1_000), 100);
        ledger.record_reserve_injection(Money(5_000), "central bank lending");
        ledger.record_reserve_drain(Money(1_000), "reserve sterilization");
        assert_eq!(ledger.expected_m2(), Money(1_000));
        assert_eq!(ledger.entries().len(), 2);
    }

    #[test]
    fn test_zero_amount_entries_are_skipped() {
        let mut ledger = MonetaryLedger::default();
        ledger.record_credit_expansion(Money::ZERO, None, None, "noop");
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn test_conservation_within_tolerance() {
        let mut ledger = MonetaryLedger::new(Money(10_000), 100);
        let report = ledger.check_conservation(Money(10_100), 1);
        assert!(!report.violated);
        assert_eq!(report.drift, 100);

        let report = ledger.check_conservation(Money(9_899), 2);
        assert!(report.violated);
        assert_eq!(ledger.violations(), 1);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut ledger = MonetaryLedger::new(Money(10), 100);
        ledger.record_credit_expansion(Money(5), None, None, "mint");
        ledger.reset(Money(42));
        assert_eq!(ledger.expected_m2(), Money(42));
        assert!(ledger.entries().is_empty());
    }
}
