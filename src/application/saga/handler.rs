use super::SagaContext;
use crate::domain::ids::{AgentId, LoanId};
use crate::domain::loan::BorrowerProfile;
use crate::domain::money::Money;
use crate::domain::ports::ApplicationStatus;
use crate::domain::saga::{HousingSaga, LoanApplication, SagaStatus};
use crate::domain::transaction::{SettlementLeg, TransactionKind};
use crate::error::{KernelError, Result};
use tracing::{error, info, warn};

/// Drives one housing purchase through its states.
///
/// `step` either advances the saga or returns the error that must be
/// compensated; `compensate` unwinds whatever the saga has done so far.
#[derive(Debug, Default, Clone, Copy)]
pub struct HousingSagaHandler;

impl HousingSagaHandler {
    pub fn new() -> Self {
        Self
    }

    /// Runs at most one state per tick. A second call within the same tick
    /// does nothing.
    pub fn step(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        if saga.status.is_terminal() || saga.last_processed_tick == Some(ctx.tick) {
            return Ok(());
        }
        saga.last_processed_tick = Some(ctx.tick);

        match saga.status {
            SagaStatus::Initiated => self.initiate(saga, ctx),
            SagaStatus::CreditCheck => self.check_credit(saga, ctx),
            SagaStatus::Approved => self.finalize_loan(saga, ctx),
            SagaStatus::EscrowLocked => self.settle_escrow(saga, ctx),
            SagaStatus::TransferTitle => self.transfer_title(saga, ctx),
            SagaStatus::Completed | SagaStatus::FailedRolledBack | SagaStatus::Cancelled => Ok(()),
        }
    }

    fn initiate(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        let (buyer, _) = parties(saga)?;
        ctx.housing
            .set_under_contract(saga.property_id, saga.id)
            .map_err(|e| KernelError::step_failure(saga.id, saga.status, e))?;
        saga.property_locked = true;

        let principal = saga.principal();
        if !principal.is_zero() {
            let mut application = LoanApplication {
                applicant: buyer,
                lender: ctx.bank.id(),
                principal,
                property_id: saga.property_id,
                property_value: saga.offer_price,
                profile: BorrowerProfile {
                    borrower: buyer,
                    income: saga.buyer.income,
                    existing_debt_payments: saga.buyer.existing_debt_payments,
                    liquid_assets: saga.buyer.cash,
                },
                staged_id: None,
            };
            let staged = ctx
                .loan_market
                .stage_mortgage_application(&application, ctx.tick)
                .map_err(|e| KernelError::step_failure(saga.id, saga.status, e))?;
            application.staged_id = Some(staged);
            saga.loan_application = Some(application);
            saga.record(ctx.tick, format!("staged {} for {}", staged, principal));
        }
        saga.transition(ctx.tick, SagaStatus::CreditCheck);
        Ok(())
    }

    fn check_credit(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        let Some(staged) = saga.loan_application.as_ref().and_then(|a| a.staged_id) else {
            saga.transition(ctx.tick, SagaStatus::Approved);
            return Ok(());
        };
        match ctx.loan_market.check_staged_application_status(staged, ctx.tick) {
            ApplicationStatus::Pending => {
                saga.record(ctx.tick, "awaiting underwriting decision");
                Ok(())
            }
            ApplicationStatus::Rejected(reason) => {
                Err(KernelError::step_failure(saga.id, saga.status, reason))
            }
            ApplicationStatus::Approved => {
                saga.transition(ctx.tick, SagaStatus::Approved);
                Ok(())
            }
        }
    }

    fn finalize_loan(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        if let Some(staged) = saga.loan_application.as_ref().and_then(|a| a.staged_id) {
            let approval = {
                let mut desk = ctx.bank.mortgage_desk(ctx.settlement);
                ctx.loan_market
                    .convert_staged_to_loan(staged, &mut desk, ctx.tick)
                    .map_err(|e| KernelError::step_failure(saga.id, saga.status, e))?
            };
            saga.staged_loan_id = Some(approval.loan_id);
            if let Some(application) = saga.loan_application.as_mut() {
                application.staged_id = None;
            }
            saga.record(
                ctx.tick,
                format!("{} booked for {}", approval.loan_id, approval.principal),
            );
            let loan_id = approval.loan_id;
            let principal = approval.principal;
            saga.mortgage_approval = Some(approval);

            ctx.housing
                .add_lien(saga.property_id, loan_id, principal)
                .map_err(|e| KernelError::step_failure(saga.id, saga.status, e))?;
            saga.lien_attached = true;
        }
        saga.transition(ctx.tick, SagaStatus::EscrowLocked);
        Ok(())
    }

    fn settle_escrow(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        let legs = escrow_legs(saga, ctx.bank.id())?;
        if !ctx
            .settlement
            .settle_legs(&legs, ctx.tick, TransactionKind::SettlementLeg)
        {
            return Err(KernelError::step_failure(
                saga.id,
                saga.status,
                "escrow settlement refused",
            ));
        }
        saga.escrow_settled = true;
        if let Some(approval) = &saga.mortgage_approval {
            ctx.ledger.record_credit_expansion(
                approval.principal,
                Some(saga.id),
                Some(approval.loan_id),
                "mortgage disbursal",
            );
        }
        info!(saga_id = %saga.id, price = %saga.offer_price, principal = %saga.principal(), "escrow settled");
        saga.transition(ctx.tick, SagaStatus::TransferTitle);
        Ok(())
    }

    fn transfer_title(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        let (buyer, seller) = parties(saga)?;
        ctx.housing
            .transfer_ownership(saga.property_id, seller, buyer)
            .map_err(|e| KernelError::step_failure(saga.id, saga.status, e))?;
        if let Err(e) = ctx.housing.release_contract(saga.property_id, saga.id) {
            warn!(saga_id = %saga.id, property = %saga.property_id, "lock release after title transfer failed: {}", e);
        }
        saga.property_locked = false;
        saga.transition(ctx.tick, SagaStatus::Completed);
        info!(saga_id = %saga.id, %buyer, %seller, property = %saga.property_id, "housing purchase completed");
        Ok(())
    }

    /// Unwinds the saga and leaves it in `terminal`.
    ///
    /// Only a settlement reversal that cannot be applied, or a loan void that
    /// finds its book inconsistent, fails; both are fatal.
    pub fn compensate(
        &self,
        saga: &mut HousingSaga,
        ctx: &mut SagaContext<'_>,
        terminal: SagaStatus,
        reason: &str,
    ) -> Result<()> {
        warn!(
            saga_id = %saga.id,
            status = %saga.status,
            buyer = ?saga.buyer_id(),
            seller = ?saga.seller_id(),
            reason,
            "compensating saga"
        );

        if saga.escrow_settled {
            self.reverse_escrow(saga, ctx)?;
        }

        if saga.lien_attached
            && let Some(loan_id) = saga.staged_loan_id
        {
            if let Err(e) = ctx.housing.remove_lien(saga.property_id, loan_id) {
                warn!(saga_id = %saga.id, %loan_id, "lien removal failed: {}", e);
            }
            saga.lien_attached = false;
        }

        if let Some(loan_id) = saga.staged_loan_id.take() {
            self.void_loan(saga, ctx, loan_id)?;
        }

        if let Some(staged) = saga
            .loan_application
            .as_mut()
            .and_then(|a| a.staged_id.take())
        {
            ctx.loan_market.void_staged_application(staged);
        }

        if saga.property_locked {
            if let Err(e) = ctx.housing.release_contract(saga.property_id, saga.id) {
                warn!(saga_id = %saga.id, property = %saga.property_id, "lock release failed: {}", e);
            }
            saga.property_locked = false;
        }

        saga.error_message = Some(reason.to_string());
        saga.transition(ctx.tick, terminal);
        Ok(())
    }

    fn reverse_escrow(&self, saga: &mut HousingSaga, ctx: &mut SagaContext<'_>) -> Result<()> {
        let legs: Vec<SettlementLeg> = escrow_legs(saga, ctx.bank.id())?
            .iter()
            .rev()
            .map(SettlementLeg::mirrored)
            .collect();
        if !ctx
            .settlement
            .settle_legs(&legs, ctx.tick, TransactionKind::Reversal)
        {
            error!(
                saga_id = %saga.id,
                buyer = ?saga.buyer_id(),
                seller = ?saga.seller_id(),
                price = %saga.offer_price,
                "escrow reversal could not be applied"
            );
            return Err(KernelError::RollbackIntegrity(format!(
                "escrow reversal of {} could not be applied",
                saga.id
            )));
        }
        saga.escrow_settled = false;
        if let Some(approval) = &saga.mortgage_approval {
            ctx.ledger.record_credit_destruction(
                approval.principal,
                Some(saga.id),
                Some(approval.loan_id),
                "mortgage reversal",
            );
        }
        saga.record(ctx.tick, "escrow reversed");
        Ok(())
    }

    fn void_loan(
        &self,
        saga: &mut HousingSaga,
        ctx: &mut SagaContext<'_>,
        loan_id: LoanId,
    ) -> Result<()> {
        let paired = ctx
            .bank
            .loans()
            .get_loan(loan_id)
            .map(|loan| loan.deposit_id.is_some());
        let outcome = match paired {
            Some(true) => ctx.bank.void_loan(ctx.ledger, loan_id),
            Some(false) => ctx.bank.terminate_loan(loan_id),
            None => Err(KernelError::UnknownLoan(loan_id)),
        };
        match outcome {
            Ok(amount) => {
                saga.record(ctx.tick, format!("{} voided ({})", loan_id, amount));
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(saga_id = %saga.id, %loan_id, "loan void failed: {}", e);
                Ok(())
            }
        }
    }
}

fn parties(saga: &HousingSaga) -> Result<(AgentId, AgentId)> {
    match (saga.buyer_id(), saga.seller_id()) {
        (Some(buyer), Some(seller)) => Ok((buyer, seller)),
        _ => Err(KernelError::ValidationError(format!(
            "{} is missing a participant",
            saga.id
        ))),
    }
}

/// Disbursal then payment, in that order so the buyer can pay with the loan.
fn escrow_legs(saga: &HousingSaga, bank: AgentId) -> Result<Vec<SettlementLeg>> {
    let (buyer, seller) = parties(saga)?;
    let mut legs = Vec::with_capacity(2);
    if let Some(approval) = &saga.mortgage_approval
        && approval.principal > Money::ZERO
    {
        legs.push(SettlementLeg::new(
            bank,
            buyer,
            approval.principal,
            format!("mortgage disbursal {}", saga.id),
        ));
    }
    legs.push(SettlementLeg::new(
        buyer,
        seller,
        saga.offer_price,
        format!("purchase price {}", saga.id),
    ));
    Ok(legs)
}
