use super::SagaContext;
use super::handler::HousingSagaHandler;
use crate::domain::ids::{AgentId, SagaId, Tick};
use crate::domain::money::Money;
use crate::domain::ports::ParticipantDirectory;
use crate::domain::saga::{HousingSaga, SagaStatus};
use crate::error::{KernelError, Result};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// How a saga ended, reported on the tick it reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaOutcome {
    pub saga_id: SagaId,
    pub status: SagaStatus,
    pub buyer: Option<AgentId>,
    pub seller: Option<AgentId>,
    pub error: Option<String>,
    pub tick: Tick,
}

impl SagaOutcome {
    fn of(saga: &HousingSaga, tick: Tick) -> Self {
        Self {
            saga_id: saga.id,
            status: saga.status,
            buyer: saga.buyer_id(),
            seller: saga.seller_id(),
            error: saga.error_message.clone(),
            tick,
        }
    }
}

/// Owns every live saga and advances each one step per tick.
#[derive(Debug, Default)]
pub struct SagaOrchestrator {
    sagas: BTreeMap<SagaId, HousingSaga>,
    handler: HousingSagaHandler,
    next_id: u64,
}

impl SagaOrchestrator {
    pub fn new() -> Self {
        Self {
            sagas: BTreeMap::new(),
            handler: HousingSagaHandler::new(),
            next_id: 1,
        }
    }

    /// Reserves a fresh saga id.
    pub fn next_saga_id(&mut self) -> SagaId {
        let id = SagaId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Accepts a new saga after validating it.
    pub fn submit_saga(&mut self, saga: HousingSaga) -> Result<SagaId> {
        let (Some(buyer), Some(seller)) = (saga.buyer_id(), saga.seller_id()) else {
            return Err(KernelError::ValidationError(format!(
                "{} needs both a buyer and a seller",
                saga.id
            )));
        };
        if buyer == seller {
            return Err(KernelError::ValidationError(format!(
                "{} cannot buy from itself",
                buyer
            )));
        }
        if saga.offer_price == Money::ZERO {
            return Err(KernelError::ValidationError(format!(
                "{} has a zero offer price",
                saga.id
            )));
        }
        if saga.down_payment > saga.offer_price {
            return Err(KernelError::ValidationError(format!(
                "{} down payment {} exceeds price {}",
                saga.id, saga.down_payment, saga.offer_price
            )));
        }
        if saga.status != SagaStatus::Initiated {
            return Err(KernelError::ValidationError(format!(
                "{} must start INITIATED, found {}",
                saga.id, saga.status
            )));
        }
        if self.sagas.contains_key(&saga.id) {
            return Err(KernelError::ValidationError(format!(
                "{} is already live",
                saga.id
            )));
        }

        let saga_id = saga.id;
        self.next_id = self.next_id.max(saga_id.0 + 1);
        info!(
            %saga_id,
            %buyer,
            %seller,
            property = %saga.property_id,
            price = %saga.offer_price,
            down_payment = %saga.down_payment,
            "housing saga submitted"
        );
        self.sagas.insert(saga_id, saga);
        Ok(saga_id)
    }

    /// Runs one tick over every live saga.
    ///
    /// Participants are checked first; a saga with an inactive participant is
    /// cancelled. Any non-fatal step error is compensated and the saga
    /// removed. Fatal errors stop processing and are returned.
    pub fn process_sagas(
        &mut self,
        ctx: &mut SagaContext<'_>,
        directory: &dyn ParticipantDirectory,
    ) -> Result<Vec<SagaOutcome>> {
        let ids: Vec<SagaId> = self.sagas.keys().copied().collect();
        let mut finished = Vec::new();

        for saga_id in ids {
            let Some(saga) = self.sagas.get_mut(&saga_id) else {
                continue;
            };
            let inactive = [saga.buyer_id(), saga.seller_id()]
                .into_iter()
                .flatten()
                .find(|agent| !directory.is_active(*agent));

            let result = match inactive {
                Some(agent) => self.handler.compensate(
                    saga,
                    ctx,
                    SagaStatus::Cancelled,
                    &format!("{} is no longer active", agent),
                ),
                None => match self.handler.step(saga, ctx) {
                    Err(e) if !e.is_fatal() => {
                        warn!(%saga_id, status = %saga.status, "saga step failed: {}", e);
                        self.handler
                            .compensate(saga, ctx, SagaStatus::FailedRolledBack, &e.to_string())
                    }
                    other => other,
                },
            };
            if let Err(e) = result {
                error!(%saga_id, status = %saga.status, "saga halted: {}", e);
                return Err(e);
            }
            if saga.status.is_terminal() {
                finished.push(saga_id);
            }
        }

        Ok(self.remove_finished(finished, ctx.tick))
    }

    /// Cancels, with compensation, every live saga involving `agent`.
    pub fn cancel_sagas_for(
        &mut self,
        agent: AgentId,
        ctx: &mut SagaContext<'_>,
    ) -> Result<Vec<SagaOutcome>> {
        let ids: Vec<SagaId> = self
            .sagas
            .values()
            .filter(|saga| saga.involves(agent))
            .map(|saga| saga.id)
            .collect();
        let reason = format!("{} left the economy", agent);
        for saga_id in &ids {
            if let Some(saga) = self.sagas.get_mut(saga_id) {
                self.handler
                    .compensate(saga, ctx, SagaStatus::Cancelled, &reason)?;
            }
        }
        Ok(self.remove_finished(ids, ctx.tick))
    }

    fn remove_finished(&mut self, ids: Vec<SagaId>, tick: Tick) -> Vec<SagaOutcome> {
        ids.into_iter()
            .filter_map(|id| self.sagas.remove(&id))
            .map(|saga| {
                info!(saga_id = %saga.id, status = %saga.status, "saga finished");
                SagaOutcome::of(&saga, tick)
            })
            .collect()
    }

    pub fn get_active_sagas(&self) -> impl Iterator<Item = &HousingSaga> {
        self.sagas.values()
    }

    pub fn get_saga(&self, saga_id: SagaId) -> Option<&HousingSaga> {
        self.sagas.get(&saga_id)
    }

    pub fn len(&self) -> usize {
        self.sagas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sagas.is_empty()
    }

    pub fn snapshot(&self) -> Vec<HousingSaga> {
        self.sagas.values().cloned().collect()
    }

    /// Reloads persisted sagas and returns the ids of the ones it discarded.
    ///
    /// Wallets and the housing registry are rebuilt on start, so property
    /// locks and liens from the previous run no longer exist and their flags
    /// are cleared. A saga whose escrow already settled moved money that was
    /// not persisted; it can neither finish nor be reversed and is dropped
    /// along with terminal records.
    pub fn restore(&mut self, sagas: Vec<HousingSaga>) -> Vec<SagaId> {
        let mut discarded = Vec::new();
        for mut saga in sagas {
            self.next_id = self.next_id.max(saga.id.0 + 1);
            if saga.status.is_terminal() {
                continue;
            }
            if saga.escrow_settled {
                warn!(saga_id = %saga.id, status = %saga.status, "escrow settled before restart, saga discarded");
                discarded.push(saga.id);
                continue;
            }
            saga.property_locked = false;
            saga.lien_attached = false;
            self.sagas.insert(saga.id, saga);
        }
        discarded
    }
}
