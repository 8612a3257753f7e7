use crate::domain::ids::{AgentId, PropertyId, Tick};
use crate::domain::money::Money;
use crate::error::{KernelError, Result};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// An instruction from outside the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mint {
        agent: AgentId,
        amount: Money,
    },
    Burn {
        agent: AgentId,
        amount: Money,
    },
    Transfer {
        from: AgentId,
        to: AgentId,
        amount: Money,
    },
    SetIncome {
        agent: AgentId,
        income: Money,
    },
    GrantLoan {
        borrower: AgentId,
        amount: Money,
    },
    OpenDeposit {
        agent: AgentId,
        amount: Money,
    },
    WithdrawDeposit {
        agent: AgentId,
        amount: Money,
    },
    ListProperty {
        owner: AgentId,
        property: PropertyId,
    },
    Purchase {
        buyer: AgentId,
        seller: AgentId,
        property: PropertyId,
        price: Money,
        down_payment: Money,
    },
    Retire {
        agent: AgentId,
        heir: AgentId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCommand {
    pub tick: Tick,
    pub command: Command,
}

/// Sending half of the command queue. Cheap to clone and usable from any
/// thread.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<ScheduledCommand>,
}

impl CommandSender {
    /// Queues `command` for execution at `tick`, or at the next tick if
    /// `tick` has already passed.
    pub fn send(&self, tick: Tick, command: Command) -> Result<()> {
        self.tx
            .send(ScheduledCommand { tick, command })
            .map_err(|e| KernelError::InternalError(Box::new(e)))
    }
}

/// Receiving half, drained once at the start of every tick.
#[derive(Debug)]
pub struct CommandQueue {
    rx: mpsc::UnboundedReceiver<ScheduledCommand>,
    deferred: BTreeMap<Tick, Vec<Command>>,
}

impl CommandQueue {
    pub fn channel() -> (CommandQueue, CommandSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            CommandQueue {
                rx,
                deferred: BTreeMap::new(),
            },
            CommandSender { tx },
        )
    }

    /// Everything due at or before `tick`, oldest stamp first, in submission
    /// order within a stamp. Later stamps stay buffered.
    pub fn drain(&mut self, tick: Tick) -> Vec<Command> {
        while let Ok(scheduled) = self.rx.try_recv() {
            self.deferred
                .entry(scheduled.tick)
                .or_default()
                .push(scheduled.command);
        }
        let later = self.deferred.split_off(&(tick + 1));
        let due = std::mem::replace(&mut self.deferred, later);
        due.into_values().flatten().collect()
    }

    /// Commands buffered for future ticks.
    pub fn pending(&self) -> usize {
        self.deferred.values().map(Vec::len).sum()
    }
}
