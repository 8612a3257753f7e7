use crate::domain::ids::AgentId;
use crate::domain::money::{Currency, Money};
use crate::error::{KernelError, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct BalanceRow {
    agent: u64,
    currency: Currency,
    balance: Money,
}

/// Writes final wallet balances as `agent,currency,balance`.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_balances(
        &mut self,
        balances: impl IntoIterator<Item = (AgentId, Currency, Money)>,
    ) -> Result<()> {
        for (agent, currency, balance) in balances {
            self.writer.serialize(BalanceRow {
                agent: agent.0,
                currency,
                balance,
            })?;
        }
        self.writer.flush().map_err(KernelError::from)
    }
}
