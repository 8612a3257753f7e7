use crate::application::commands::{Command, ScheduledCommand};
use crate::domain::ids::{AgentId, PropertyId, Tick};
use crate::domain::money::Money;
use crate::error::{KernelError, Result};
use serde::Deserialize;
use std::io::Read;

/// One scenario line as it appears in the file. Columns a command does not
/// use may be left empty.
#[derive(Debug, Deserialize)]
struct ScenarioRow {
    tick: Tick,
    command: String,
    agent: AgentId,
    #[serde(default)]
    counterparty: Option<AgentId>,
    #[serde(default)]
    amount: Option<Money>,
    #[serde(default)]
    property: Option<PropertyId>,
    #[serde(default)]
    down_payment: Option<Money>,
}

impl ScenarioRow {
    fn into_scheduled(self) -> Result<ScheduledCommand> {
        let command = match self.command.to_ascii_lowercase().as_str() {
            "mint" => Command::Mint {
                agent: self.agent,
                amount: self.amount()?,
            },
            "burn" => Command::Burn {
                agent: self.agent,
                amount: self.amount()?,
            },
            "transfer" => Command::Transfer {
                from: self.agent,
                to: self.counterparty()?,
                amount: self.amount()?,
            },
            "income" => Command::SetIncome {
                agent: self.agent,
                income: self.amount()?,
            },
            "loan" => Command::GrantLoan {
                borrower: self.agent,
                amount: self.amount()?,
            },
            "deposit" => Command::OpenDeposit {
                agent: self.agent,
                amount: self.amount()?,
            },
            "withdraw" => Command::WithdrawDeposit {
                agent: self.agent,
                amount: self.amount()?,
            },
            "list" => Command::ListProperty {
                owner: self.agent,
                property: self.property()?,
            },
            "purchase" => Command::Purchase {
                buyer: self.agent,
                seller: self.counterparty()?,
                property: self.property()?,
                price: self.amount()?,
                down_payment: self.down_payment.unwrap_or_default(),
            },
            "retire" => Command::Retire {
                agent: self.agent,
                heir: self.counterparty()?,
            },
            other => {
                return Err(KernelError::ValidationError(format!(
                    "Unknown command '{}' at tick {}",
                    other, self.tick
                )));
            }
        };
        Ok(ScheduledCommand {
            tick: self.tick,
            command,
        })
    }

    fn amount(&self) -> Result<Money> {
        self.amount.ok_or_else(|| self.missing("amount"))
    }

    fn counterparty(&self) -> Result<AgentId> {
        self.counterparty.ok_or_else(|| self.missing("counterparty"))
    }

    fn property(&self) -> Result<PropertyId> {
        self.property.ok_or_else(|| self.missing("property"))
    }

    fn missing(&self, column: &str) -> KernelError {
        KernelError::ValidationError(format!(
            "'{}' at tick {} requires a {} column",
            self.command, self.tick, column
        ))
    }
}

/// Reads scheduled commands from a CSV scenario.
///
/// Header: `tick,command,agent,counterparty,amount,property,down_payment`.
/// Whitespace is trimmed and short records are accepted.
pub struct ScenarioReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScenarioReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts each line. A bad line yields an error and
    /// reading continues with the next one.
    pub fn commands(self) -> impl Iterator<Item = Result<ScheduledCommand>> {
        self.reader
            .into_deserialize::<ScenarioRow>()
            .map(|row| row.map_err(KernelError::from)?.into_scheduled())
    }
}
