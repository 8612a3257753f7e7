#![allow(dead_code)]

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use settlement_kernel::application::commands::{Command, ScheduledCommand};
use settlement_kernel::application::simulation::{Simulation, SimulationBuilder};
use settlement_kernel::config::{Endowment, KernelConfig};
use settlement_kernel::domain::ids::{AgentId, PropertyId};
use settlement_kernel::domain::money::Money;
use std::io::{Error, Write};

pub const AUTHORITY: AgentId = AgentId(0);
pub const BANK: AgentId = AgentId(1);
pub const BUYER: AgentId = AgentId(10);
pub const SELLER: AgentId = AgentId(20);
pub const HEIR: AgentId = AgentId(30);
pub const HOUSE: PropertyId = PropertyId(7);

pub const HEADER: [&str; 7] = [
    "tick",
    "command",
    "agent",
    "counterparty",
    "amount",
    "property",
    "down_payment",
];

/// Buyer with 30,000 cash and 20,000 income, seller with 5,000 cash.
pub fn config() -> KernelConfig {
    KernelConfig {
        endowments: vec![
            Endowment {
                agent: BUYER,
                amount: Money(30_000),
                income: Money(20_000),
            },
            Endowment {
                agent: SELLER,
                amount: Money(5_000),
                income: Money::ZERO,
            },
        ],
        ..KernelConfig::default()
    }
}

pub fn simulation(config: KernelConfig) -> Simulation {
    SimulationBuilder::in_memory(config)
        .build()
        .expect("in-memory simulation builds")
}

pub fn balance(sim: &Simulation, agent: AgentId) -> Money {
    sim.settlement().get_balance(agent, sim.config().currency)
}

/// Lists the house for the seller and opens a purchase at `tick`.
pub fn schedule_purchase(sim: &Simulation, tick: u64, buyer: AgentId, price: u64, down: u64) {
    let sender = sim.sender();
    sender
        .send(
            tick,
            Command::ListProperty {
                owner: SELLER,
                property: HOUSE,
            },
        )
        .unwrap();
    sender
        .send(
            tick,
            Command::Purchase {
                buyer,
                seller: SELLER,
                property: HOUSE,
                price: Money(price),
                down_payment: Money(down),
            },
        )
        .unwrap();
}

/// Random transfers, mints, burns and deposit moves between `agents` agents
/// starting at id 10. One pick in eight lands on the authority or the bank.
/// Deterministic for a given seed.
pub fn random_commands(seed: u64, agents: u64, rows: usize) -> Vec<ScheduledCommand> {
    let mut rng = StdRng::seed_from_u64(seed);
    let pick = move |rng: &mut StdRng| match rng.gen_range(0..8) {
        0 => [AUTHORITY, BANK][rng.gen_range(0..2)],
        _ => AgentId(10 + rng.gen_range(0..agents)),
    };
    (0..rows)
        .map(|i| {
            let agent = pick(&mut rng);
            let amount = Money(rng.gen_range(1..5_000));
            let command = match rng.gen_range(0..5) {
                0 => Command::Mint { agent, amount },
                1 => Command::Burn { agent, amount },
                2 => Command::OpenDeposit { agent, amount },
                3 => Command::WithdrawDeposit { agent, amount },
                _ => Command::Transfer {
                    from: agent,
                    to: pick(&mut rng),
                    amount,
                },
            };
            ScheduledCommand {
                tick: 1 + (i as u64) / 4,
                command,
            }
        })
        .collect()
}

/// Writes a scenario file with the standard header.
pub fn write_scenario<W: Write>(sink: W, rows: &[[&str; 7]]) -> Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(sink);
    wtr.write_record(HEADER)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
