mod common;

use common::{BANK, BUYER, SELLER, balance};
use settlement_kernel::application::bank::loans::LoanEvent;
use settlement_kernel::application::commands::Command;
use settlement_kernel::domain::events::{EventKind, KernelEvent};
use settlement_kernel::domain::ids::{AgentId, LoanId};
use settlement_kernel::domain::loan::LoanStatus;
use settlement_kernel::domain::money::Money;

const DEBTOR: AgentId = AgentId(40);

#[test]
fn test_repayment_from_cash_destroys_money() {
    let mut sim = common::simulation(common::config());
    sim.sender()
        .send(
            1,
            Command::GrantLoan {
                borrower: BUYER,
                amount: Money(12_000),
            },
        )
        .unwrap();

    let reports = sim.run(31).unwrap();
    assert!(reports.iter().all(|r| !r.conservation.violated));

    // 1,000 installment plus 70 interest at 7% for 30 of 360 ticks
    assert_eq!(
        reports[30].loan_events,
        vec![LoanEvent::PaymentCollected {
            loan_id: LoanId(1),
            borrower: BUYER,
            principal: Money(1_000),
            interest: Money(70),
        }]
    );
    assert_eq!(balance(&sim, BUYER), Money(28_930));
    let loan = sim.bank().loans().get_loan(LoanId(1)).unwrap();
    assert_eq!(loan.remaining_balance, Money(11_000));
    // Deposit keeps the principal plus one period of 1% interest
    assert_eq!(sim.bank().deposits().balance_of(BUYER), Money(12_010));
}

#[test]
fn test_repayment_falls_back_to_deposit() {
    let mut sim = common::simulation(common::config());
    let sender = sim.sender();
    sender
        .send(
            1,
            Command::SetIncome {
                agent: DEBTOR,
                income: Money(20_000),
            },
        )
        .unwrap();
    sender
        .send(
            1,
            Command::GrantLoan {
                borrower: DEBTOR,
                amount: Money(12_000),
            },
        )
        .unwrap();

    let reports = sim.run(31).unwrap();
    assert!(reports.iter().all(|r| !r.conservation.violated));
    assert_eq!(balance(&sim, DEBTOR), Money::ZERO);
    assert_eq!(sim.bank().deposits().balance_of(DEBTOR), Money(10_940));
}

#[test]
fn test_default_liquidates_and_freezes_credit() {
    let mut sim = common::simulation(common::config());
    let sender = sim.sender();
    sender
        .send(
            1,
            Command::SetIncome {
                agent: DEBTOR,
                income: Money(20_000),
            },
        )
        .unwrap();
    sender
        .send(
            1,
            Command::GrantLoan {
                borrower: DEBTOR,
                amount: Money(10_000),
            },
        )
        .unwrap();
    sender
        .send(
            2,
            Command::WithdrawDeposit {
                agent: DEBTOR,
                amount: Money(10_000),
            },
        )
        .unwrap();
    sender
        .send(
            2,
            Command::Transfer {
                from: DEBTOR,
                to: SELLER,
                amount: Money(10_000),
            },
        )
        .unwrap();

    let reports = sim.run(91).unwrap();
    assert!(reports.iter().all(|r| !r.conservation.violated));
    assert_eq!(balance(&sim, SELLER), Money(15_000));

    let defaults: Vec<_> = sim
        .events()
        .iter()
        .filter_map(|e| match e {
            KernelEvent::LoanDefault(default) => Some(default.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].tick, 91);
    assert_eq!(defaults[0].agent_id, DEBTOR);
    assert_eq!(defaults[0].creditor_id, BANK);
    assert_eq!(defaults[0].defaulted_amount, Money(10_000));
    assert!(
        sim.events()
            .iter()
            .any(|e| e.kind() == EventKind::Liquidation)
    );

    let loan = sim.bank().loans().get_loan(LoanId(1)).unwrap();
    assert_eq!(loan.status, LoanStatus::Default);
    assert_eq!(loan.remaining_balance, Money::ZERO);

    sender
        .send(
            92,
            Command::GrantLoan {
                borrower: DEBTOR,
                amount: Money(1_000),
            },
        )
        .unwrap();
    let report = sim.tick().unwrap();
    assert_eq!(report.commands_rejected.len(), 1);
    assert!(report.commands_rejected[0].contains("credit frozen"));
}

#[test]
fn test_fractional_reserve_limits_lending() {
    let mut config = common::config();
    config.bank_reserves = Money(500);
    let mut sim = common::simulation(config);
    let sender = sim.sender();
    sender
        .send(
            1,
            Command::GrantLoan {
                borrower: BUYER,
                amount: Money(10_000),
            },
        )
        .unwrap();
    sender
        .send(
            1,
            Command::GrantLoan {
                borrower: BUYER,
                amount: Money(5_000),
            },
        )
        .unwrap();

    let report = sim.tick().unwrap();
    assert_eq!(report.commands_applied, 1);
    assert!(report.commands_rejected[0].contains("Reserve requirement violated"));
    assert_eq!(sim.bank().deposits().balance_of(BUYER), Money(5_000));
    assert_eq!(sim.bank().reserves(sim.settlement()), Money(500));
}

#[test]
fn test_gold_standard_requires_full_backing() {
    let mut config = common::config();
    config.bank_reserves = Money(5_000);
    config.gold_standard = true;
    let mut sim = common::simulation(config);
    let sender = sim.sender();
    for amount in [10_000, 4_000] {
        sender
            .send(
                1,
                Command::GrantLoan {
                    borrower: BUYER,
                    amount: Money(amount),
                },
            )
            .unwrap();
    }

    let report = sim.tick().unwrap();
    assert_eq!(report.commands_applied, 1);
    assert_eq!(report.commands_rejected.len(), 1);
    assert_eq!(sim.bank().deposits().balance_of(BUYER), Money(4_000));
}

#[test]
fn test_deposits_are_neutral_for_money_supply() {
    let mut sim = common::simulation(common::config());
    let sender = sim.sender();
    sender
        .send(
            1,
            Command::OpenDeposit {
                agent: BUYER,
                amount: Money(5_000),
            },
        )
        .unwrap();
    sender
        .send(
            2,
            Command::WithdrawDeposit {
                agent: BUYER,
                amount: Money(2_000),
            },
        )
        .unwrap();

    sim.run(2).unwrap();
    assert_eq!(balance(&sim, BUYER), Money(27_000));
    assert_eq!(sim.bank().deposits().balance_of(BUYER), Money(3_000));
    assert_eq!(sim.measure_m2(), Money(35_000));
    assert_eq!(sim.ledger().expected_m2(), Money(35_000));
    assert_eq!(sim.bank().reserves(sim.settlement()), Money(1_003_000));
}

#[test]
fn test_mint_into_reserves_stays_outside_money_supply() {
    let mut sim = common::simulation(common::config());
    let sender = sim.sender();
    sender
        .send(
            1,
            Command::Mint {
                agent: BANK,
                amount: Money(1_000),
            },
        )
        .unwrap();
    sender
        .send(
            1,
            Command::Burn {
                agent: BUYER,
                amount: Money(500),
            },
        )
        .unwrap();

    let report = sim.tick().unwrap();
    assert_eq!(report.commands_applied, 2);
    assert!(!report.conservation.violated);
    assert_eq!(sim.bank().reserves(sim.settlement()), Money(1_001_000));
    assert_eq!(sim.measure_m2(), Money(34_500));
    assert_eq!(sim.ledger().expected_m2(), Money(34_500));
}

#[test]
fn test_retired_agent_cannot_act() {
    let mut sim = common::simulation(common::config());
    let sender = sim.sender();
    sender
        .send(
            1,
            Command::Retire {
                agent: SELLER,
                heir: BUYER,
            },
        )
        .unwrap();
    sender
        .send(
            2,
            Command::Mint {
                agent: SELLER,
                amount: Money(10),
            },
        )
        .unwrap();

    sim.run(2).unwrap();
    assert_eq!(balance(&sim, BUYER), Money(35_000));
    assert!(!sim.settlement().has_wallet(SELLER));
    assert_eq!(sim.measure_m2(), Money(35_000));
}
