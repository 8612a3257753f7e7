mod common;

use common::{BANK, BUYER, HEIR, HOUSE, SELLER, balance};
use settlement_kernel::application::commands::Command;
use settlement_kernel::config::Endowment;
use settlement_kernel::domain::events::{EventKind, KernelEvent};
use settlement_kernel::domain::ids::AgentId;
use settlement_kernel::domain::loan::LoanStatus;
use settlement_kernel::domain::money::Money;
use settlement_kernel::domain::saga::SagaStatus;

#[test]
fn test_purchase_completes_and_conserves_money() {
    let mut sim = common::simulation(common::config());
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 20_000);

    let reports = sim.run(5).unwrap();
    assert!(reports.iter().all(|r| !r.conservation.violated));
    assert_eq!(reports[4].saga_outcomes.len(), 1);
    assert_eq!(reports[4].saga_outcomes[0].status, SagaStatus::Completed);

    assert_eq!(balance(&sim, BUYER), Money(10_000));
    assert_eq!(balance(&sim, SELLER), Money(105_000));
    assert_eq!(balance(&sim, BANK), Money(920_000));
    assert_eq!(sim.housing().owner_of(HOUSE), Some(BUYER));
    assert_eq!(sim.housing().lock_holder(HOUSE), None);

    let mortgages = sim.bank().loans().loans_of(BUYER);
    assert_eq!(mortgages.len(), 1);
    assert_eq!(mortgages[0].principal, Money(80_000));
    assert_eq!(mortgages[0].status, LoanStatus::Active);
    assert_eq!(mortgages[0].deposit_id, None);

    // M2 grew by exactly the mortgage disbursal
    assert_eq!(sim.measure_m2(), Money(115_000));
    assert_eq!(sim.ledger().expected_m2(), Money(115_000));
}

#[test]
fn test_escrow_failure_rolls_back() {
    let mut config = common::config();
    config.endowments[0].amount = Money(10_000);
    let mut sim = common::simulation(config);
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 20_000);

    let reports = sim.run(5).unwrap();
    let outcome = reports
        .iter()
        .flat_map(|r| r.saga_outcomes.iter())
        .next()
        .expect("saga finished");
    assert_eq!(outcome.status, SagaStatus::FailedRolledBack);
    assert_eq!(outcome.tick, 4);
    assert!(outcome.error.as_deref().unwrap().contains("ESCROW_LOCKED"));

    assert_eq!(balance(&sim, BUYER), Money(10_000));
    assert_eq!(balance(&sim, SELLER), Money(5_000));
    assert_eq!(balance(&sim, BANK), Money(1_000_000));
    assert_eq!(sim.housing().owner_of(HOUSE), Some(SELLER));
    assert_eq!(sim.housing().lock_holder(HOUSE), None);
    assert!(sim.bank().loans().loans_of(BUYER).is_empty());
    let archived = sim.bank().loans().archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].status, LoanStatus::Terminated);
    assert!(reports.iter().all(|r| !r.conservation.violated));
}

#[test]
fn test_credit_rejection_releases_the_property() {
    let mut config = common::config();
    config.endowments[0].income = Money(1_000);
    let mut sim = common::simulation(config);
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 20_000);

    sim.tick().unwrap();
    assert_eq!(sim.housing().lock_holder(HOUSE).map(|s| s.0), Some(1));

    let report = sim.tick().unwrap();
    assert_eq!(report.saga_outcomes.len(), 1);
    let outcome = &report.saga_outcomes[0];
    assert_eq!(outcome.status, SagaStatus::FailedRolledBack);
    assert!(outcome.error.as_deref().unwrap().contains("exceeds capacity"));
    assert_eq!(sim.housing().lock_holder(HOUSE), None);
    assert!(sim.bank().loans().loans_of(BUYER).is_empty());
}

#[test]
fn test_second_buyer_loses_lock_contention() {
    let rival = AgentId(11);
    let mut config = common::config();
    config.endowments.push(Endowment {
        agent: rival,
        amount: Money(30_000),
        income: Money(20_000),
    });
    let mut sim = common::simulation(config);
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 20_000);
    sim.sender()
        .send(
            1,
            Command::Purchase {
                buyer: rival,
                seller: SELLER,
                property: HOUSE,
                price: Money(110_000),
                down_payment: Money(20_000),
            },
        )
        .unwrap();

    let first = sim.tick().unwrap();
    assert_eq!(first.saga_outcomes.len(), 1);
    assert_eq!(first.saga_outcomes[0].buyer, Some(rival));
    assert_eq!(first.saga_outcomes[0].status, SagaStatus::FailedRolledBack);

    sim.run(4).unwrap();
    assert_eq!(sim.housing().owner_of(HOUSE), Some(BUYER));
    assert_eq!(balance(&sim, rival), Money(30_000));
}

#[test]
fn test_cash_purchase_skips_the_loan() {
    let mut config = common::config();
    config.endowments[0].amount = Money(120_000);
    let mut sim = common::simulation(config);
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 100_000);

    let reports = sim.run(5).unwrap();
    assert_eq!(reports[4].saga_outcomes[0].status, SagaStatus::Completed);
    assert_eq!(balance(&sim, BUYER), Money(20_000));
    assert_eq!(balance(&sim, SELLER), Money(105_000));
    assert!(sim.bank().loans().loans_of(BUYER).is_empty());
    assert_eq!(sim.ledger().total_expansions(), Money::ZERO);
}

#[test]
fn test_retiring_buyer_cancels_settled_escrow() {
    let mut sim = common::simulation(common::config());
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 20_000);
    sim.run(4).unwrap();
    assert_eq!(balance(&sim, SELLER), Money(105_000));

    sim.sender()
        .send(
            5,
            Command::Retire {
                agent: BUYER,
                heir: HEIR,
            },
        )
        .unwrap();
    let report = sim.tick().unwrap();

    assert_eq!(report.commands_applied, 1);
    assert!(sim.orchestrator().is_empty());
    assert!(!report.conservation.violated);
    assert_eq!(balance(&sim, HEIR), Money(30_000));
    assert_eq!(balance(&sim, SELLER), Money(5_000));
    assert_eq!(balance(&sim, BANK), Money(1_000_000));
    assert_eq!(sim.housing().owner_of(HOUSE), Some(SELLER));

    let cancelled = sim.events().iter().any(|e| {
        matches!(
            e,
            KernelEvent::SagaFinished {
                status: SagaStatus::Cancelled,
                ..
            }
        )
    });
    assert!(cancelled);
}

#[test]
fn test_purchase_of_unowned_property_is_rejected() {
    let mut sim = common::simulation(common::config());
    sim.sender()
        .send(
            1,
            Command::Purchase {
                buyer: BUYER,
                seller: SELLER,
                property: HOUSE,
                price: Money(100_000),
                down_payment: Money(20_000),
            },
        )
        .unwrap();

    let report = sim.tick().unwrap();
    assert_eq!(report.commands_rejected.len(), 1);
    assert!(sim.orchestrator().is_empty());
    assert!(
        sim.events()
            .iter()
            .all(|e| e.kind() != EventKind::SagaFinished)
    );
}

#[test]
fn test_down_payment_above_price_is_rejected() {
    let mut sim = common::simulation(common::config());
    common::schedule_purchase(&sim, 1, BUYER, 100_000, 150_000);

    let report = sim.tick().unwrap();
    assert_eq!(report.commands_applied, 1);
    assert_eq!(report.commands_rejected.len(), 1);
    assert!(sim.orchestrator().is_empty());
}
