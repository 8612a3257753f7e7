use clap::Parser;
use miette::{IntoDiagnostic, Result};
use settlement_kernel::application::simulation::SimulationBuilder;
use settlement_kernel::config::KernelConfig;
use settlement_kernel::domain::ports::{LoanBookStoreBox, SagaStoreBox};
use settlement_kernel::infrastructure::in_memory::{InMemoryLoanBookStore, InMemorySagaStore};
use settlement_kernel::interfaces::csv::balance_writer::BalanceWriter;
use settlement_kernel::interfaces::csv::scenario_reader::ScenarioReader;
use settlement_kernel::telemetry;
use std::fs::File;
use std::io;
use std::path::PathBuf;

/// Ticks run after the last scheduled command so in-flight sagas can finish.
const SETTLE_TICKS: u64 = 5;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario CSV file
    input: PathBuf,

    /// Kernel configuration as JSON. Defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run. Defaults to the last scheduled tick plus a
    /// settling margin.
    #[arg(long)]
    ticks: Option<u64>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn in_memory_stores() -> (SagaStoreBox, LoanBookStoreBox, bool) {
    (
        Box::new(InMemorySagaStore::new()),
        Box::new(InMemoryLoanBookStore::new()),
        false,
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<(SagaStoreBox, LoanBookStoreBox, bool)> {
    use settlement_kernel::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            Ok((Box::new(store.clone()), Box::new(store), true))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<(SagaStoreBox, LoanBookStoreBox, bool)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => KernelConfig::from_json_file(path).into_diagnostic()?,
        None => KernelConfig::default(),
    };
    let settle_ticks = config.decision_delay + SETTLE_TICKS;

    let (saga_store, loan_store, persistent) = open_stores(cli.db_path)?;
    let mut simulation = SimulationBuilder::in_memory(config)
        .saga_store(saga_store)
        .loan_book_store(loan_store)
        .build()
        .into_diagnostic()?;
    if persistent {
        simulation.restore().await.into_diagnostic()?;
    }

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = ScenarioReader::new(file);
    let sender = simulation.sender();
    let mut last_tick = 0;
    for scheduled in reader.commands() {
        match scheduled {
            Ok(scheduled) => {
                last_tick = last_tick.max(scheduled.tick);
                sender
                    .send(scheduled.tick, scheduled.command)
                    .into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let ticks = cli.ticks.unwrap_or(last_tick + settle_ticks);
    for _ in 0..ticks {
        let report = simulation.tick().into_diagnostic()?;
        for rejected in &report.commands_rejected {
            eprintln!("Error processing command at tick {}: {}", report.tick, rejected);
        }
        if report.conservation.violated {
            eprintln!(
                "Conservation violated at tick {}: expected {}, measured {}",
                report.tick, report.conservation.expected, report.conservation.actual
            );
        }
    }

    simulation.checkpoint().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer
        .write_balances(simulation.settlement().balances())
        .into_diagnostic()?;

    Ok(())
}
