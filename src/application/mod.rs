//! Application layer: the settlement system, monetary ledger, bank, saga
//! orchestration and the simulation root that ties them together.
//!
//! Everything here is single-threaded and driven tick by tick from
//! [`simulation::Simulation`]. Outside callers reach it through the
//! [`commands::CommandSender`] queue.

pub mod accounts;
pub mod bank;
pub mod commands;
pub mod events;
pub mod ledger;
pub mod saga;
pub mod settlement;
pub mod simulation;
