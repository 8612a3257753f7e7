//! Domain types: ids, money, wallets, loans, sagas, events and the ports the
//! kernel talks to its collaborators through.

pub mod events;
pub mod ids;
pub mod loan;
pub mod money;
pub mod ports;
pub mod saga;
pub mod transaction;
pub mod wallet;
