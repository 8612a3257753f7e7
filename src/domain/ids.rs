use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation time, counted in whole ticks.
pub type Tick = u64;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Opaque handle for any participant: household, firm, bank or government.
    AgentId,
    "agent"
);
id_type!(LoanId, "loan");
id_type!(DepositId, "deposit");
id_type!(SagaId, "saga");
id_type!(PropertyId, "property");
id_type!(
    /// Handle for a mortgage application held by the loan market.
    ApplicationId,
    "application"
);
id_type!(TransactionId, "tx");
