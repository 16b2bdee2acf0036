mod agent_helpers;
mod mock_ledger;

pub use agent_helpers::TestAgent;
pub use mock_ledger::MockLedger;

pub mod prelude {
    pub use crate::{MockLedger, TestAgent};
}
