//! The ledger gateway. Sole owner of the operator key: every write goes
//! through the serialized nonce path in [`evm::EvmLedger`], and settlements
//! are buffered and flushed in chunks by [`settlement::SettlementBatcher`].
mod abi;
mod cache;
mod evm;
mod nonce;
mod retry;
mod settlement;

pub use evm::EvmLedger;
pub use settlement::SettlementBatcher;
