//! Transaction types
//!
//! This module provides:
//! - `GlobalTransactionId` - cluster-unique identity
//! - `GmuTransaction` - snapshot, stamped version and write set
//! - `CommittedTransaction` - immutable record of an applied transaction
//! - `LiveTransactions` - live local transactions and their pinned versions

mod id;
mod live;
#[allow(clippy::module_inception)]
mod transaction;

pub use id::{GlobalTransactionId, TransactionIdFactory};
pub use live::LiveTransactions;
pub use transaction::{CommittedTransaction, GmuTransaction, WriteOp};
