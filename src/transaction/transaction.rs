//! Interceptor-side transaction handle and committed snapshot record

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::id::GlobalTransactionId;
use crate::version::GmuVersion;

/// One write of a transaction. `value == None` removes the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOp {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// A transaction as seen by the commit manager.
///
/// The read version is the snapshot the transaction reads from and is
/// fixed at begin. The transaction version is re-stamped: tentative at
/// prepare, final at commit.
#[derive(Debug)]
pub struct GmuTransaction {
    gtx: GlobalTransactionId,
    read_version: GmuVersion,
    transaction_version: RwLock<GmuVersion>,
    write_set: Mutex<Vec<WriteOp>>,
}

impl GmuTransaction {
    pub fn new(gtx: GlobalTransactionId, read_version: GmuVersion) -> Self {
        Self {
            gtx,
            transaction_version: RwLock::new(read_version.clone()),
            read_version,
            write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn gtx(&self) -> GlobalTransactionId {
        self.gtx
    }

    pub fn read_version(&self) -> &GmuVersion {
        &self.read_version
    }

    pub fn transaction_version(&self) -> GmuVersion {
        self.transaction_version.read().clone()
    }

    /// Replace, never mutate, the stamped version.
    pub fn set_transaction_version(&self, version: GmuVersion) {
        *self.transaction_version.write() = version;
    }

    pub fn add_write(&self, op: WriteOp) {
        self.write_set.lock().push(op);
    }

    pub fn write_set(&self) -> Vec<WriteOp> {
        self.write_set.lock().clone()
    }

    /// Whether the transaction needs ordering in the commit queue.
    pub fn has_modifications(&self) -> bool {
        !self.write_set.lock().is_empty()
    }
}

/// Immutable record of an applied transaction, folded into the commit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransaction {
    pub gtx: GlobalTransactionId,
    pub version: GmuVersion,
    pub write_set: Vec<WriteOp>,
    pub sub_version: u32,
    pub concurrent_clock_number: u64,
}
