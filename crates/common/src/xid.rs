//! Global transaction identifier
//!
//! An `Xid` names one branch of a coordinator transaction: a format id, the
//! global transaction id shared by every branch, and a branch qualifier that
//! distinguishes the resources enlisted in it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Largest global transaction id / branch qualifier accepted (X/Open limit).
pub const MAXGTRIDSIZE: usize = 64;
pub const MAXBQUALSIZE: usize = 64;

/// X/Open transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    /// Build an xid from raw parts
    pub fn new(
        format_id: i32,
        global_transaction_id: Vec<u8>,
        branch_qualifier: Vec<u8>,
    ) -> Result<Self, String> {
        if global_transaction_id.is_empty() || global_transaction_id.len() > MAXGTRIDSIZE {
            return Err(format!(
                "Invalid global transaction id length: {}",
                global_transaction_id.len()
            ));
        }
        if branch_qualifier.len() > MAXBQUALSIZE {
            return Err(format!(
                "Invalid branch qualifier length: {}",
                branch_qualifier.len()
            ));
        }

        Ok(Self {
            format_id,
            global_transaction_id,
            branch_qualifier,
        })
    }

    /// Generate a fresh top-level xid using a UUIDv7 as the global part
    pub fn generate(format_id: i32) -> Self {
        Self {
            format_id,
            global_transaction_id: Uuid::now_v7().as_bytes().to_vec(),
            branch_qualifier: Vec::new(),
        }
    }

    /// Derive the xid of branch `n` of this transaction
    pub fn branch(&self, n: u32) -> Self {
        Self {
            format_id: self.format_id,
            global_transaction_id: self.global_transaction_id.clone(),
            branch_qualifier: n.to_be_bytes().to_vec(),
        }
    }

    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }

    /// Whether `other` names a branch of the same global transaction
    pub fn same_global(&self, other: &Xid) -> bool {
        self.format_id == other.format_id
            && self.global_transaction_id == other.global_transaction_id
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        for b in &self.global_transaction_id {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ":")?;
        for b in &self.branch_qualifier {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
