//! Raw storage rows and the validated domain records assembled from them.

use crate::address::ChecksummedAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Transaction row as stored. Address columns hold whatever the indexer wrote.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTransactionRow {
    pub hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    pub block_timestamp: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Decimal wei.
    pub value: String,
    pub nonce: u64,
    pub gas_limit: u64,
    #[serde(default)]
    pub input: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawReceiptRow {
    pub tx_hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    pub from: Option<String>,
    pub to: Option<String>,
    pub contract_address: Option<String>,
    /// Absent for pre-Byzantium receipts.
    pub status: Option<bool>,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    #[serde(default)]
    pub logs: Vec<RawLogRow>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLogRow {
    pub tx_hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
    pub address: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub from: ChecksummedAddress,
    /// None for contract creation.
    pub to: Option<ChecksummedAddress>,
    pub value: String,
    pub nonce: u64,
    pub gas_limit: u64,
    pub input: String,
}

impl Transaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    pub from: ChecksummedAddress,
    pub to: Option<ChecksummedAddress>,
    pub contract_address: Option<ChecksummedAddress>,
    pub status: Option<bool>,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub logs: Vec<LogEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub tx_hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
    pub address: ChecksummedAddress,
    pub topics: Vec<String>,
    pub data: String,
}

/// Identifies a stored row in failure reports.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RowId {
    pub tx_hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u32>,
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} tx {}", self.block_number, self.tx_index)?;
        if let Some(log_index) = self.log_index {
            write!(f, " log {log_index}")?;
        }
        write!(f, " ({})", self.tx_hash)
    }
}

impl RawTransactionRow {
    pub fn row_id(&self) -> RowId {
        RowId {
            tx_hash: self.hash.clone(),
            block_number: self.block_number,
            tx_index: self.tx_index,
            log_index: None,
        }
    }
}

impl RawReceiptRow {
    pub fn row_id(&self) -> RowId {
        RowId {
            tx_hash: self.tx_hash.clone(),
            block_number: self.block_number,
            tx_index: self.tx_index,
            log_index: None,
        }
    }
}

impl RawLogRow {
    pub fn row_id(&self) -> RowId {
        RowId {
            tx_hash: self.tx_hash.clone(),
            block_number: self.block_number,
            tx_index: self.tx_index,
            log_index: Some(self.log_index),
        }
    }
}
