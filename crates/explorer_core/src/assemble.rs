//! Row → record assembly. Address fields are checked in declared order and the
//! first failure is returned, tagged with the field it came from.

use crate::address::{normalize, ChecksummedAddress, InvalidAddress};
use crate::records::{
    LogEntry, RawLogRow, RawReceiptRow, RawTransactionRow, Receipt, RowId, Transaction,
};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;

/// Address-bearing field of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressField {
    From,
    To,
    ContractAddress,
    /// `address` of a standalone log row.
    Address,
    /// `address` of the n-th log inside a receipt.
    LogAddress(usize),
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressField::From => f.write_str("from"),
            AddressField::To => f.write_str("to"),
            AddressField::ContractAddress => f.write_str("contractAddress"),
            AddressField::Address => f.write_str("address"),
            AddressField::LogAddress(i) => write!(f, "logs[{i}].address"),
        }
    }
}

impl Serialize for AddressField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("missing required address field `{0}`")]
    MissingRequiredAddress(AddressField),
    #[error("field `{field}`: {cause}")]
    InvalidAddressField {
        field: AddressField,
        raw: String,
        #[source]
        cause: InvalidAddress,
    },
    #[error("block timestamp {value} out of range")]
    InvalidTimestamp { value: i64 },
}

impl AssembleError {
    /// Stable tag for API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AssembleError::MissingRequiredAddress(_) => "missing_required_address",
            AssembleError::InvalidAddressField { .. } => "invalid_address_field",
            AssembleError::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }

    pub fn field(&self) -> Option<AddressField> {
        match self {
            AssembleError::MissingRequiredAddress(field)
            | AssembleError::InvalidAddressField { field, .. } => Some(*field),
            AssembleError::InvalidTimestamp { .. } => None,
        }
    }
}

/// A raw storage row that can be turned into a domain record.
pub trait Assemble {
    type Record;

    fn row_id(&self) -> RowId;

    fn assemble(self) -> Result<Self::Record, AssembleError>;
}

impl Assemble for RawTransactionRow {
    type Record = Transaction;

    fn row_id(&self) -> RowId {
        RawTransactionRow::row_id(self)
    }

    fn assemble(self) -> Result<Transaction, AssembleError> {
        assemble_transaction(self)
    }
}

impl Assemble for RawReceiptRow {
    type Record = Receipt;

    fn row_id(&self) -> RowId {
        RawReceiptRow::row_id(self)
    }

    fn assemble(self) -> Result<Receipt, AssembleError> {
        assemble_receipt(self)
    }
}

impl Assemble for RawLogRow {
    type Record = LogEntry;

    fn row_id(&self) -> RowId {
        RawLogRow::row_id(self)
    }

    fn assemble(self) -> Result<LogEntry, AssembleError> {
        assemble_log(self, AddressField::Address)
    }
}

/// Field order: `from`, `to`.
pub fn assemble_transaction(row: RawTransactionRow) -> Result<Transaction, AssembleError> {
    let from = required(AddressField::From, row.from)?;
    let to = optional(AddressField::To, row.to)?;
    let timestamp = block_time(row.block_timestamp)?;
    Ok(Transaction {
        hash: row.hash,
        block_number: row.block_number,
        tx_index: row.tx_index,
        timestamp,
        from,
        to,
        value: row.value,
        nonce: row.nonce,
        gas_limit: row.gas_limit,
        input: row.input,
    })
}

/// Field order: `from`, `to`, `contractAddress`, then each log's `address`.
pub fn assemble_receipt(row: RawReceiptRow) -> Result<Receipt, AssembleError> {
    let from = required(AddressField::From, row.from)?;
    let to = optional(AddressField::To, row.to)?;
    let contract_address = optional(AddressField::ContractAddress, row.contract_address)?;
    let logs = row
        .logs
        .into_iter()
        .enumerate()
        .map(|(i, log)| assemble_log(log, AddressField::LogAddress(i)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Receipt {
        tx_hash: row.tx_hash,
        block_number: row.block_number,
        tx_index: row.tx_index,
        from,
        to,
        contract_address,
        status: row.status,
        gas_used: row.gas_used,
        cumulative_gas_used: row.cumulative_gas_used,
        logs,
    })
}

fn assemble_log(row: RawLogRow, field: AddressField) -> Result<LogEntry, AssembleError> {
    let address = required(field, row.address)?;
    Ok(LogEntry {
        tx_hash: row.tx_hash,
        block_number: row.block_number,
        tx_index: row.tx_index,
        log_index: row.log_index,
        address,
        topics: row.topics,
        data: row.data,
    })
}

fn required(
    field: AddressField,
    raw: Option<String>,
) -> Result<ChecksummedAddress, AssembleError> {
    let raw = raw.ok_or(AssembleError::MissingRequiredAddress(field))?;
    checked(field, raw)
}

/// NULL means absent. An empty string is present, and invalid.
fn optional(
    field: AddressField,
    raw: Option<String>,
) -> Result<Option<ChecksummedAddress>, AssembleError> {
    raw.map(|raw| checked(field, raw)).transpose()
}

fn checked(field: AddressField, raw: String) -> Result<ChecksummedAddress, AssembleError> {
    match normalize(&raw) {
        Ok(addr) => Ok(addr),
        Err(cause) => Err(AssembleError::InvalidAddressField { field, raw, cause }),
    }
}

fn block_time(ts: Option<i64>) -> Result<Option<OffsetDateTime>, AssembleError> {
    ts.map(|value| {
        OffsetDateTime::from_unix_timestamp(value)
            .map_err(|_| AssembleError::InvalidTimestamp { value })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::InvalidAddressReason;

    const ALICE: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const BOB: &str = "0xFB6916095CA1DF60BB79CE92CE3EA74C37C5D359";
    const TOKEN: &str = "0xdbf03b407c01e7cd3cbea99509d93f8dddc8c6fb";

    fn tx_row(from: Option<&str>, to: Option<&str>) -> RawTransactionRow {
        RawTransactionRow {
            hash: "0xabc".into(),
            block_number: 100,
            tx_index: 1,
            block_timestamp: Some(1_700_000_000),
            from: from.map(String::from),
            to: to.map(String::from),
            value: "1000".into(),
            nonce: 3,
            gas_limit: 21_000,
            input: "0x".into(),
        }
    }

    fn receipt_row() -> RawReceiptRow {
        RawReceiptRow {
            tx_hash: "0xabc".into(),
            block_number: 100,
            tx_index: 1,
            from: Some(ALICE.into()),
            to: Some(TOKEN.into()),
            contract_address: None,
            status: Some(true),
            gas_used: 50_000,
            cumulative_gas_used: 80_000,
            logs: vec![
                RawLogRow {
                    tx_hash: "0xabc".into(),
                    block_number: 100,
                    tx_index: 1,
                    log_index: 0,
                    address: Some(TOKEN.into()),
                    topics: vec!["0xddf2".into()],
                    data: "0x".into(),
                },
                RawLogRow {
                    tx_hash: "0xabc".into(),
                    block_number: 100,
                    tx_index: 1,
                    log_index: 1,
                    address: Some(TOKEN.into()),
                    topics: vec![],
                    data: "0x".into(),
                },
            ],
        }
    }

    #[test]
    fn transaction_checksums_addresses() {
        let tx = assemble_transaction(tx_row(Some(ALICE), Some(BOB))).unwrap();
        assert_eq!(tx.from.to_string(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(
            tx.to.unwrap().to_string(),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
        assert_eq!(tx.timestamp.unwrap().unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn contract_creation_has_no_to() {
        let tx = assemble_transaction(tx_row(Some(ALICE), None)).unwrap();
        assert!(tx.to.is_none());
        assert!(tx.is_contract_creation());
    }

    #[test]
    fn malformed_from_reported_before_to() {
        let err = assemble_transaction(tx_row(Some("0x123"), Some("nope"))).unwrap_err();
        match err {
            AssembleError::InvalidAddressField { field, raw, cause } => {
                assert_eq!(field, AddressField::From);
                assert_eq!(raw, "0x123");
                assert_eq!(cause.reason, InvalidAddressReason::InvalidLength { digits: 3 });
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_from_is_distinct_from_malformed() {
        let err = assemble_transaction(tx_row(None, Some(BOB))).unwrap_err();
        assert_eq!(err, AssembleError::MissingRequiredAddress(AddressField::From));
        assert_eq!(err.kind(), "missing_required_address");
    }

    #[test]
    fn empty_to_is_not_absent() {
        let err = assemble_transaction(tx_row(Some(ALICE), Some(""))).unwrap_err();
        assert_eq!(err.field(), Some(AddressField::To));
        assert_eq!(err.kind(), "invalid_address_field");
    }

    #[test]
    fn timestamp_out_of_range() {
        let mut row = tx_row(Some(ALICE), None);
        row.block_timestamp = Some(i64::MAX);
        let err = assemble_transaction(row).unwrap_err();
        assert_eq!(err, AssembleError::InvalidTimestamp { value: i64::MAX });
        assert_eq!(err.field(), None);
    }

    #[test]
    fn receipt_with_logs() {
        let receipt = assemble_receipt(receipt_row()).unwrap();
        assert_eq!(receipt.logs.len(), 2);
        assert_eq!(
            receipt.logs[0].address.to_string(),
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB"
        );
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn receipt_contract_address_checked_after_to() {
        let mut row = receipt_row();
        row.to = None;
        row.contract_address = Some("0xzz".into());
        let err = assemble_receipt(row).unwrap_err();
        assert_eq!(err.field(), Some(AddressField::ContractAddress));
    }

    #[test]
    fn receipt_log_failure_names_position() {
        let mut row = receipt_row();
        row.logs[1].address = Some("0x00".into());
        let err = assemble_receipt(row).unwrap_err();
        assert_eq!(err.field(), Some(AddressField::LogAddress(1)));
        assert_eq!(err.to_string().split(':').next(), Some("field `logs[1].address`"));
    }

    #[test]
    fn standalone_log_missing_address() {
        let mut log = receipt_row().logs.remove(0);
        log.address = None;
        let err = log.assemble().unwrap_err();
        assert_eq!(err, AssembleError::MissingRequiredAddress(AddressField::Address));
    }

    #[test]
    fn field_serializes_as_name() {
        let json = serde_json::to_string(&AddressField::LogAddress(3)).unwrap();
        assert_eq!(json, "\"logs[3].address\"");
    }
}
