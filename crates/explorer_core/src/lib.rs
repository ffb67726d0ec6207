//! explorer_core — address validation and record assembly for a blockchain explorer.
//!
//! Turns raw transaction, receipt and log rows from the chain-state database into
//! records whose address fields are EIP-55 checksummed. Malformed addresses become
//! typed errors tagged with the field they came from; list views can keep going
//! past a bad row while detail views fail with a diagnosable error.

pub mod address;
pub mod api;
pub mod assemble;
pub mod config;
pub mod pipeline;
pub mod records;
pub mod storage;

pub use address::{normalize, ChecksummedAddress, InvalidAddress, InvalidAddressReason};
pub use api::{row_filter, ErrorBody, Explorer};
pub use assemble::{AddressField, Assemble, AssembleError};
pub use config::ExplorerConfig;
pub use pipeline::{
    assemble_batch, fetch_batch, BatchOutcome, BatchStatus, ErrorClass, FailureDetail, FaultMode,
    PipelineError, RowFailure,
};
pub use records::{
    LogEntry, RawLogRow, RawReceiptRow, RawTransactionRow, Receipt, RowId, Transaction,
};
pub use storage::{Page, RowDump, RowFilter, RowSource, SqliteStore, StorageError};
