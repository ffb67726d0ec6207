//! Batch fetch-and-assemble with strict or tolerant failure handling.
//!
//! Per batch: `Querying -> Assembling -> Complete | Aborted` in strict mode,
//! `Querying -> Assembling -> Complete | Partial` in tolerant mode. Nothing is retried.

use crate::address::InvalidAddress;
use crate::assemble::{AddressField, Assemble, AssembleError};
use crate::records::RowId;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize, Serializer};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How a batch treats a row that fails assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultMode {
    /// First failing row aborts the batch. For single-record detail views.
    #[default]
    Strict,
    /// Failing rows are reported alongside the rows that assembled. For list views.
    Tolerant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Complete,
    Partial,
}

/// A row that failed assembly, with the row it came from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row {row}: {error}")]
pub struct RowFailure {
    pub row: RowId,
    #[source]
    pub error: AssembleError,
}

/// Serializable view of a [`RowFailure`] for API payloads.
#[derive(Clone, Debug, Serialize)]
pub struct FailureDetail {
    pub row: RowId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<AddressField>,
    pub kind: &'static str,
    pub message: String,
}

impl RowFailure {
    pub fn detail(&self) -> FailureDetail {
        FailureDetail {
            row: self.row.clone(),
            field: self.error.field(),
            kind: self.error.kind(),
            message: self.error.to_string(),
        }
    }
}

impl Serialize for RowFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.detail().serialize(serializer)
    }
}

/// Assembled records in storage order, plus per-row failures in tolerant mode.
#[derive(Clone, Debug, Serialize)]
pub struct BatchOutcome<T> {
    pub status: BatchStatus,
    pub records: Vec<T>,
    pub failures: Vec<RowFailure>,
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Complete
    }
}

/// Coarse classification the API layer maps to an HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    BadUpstreamData,
    UpstreamUnavailable,
}

impl ErrorClass {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorClass::BadRequest => 400,
            ErrorClass::NotFound => 404,
            ErrorClass::BadUpstreamData => 422,
            ErrorClass::UpstreamUnavailable => 502,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] StorageError),
    #[error(transparent)]
    RowFailed(Box<RowFailure>),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] InvalidAddress),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::UpstreamFetch(_) => ErrorClass::UpstreamUnavailable,
            PipelineError::RowFailed(_) => ErrorClass::BadUpstreamData,
            PipelineError::NotFound(_) => ErrorClass::NotFound,
            PipelineError::InvalidFilter(_) => ErrorClass::BadRequest,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.class().status_code()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UpstreamFetch(_) => "upstream_fetch_error",
            PipelineError::RowFailed(failure) => failure.error.kind(),
            PipelineError::NotFound(_) => "not_found",
            PipelineError::InvalidFilter(_) => "invalid_filter",
        }
    }

    /// The failing row, for strict-mode aborts.
    pub fn row_failure(&self) -> Option<&RowFailure> {
        match self {
            PipelineError::RowFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Await one storage query and assemble every returned row under `mode`.
pub async fn fetch_batch<R, Q>(
    query: Q,
    mode: FaultMode,
) -> Result<BatchOutcome<R::Record>, PipelineError>
where
    R: Assemble,
    Q: Future<Output = Result<Vec<R>, StorageError>>,
{
    debug!(?mode, state = "querying", "batch");
    let rows = query.await.map_err(|e| {
        warn!(error = %e, "upstream fetch failed");
        PipelineError::UpstreamFetch(e)
    })?;
    assemble_batch(rows, mode)
}

/// Assemble already-fetched rows, preserving their order.
pub fn assemble_batch<R: Assemble>(
    rows: Vec<R>,
    mode: FaultMode,
) -> Result<BatchOutcome<R::Record>, PipelineError> {
    debug!(rows = rows.len(), ?mode, state = "assembling", "batch");
    let mut records = Vec::with_capacity(rows.len());
    let mut failures = Vec::new();
    for row in rows {
        let id = row.row_id();
        match row.assemble() {
            Ok(record) => records.push(record),
            Err(error) => {
                let failure = RowFailure { row: id, error };
                if mode == FaultMode::Strict {
                    warn!(row = %failure.row, error = %failure.error, state = "aborted", "batch");
                    return Err(PipelineError::RowFailed(Box::new(failure)));
                }
                warn!(row = %failure.row, error = %failure.error, "row failed assembly");
                failures.push(failure);
            }
        }
    }
    let status = if failures.is_empty() {
        BatchStatus::Complete
    } else {
        BatchStatus::Partial
    };
    info!(
        assembled = records.len(),
        failed = failures.len(),
        ?status,
        "batch assembled"
    );
    Ok(BatchOutcome {
        status,
        records,
        failures,
    })
}

/// Await a single-row lookup and assemble it. A missing row is `NotFound(key)`.
pub async fn fetch_one<R, Q>(query: Q, key: &str) -> Result<R::Record, PipelineError>
where
    R: Assemble,
    Q: Future<Output = Result<Option<R>, StorageError>>,
{
    let row = query.await?.ok_or_else(|| PipelineError::NotFound(key.to_string()))?;
    let id = row.row_id();
    row.assemble().map_err(|error| {
        warn!(row = %id, error = %error, "record failed assembly");
        PipelineError::RowFailed(Box::new(RowFailure { row: id, error }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RawTransactionRow;
    use std::future::ready;

    const ALICE: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const BOB: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";

    fn rows(bad_index: Option<usize>) -> Vec<RawTransactionRow> {
        (0..5)
            .map(|i| RawTransactionRow {
                hash: format!("0x{:02x}", i + 1),
                block_number: 100 + i as u64,
                tx_index: 0,
                block_timestamp: None,
                from: Some(ALICE.into()),
                to: Some(if Some(i) == bad_index { "0x123" } else { BOB }.into()),
                value: "0".into(),
                nonce: i as u64,
                gas_limit: 21_000,
                input: String::new(),
            })
            .collect()
    }

    #[test]
    fn tolerant_isolates_the_bad_row() {
        // Row 3 of 5 (index 2) is malformed.
        let out = assemble_batch(rows(Some(2)), FaultMode::Tolerant).unwrap();
        assert_eq!(out.status, BatchStatus::Partial);
        assert_eq!(out.records.len(), 4);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].row.tx_hash, "0x03");
        assert_eq!(out.failures[0].error.field(), Some(AddressField::To));
        let hashes: Vec<_> = out.records.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, ["0x01", "0x02", "0x04", "0x05"]);
    }

    #[test]
    fn strict_aborts_on_the_bad_row() {
        let err = assemble_batch(rows(Some(2)), FaultMode::Strict).unwrap_err();
        let failure = err.row_failure().unwrap();
        assert_eq!(failure.row.tx_hash, "0x03");
        assert_eq!(err.class(), ErrorClass::BadUpstreamData);
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.kind(), "invalid_address_field");
    }

    #[test]
    fn clean_batch_is_complete_in_both_modes() {
        for mode in [FaultMode::Strict, FaultMode::Tolerant] {
            let out = assemble_batch(rows(None), mode).unwrap();
            assert!(out.is_complete());
            assert_eq!(out.records.len(), 5);
            assert!(out.failures.is_empty());
        }
    }

    #[test]
    fn empty_batch_is_complete() {
        let out = assemble_batch(Vec::<RawTransactionRow>::new(), FaultMode::Tolerant).unwrap();
        assert!(out.is_complete());
        assert!(out.records.is_empty());
    }

    #[tokio::test]
    async fn storage_error_surfaces_as_upstream() {
        let query = ready(Err::<Vec<RawTransactionRow>, _>(StorageError::Decode(
            "disk on fire".into(),
        )));
        let err = fetch_batch(query, FaultMode::Tolerant).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamFetch(_)));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.kind(), "upstream_fetch_error");
    }

    #[tokio::test]
    async fn fetch_one_not_found_and_failed() {
        let err = fetch_one(ready(Ok(None::<RawTransactionRow>)), "0xdead")
            .await
            .unwrap_err();
        assert!(matches!(&err, PipelineError::NotFound(k) if k == "0xdead"));
        assert_eq!(err.status_code(), 404);

        let mut row = rows(None).remove(0);
        row.from = None;
        let err = fetch_one(ready(Ok(Some(row))), "0x01").await.unwrap_err();
        assert_eq!(err.kind(), "missing_required_address");
    }

    #[test]
    fn failure_detail_json() {
        let out = assemble_batch(rows(Some(0)), FaultMode::Tolerant).unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["failures"][0]["field"], "to");
        assert_eq!(json["failures"][0]["kind"], "invalid_address_field");
        assert_eq!(json["failures"][0]["row"]["tx_hash"], "0x01");
        assert!(json["failures"][0]["row"].get("log_index").is_none());
    }
}
