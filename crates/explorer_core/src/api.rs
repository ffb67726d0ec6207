//! Operations exposed to the API layer.
//!
//! Every operation returns [`PipelineError`] on failure; `PipelineError::status_code`
//! gives the HTTP status the API layer should answer with:
//!
//! | operation | errors |
//! |---|---|
//! | `fetch_transactions`, `fetch_receipts`, `fetch_logs` | `UpstreamFetch` (502), `RowFailed` (422, strict only) |
//! | `fetch_transaction`, `fetch_receipt` | `NotFound` (404), `RowFailed` (422), `UpstreamFetch` (502) |
//! | `row_filter` | `InvalidFilter` (400) |

use crate::address::normalize;
use crate::config::ExplorerConfig;
use crate::pipeline::{fetch_batch, fetch_one, BatchOutcome, FailureDetail, FaultMode, PipelineError};
use crate::records::{LogEntry, Receipt, Transaction};
use crate::storage::{Page, RowFilter, RowSource};
use serde::Serialize;

/// Build a filter from request parameters. The address is normalized here, so a
/// malformed one is the caller's error rather than bad upstream data.
pub fn row_filter(
    address: Option<&str>,
    from_block: Option<u64>,
    to_block: Option<u64>,
) -> Result<RowFilter, PipelineError> {
    let address = address.map(normalize).transpose()?;
    Ok(RowFilter {
        address,
        from_block,
        to_block,
    })
}

pub struct Explorer<S> {
    source: S,
    config: ExplorerConfig,
}

impl<S: RowSource> Explorer<S> {
    pub fn new(source: S, config: ExplorerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Transaction list view.
    pub async fn fetch_transactions(
        &self,
        filter: &RowFilter,
        page: Page,
        mode: FaultMode,
    ) -> Result<BatchOutcome<Transaction>, PipelineError> {
        let page = self.config.page(page.offset, page.limit);
        fetch_batch(self.source.query_transactions(filter, page), mode).await
    }

    /// Transaction detail view; always strict.
    pub async fn fetch_transaction(&self, hash: &str) -> Result<Transaction, PipelineError> {
        fetch_one(self.source.transaction_by_hash(hash), hash).await
    }

    pub async fn fetch_receipts(
        &self,
        filter: &RowFilter,
        page: Page,
        mode: FaultMode,
    ) -> Result<BatchOutcome<Receipt>, PipelineError> {
        let page = self.config.page(page.offset, page.limit);
        fetch_batch(self.source.query_receipts(filter, page), mode).await
    }

    /// Receipt detail view; always strict. A bad log address fails the whole receipt.
    pub async fn fetch_receipt(&self, hash: &str) -> Result<Receipt, PipelineError> {
        fetch_one(self.source.receipt_by_hash(hash), hash).await
    }

    pub async fn fetch_logs(
        &self,
        filter: &RowFilter,
        page: Page,
        mode: FaultMode,
    ) -> Result<BatchOutcome<LogEntry>, PipelineError> {
        let page = self.config.page(page.offset, page.limit);
        fetch_batch(self.source.query_logs(filter, page), mode).await
    }
}

/// JSON error payload for a failed operation.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl From<&PipelineError> for ErrorBody {
    fn from(err: &PipelineError) -> Self {
        Self {
            status: err.status_code(),
            kind: err.kind(),
            message: err.to_string(),
            failure: err.row_failure().map(|f| f.detail()),
        }
    }
}
