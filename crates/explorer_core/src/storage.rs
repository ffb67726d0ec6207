//! Storage collaborator: the `RowSource` query interface and its SQLite implementation.
//!
//! Address columns are nullable TEXT holding whatever the indexer wrote; nothing here
//! validates them.

use crate::address::ChecksummedAddress;
use crate::records::{RawLogRow, RawReceiptRow, RawTransactionRow};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode: {0}")]
    Decode(String),
    #[error("storage task: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("value out of range for column {0}")]
    OutOfRange(&'static str),
}

/// Row selection shared by all queries. Block bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Transactions: matches `from` or `to`. Receipts: matches `from`, `to` or
    /// `contractAddress`. Logs: matches the emitting address.
    pub address: Option<ChecksummedAddress>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

/// Raw rows for bulk import, as produced by the indexer's JSON dump.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RowDump {
    #[serde(default)]
    pub transactions: Vec<RawTransactionRow>,
    #[serde(default)]
    pub receipts: Vec<RawReceiptRow>,
}

/// Query interface of the chain-state database.
///
/// Rows come back in natural chain order: block number, then transaction index,
/// then log index.
///
/// Address columns are returned untouched. Any other column that cannot be decoded
/// (bad `topics` JSON, a negative integer) fails the whole query with
/// [`StorageError`], so tolerant batches only isolate failures found during assembly.
pub trait RowSource: Send + Sync {
    fn query_transactions(
        &self,
        filter: &RowFilter,
        page: Page,
    ) -> impl Future<Output = Result<Vec<RawTransactionRow>, StorageError>> + Send;

    fn transaction_by_hash(
        &self,
        hash: &str,
    ) -> impl Future<Output = Result<Option<RawTransactionRow>, StorageError>> + Send;

    fn query_receipts(
        &self,
        filter: &RowFilter,
        page: Page,
    ) -> impl Future<Output = Result<Vec<RawReceiptRow>, StorageError>> + Send;

    fn receipt_by_hash(
        &self,
        hash: &str,
    ) -> impl Future<Output = Result<Option<RawReceiptRow>, StorageError>> + Send;

    fn query_logs(
        &self,
        filter: &RowFilter,
        page: Page,
    ) -> impl Future<Output = Result<Vec<RawLogRow>, StorageError>> + Send;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS transactions (
        hash TEXT PRIMARY KEY,
        block_number INTEGER NOT NULL,
        tx_index INTEGER NOT NULL,
        block_timestamp INTEGER,
        from_address TEXT,
        to_address TEXT,
        value TEXT NOT NULL,
        nonce INTEGER NOT NULL,
        gas_limit INTEGER NOT NULL,
        input TEXT NOT NULL DEFAULT '',
        imported_utc INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_order ON transactions(block_number, tx_index);
    CREATE TABLE IF NOT EXISTS receipts (
        tx_hash TEXT PRIMARY KEY,
        block_number INTEGER NOT NULL,
        tx_index INTEGER NOT NULL,
        from_address TEXT,
        to_address TEXT,
        contract_address TEXT,
        status INTEGER,
        gas_used INTEGER NOT NULL,
        cumulative_gas_used INTEGER NOT NULL,
        imported_utc INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_receipts_order ON receipts(block_number, tx_index);
    CREATE TABLE IF NOT EXISTS logs (
        tx_hash TEXT NOT NULL,
        block_number INTEGER NOT NULL,
        tx_index INTEGER NOT NULL,
        log_index INTEGER NOT NULL,
        address TEXT,
        topics TEXT NOT NULL DEFAULT '[]',
        data TEXT NOT NULL DEFAULT '',
        imported_utc INTEGER NOT NULL,
        PRIMARY KEY (tx_hash, log_index)
    );
    CREATE INDEX IF NOT EXISTS idx_logs_order ON logs(block_number, tx_index, log_index);
"#;

const TX_COLUMNS: &str = "hash, block_number, tx_index, block_timestamp, from_address, \
                          to_address, value, nonce, gas_limit, input";
const RECEIPT_COLUMNS: &str = "tx_hash, block_number, tx_index, from_address, to_address, \
                               contract_address, status, gas_used, cumulative_gas_used";
const LOG_COLUMNS: &str = "tx_hash, block_number, tx_index, log_index, address, topics, data";

const RANGE_CLAUSE: &str = "(?1 IS NULL OR block_number >= ?1) AND (?2 IS NULL OR block_number <= ?2)";

/// Match an address column against `?3`/`?4`. SQLite's one-argument `trim` only strips
/// spaces; this strips the same ASCII whitespace `normalize` does (space, tab, LF, FF, CR).
fn address_matches(column: &str) -> String {
    format!("lower(trim({column}, ' ' || char(9, 10, 12, 13))) IN (?3, ?4)")
}

/// SQLite-backed chain-state mirror.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace every row in `dump` in one SQLite transaction.
    pub fn import(&self, dump: &RowDump) -> Result<(), StorageError> {
        let imported = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let db = conn.transaction()?;
        for tx in &dump.transactions {
            db.execute(
                "INSERT OR REPLACE INTO transactions (hash, block_number, tx_index, \
                 block_timestamp, from_address, to_address, value, nonce, gas_limit, input, \
                 imported_utc) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    tx.hash,
                    to_i64(tx.block_number, "block_number")?,
                    tx.tx_index,
                    tx.block_timestamp,
                    tx.from,
                    tx.to,
                    tx.value,
                    to_i64(tx.nonce, "nonce")?,
                    to_i64(tx.gas_limit, "gas_limit")?,
                    tx.input,
                    imported,
                ],
            )?;
        }
        for receipt in &dump.receipts {
            db.execute(
                "INSERT OR REPLACE INTO receipts (tx_hash, block_number, tx_index, from_address, \
                 to_address, contract_address, status, gas_used, cumulative_gas_used, \
                 imported_utc) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    receipt.tx_hash,
                    to_i64(receipt.block_number, "block_number")?,
                    receipt.tx_index,
                    receipt.from,
                    receipt.to,
                    receipt.contract_address,
                    receipt.status,
                    to_i64(receipt.gas_used, "gas_used")?,
                    to_i64(receipt.cumulative_gas_used, "cumulative_gas_used")?,
                    imported,
                ],
            )?;
            for log in &receipt.logs {
                let topics = serde_json::to_string(&log.topics)
                    .map_err(|e| StorageError::Decode(e.to_string()))?;
                db.execute(
                    "INSERT OR REPLACE INTO logs (tx_hash, block_number, tx_index, log_index, \
                     address, topics, data, imported_utc) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        log.tx_hash,
                        to_i64(log.block_number, "block_number")?,
                        log.tx_index,
                        log.log_index,
                        log.address,
                        topics,
                        log.data,
                        imported,
                    ],
                )?;
            }
        }
        db.commit()?;
        debug!(
            transactions = dump.transactions.len(),
            receipts = dump.receipts.len(),
            "imported rows"
        );
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            f(&conn)
        })
        .await?
    }
}

impl RowSource for SqliteStore {
    async fn query_transactions(
        &self,
        filter: &RowFilter,
        page: Page,
    ) -> Result<Vec<RawTransactionRow>, StorageError> {
        let params = FilterParams::new(filter, page)?;
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TX_COLUMNS} FROM transactions WHERE {RANGE_CLAUSE} \
                 AND (?3 IS NULL OR {} OR {}) \
                 ORDER BY block_number, tx_index LIMIT ?5 OFFSET ?6",
                address_matches("from_address"),
                address_matches("to_address"),
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(&params.as_params()[..], tx_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn transaction_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<RawTransactionRow>, StorageError> {
        let hash = hash.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE hash = ?1");
            let row = conn.query_row(&sql, [&hash], tx_from_row).optional()?;
            Ok(row)
        })
        .await
    }

    async fn query_receipts(
        &self,
        filter: &RowFilter,
        page: Page,
    ) -> Result<Vec<RawReceiptRow>, StorageError> {
        let params = FilterParams::new(filter, page)?;
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE {RANGE_CLAUSE} \
                 AND (?3 IS NULL OR {} OR {} OR {}) \
                 ORDER BY block_number, tx_index LIMIT ?5 OFFSET ?6",
                address_matches("from_address"),
                address_matches("to_address"),
                address_matches("contract_address"),
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut receipts = stmt
                .query_map(&params.as_params()[..], receipt_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            for receipt in &mut receipts {
                receipt.logs = logs_for_tx(conn, &receipt.tx_hash)?;
            }
            Ok(receipts)
        })
        .await
    }

    async fn receipt_by_hash(&self, hash: &str) -> Result<Option<RawReceiptRow>, StorageError> {
        let hash = hash.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE tx_hash = ?1");
            let Some(mut receipt) = conn.query_row(&sql, [&hash], receipt_from_row).optional()?
            else {
                return Ok(None);
            };
            receipt.logs = logs_for_tx(conn, &hash)?;
            Ok(Some(receipt))
        })
        .await
    }

    async fn query_logs(
        &self,
        filter: &RowFilter,
        page: Page,
    ) -> Result<Vec<RawLogRow>, StorageError> {
        let params = FilterParams::new(filter, page)?;
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {LOG_COLUMNS} FROM logs WHERE {RANGE_CLAUSE} \
                 AND (?3 IS NULL OR {}) \
                 ORDER BY block_number, tx_index, log_index LIMIT ?5 OFFSET ?6",
                address_matches("address"),
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(&params.as_params()[..], log_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

/// Owned positional parameters `?1..?6` for the filtered list queries.
struct FilterParams {
    from_block: Option<i64>,
    to_block: Option<i64>,
    prefixed: Option<String>,
    bare: Option<String>,
    limit: i64,
    offset: i64,
}

impl FilterParams {
    fn new(filter: &RowFilter, page: Page) -> Result<Self, StorageError> {
        // Stored addresses vary in casing and prefix; queries compare the lowercased
        // column against both the prefixed and bare forms.
        let lower = filter.address.map(|a| hex::encode(a.as_bytes()));
        Ok(Self {
            from_block: filter
                .from_block
                .map(|b| to_i64(b, "block_number"))
                .transpose()?,
            to_block: filter
                .to_block
                .map(|b| to_i64(b, "block_number"))
                .transpose()?,
            prefixed: lower.as_ref().map(|l| format!("0x{l}")),
            bare: lower,
            limit: i64::from(page.limit),
            offset: i64::from(page.offset),
        })
    }

    fn as_params(&self) -> [&dyn ToSql; 6] {
        [
            &self.from_block,
            &self.to_block,
            &self.prefixed,
            &self.bare,
            &self.limit,
            &self.offset,
        ]
    }
}

fn logs_for_tx(conn: &Connection, tx_hash: &str) -> Result<Vec<RawLogRow>, StorageError> {
    let sql = format!("SELECT {LOG_COLUMNS} FROM logs WHERE tx_hash = ?1 ORDER BY log_index");
    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map([tx_hash], log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

fn tx_from_row(r: &Row<'_>) -> rusqlite::Result<RawTransactionRow> {
    Ok(RawTransactionRow {
        hash: r.get(0)?,
        block_number: get_u64(r, 1)?,
        tx_index: r.get(2)?,
        block_timestamp: r.get(3)?,
        from: r.get(4)?,
        to: r.get(5)?,
        value: r.get(6)?,
        nonce: get_u64(r, 7)?,
        gas_limit: get_u64(r, 8)?,
        input: r.get(9)?,
    })
}

fn receipt_from_row(r: &Row<'_>) -> rusqlite::Result<RawReceiptRow> {
    Ok(RawReceiptRow {
        tx_hash: r.get(0)?,
        block_number: get_u64(r, 1)?,
        tx_index: r.get(2)?,
        from: r.get(3)?,
        to: r.get(4)?,
        contract_address: r.get(5)?,
        status: r.get::<_, Option<i64>>(6)?.map(|s| s != 0),
        gas_used: get_u64(r, 7)?,
        cumulative_gas_used: get_u64(r, 8)?,
        logs: Vec::new(),
    })
}

fn log_from_row(r: &Row<'_>) -> rusqlite::Result<RawLogRow> {
    let topics: String = r.get(5)?;
    let topics: Vec<String> = serde_json::from_str(&topics)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(RawLogRow {
        tx_hash: r.get(0)?,
        block_number: get_u64(r, 1)?,
        tx_index: r.get(2)?,
        log_index: r.get(3)?,
        address: r.get(4)?,
        topics,
        data: r.get(6)?,
    })
}

fn get_u64(r: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let v: i64 = r.get(idx)?;
    u64::try_from(v)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn to_i64(v: u64, column: &'static str) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::OutOfRange(column))
}
