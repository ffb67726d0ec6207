//! explorer CLI: normalize addresses, import raw rows, query checksummed records.

use clap::{Args, Parser, Subcommand};
use explorer_core::{
    normalize, row_filter, ErrorBody, Explorer, ExplorerConfig, FaultMode, Page, PipelineError,
    RowDump, SqliteStore,
};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Normalize(args) => run_normalize(args),
        Command::Import(args) => run_import(args),
        Command::Txs(args) => run_txs(args),
        Command::Tx(args) => run_tx(args),
        Command::Receipt(args) => run_receipt(args),
        Command::Logs(args) => run_logs(args),
    }
}

#[derive(Parser)]
#[command(name = "explorer")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Checksummed transaction, receipt and log records from a chain-state database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the checksummed form of each address.
    Normalize(NormalizeArgs),
    /// Load a JSON dump of raw rows into the database.
    Import(ImportArgs),
    /// List transactions (tolerant unless --strict).
    Txs(ListArgs),
    /// Show one transaction.
    Tx(DetailArgs),
    /// Show one receipt with its logs.
    Receipt(DetailArgs),
    /// List logs (tolerant unless --strict).
    Logs(ListArgs),
}

#[derive(Args)]
struct NormalizeArgs {
    #[arg(required = true)]
    addresses: Vec<String>,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(long, default_value = "./data/explorer.sqlite")]
    db: PathBuf,
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value = "./data/explorer.sqlite")]
    db: PathBuf,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    from_block: Option<u64>,
    #[arg(long)]
    to_block: Option<u64>,
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// 0 uses the default page size.
    #[arg(long, default_value_t = 0)]
    limit: u32,
    /// Fail the whole listing on the first malformed row.
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct DetailArgs {
    #[arg(long, default_value = "./data/explorer.sqlite")]
    db: PathBuf,
    #[arg(long)]
    hash: String,
}

fn open_explorer(db: &std::path::Path) -> Result<Explorer<SqliteStore>, Box<dyn std::error::Error>> {
    let store = SqliteStore::open(db)?;
    Ok(Explorer::new(store, ExplorerConfig::default()))
}

fn list_mode(strict: bool, config: &ExplorerConfig) -> FaultMode {
    if strict {
        FaultMode::Strict
    } else {
        config.list_mode
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report a pipeline error the way the API layer would, then exit.
fn fail(err: &PipelineError) -> ! {
    let body = ErrorBody::from(err);
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&body).unwrap_or_else(|_| err.to_string())
    );
    std::process::exit(2);
}

fn run_normalize(args: NormalizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut any_invalid = false;
    for raw in &args.addresses {
        match normalize(raw) {
            Ok(addr) => println!("{addr}"),
            Err(e) => {
                any_invalid = true;
                eprintln!("{e}");
            }
        }
    }
    if any_invalid {
        std::process::exit(1);
    }
    Ok(())
}

fn run_import(args: ImportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(&args.file)?;
    let dump: RowDump = serde_json::from_str(&json)?;
    let store = SqliteStore::open(&args.db)?;
    store.import(&dump)?;
    info!(
        transactions = dump.transactions.len(),
        receipts = dump.receipts.len(),
        db = ?args.db,
        "import complete"
    );
    Ok(())
}

fn run_txs(args: ListArgs) -> Result<(), Box<dyn std::error::Error>> {
    let explorer = open_explorer(&args.db)?;
    let mode = list_mode(args.strict, explorer.config());
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let filter = row_filter(args.address.as_deref(), args.from_block, args.to_block)?;
        let page = Page {
            offset: args.offset,
            limit: args.limit,
        };
        explorer.fetch_transactions(&filter, page, mode).await
    });
    match result {
        Ok(outcome) => print_json(&outcome),
        Err(e) => fail(&e),
    }
}

fn run_tx(args: DetailArgs) -> Result<(), Box<dyn std::error::Error>> {
    let explorer = open_explorer(&args.db)?;
    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(explorer.fetch_transaction(&args.hash)) {
        Ok(tx) => print_json(&tx),
        Err(e) => fail(&e),
    }
}

fn run_receipt(args: DetailArgs) -> Result<(), Box<dyn std::error::Error>> {
    let explorer = open_explorer(&args.db)?;
    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(explorer.fetch_receipt(&args.hash)) {
        Ok(receipt) => print_json(&receipt),
        Err(e) => fail(&e),
    }
}

fn run_logs(args: ListArgs) -> Result<(), Box<dyn std::error::Error>> {
    let explorer = open_explorer(&args.db)?;
    let mode = list_mode(args.strict, explorer.config());
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let filter = row_filter(args.address.as_deref(), args.from_block, args.to_block)?;
        let page = Page {
            offset: args.offset,
            limit: args.limit,
        };
        explorer.fetch_logs(&filter, page, mode).await
    });
    match result {
        Ok(outcome) => print_json(&outcome),
        Err(e) => fail(&e),
    }
}
