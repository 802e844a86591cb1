//! The runner is the boundary adapter: it streams operations from a CSV
//! file, feeds them through the engine, and writes the final account
//! balances to a writer.
//!
//! Rejected operations are logged and skipped; processing continues.

use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use csv_async::{AsyncReaderBuilder, Error as CsvError, Trim};
use rust_decimal::Decimal;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::info;

use crate::csv_utils::write_csv;
use crate::dto::{AccountRow, Operation, OperationType, TransferFailure, TransferRequest};
use crate::notifier::LoggingNotifier;
use crate::stores::{Account, AccountsStore};
use crate::Engine;

const BUFFER_SIZE: usize = 1024;

type Result<T, E = Box<dyn Error + Send + Sync>> = std::result::Result<T, E>;

/// Runs the transfer engine on the given operations file and writes the
/// final balances to the provided writer. Spawns two tasks:
/// * CSV reader - streams operations from the input file, deserializes them and sends them to the processor via channel.
/// * Processor - receives operations from the channel and applies them until the channel is closed.
///
/// # Arguments
/// * `input_path` - Path to the input CSV file containing operations
/// * `writer` - Where to write the account balances (e.g. stdout)
///
/// # Errors
/// Returns an error if:
/// * The input file cannot be read
/// * The CSV is malformed
/// * Writing to the output fails
pub async fn run<P, W>(input_path: P, writer: W) -> Result<()>
where
    P: AsRef<Path>,
    W: Write,
{
    let store = Arc::new(AccountsStore::new());
    let engine = Engine::new(Arc::clone(&store), Arc::new(LoggingNotifier));

    // Create channel for passing operations from reader to processor
    let (tx, rx) = mpsc::channel(BUFFER_SIZE);
    let input_path = input_path.as_ref().to_owned();

    let reader_handle = tokio::spawn(read_operations(input_path, tx));
    let processor_handle = tokio::spawn(apply_operations(rx, Arc::clone(&store), engine));

    // Wait for reader to finish and propagate any errors
    reader_handle.await??;
    processor_handle.await?;

    // Sort accounts by identifier for deterministic output
    let mut accounts: Vec<AccountRow> = store.accounts().into_iter().map(AccountRow::from).collect();
    accounts.sort_by(|a, b| a.account.cmp(&b.account));

    write_csv(writer, accounts.into_iter())?;
    Ok(())
}

/// Reads and deserializes operations from a CSV file.
/// Returns them through the provided channel.
async fn read_operations(
    input_path: impl AsRef<Path> + Send,
    tx: mpsc::Sender<Operation>,
) -> Result<(), CsvError> {
    let file = File::open(input_path).await?;
    let mut csv_reader = AsyncReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .create_deserializer(file);

    let mut records = csv_reader.deserialize::<Operation>();
    while let Some(result) = records.next().await {
        match result {
            Ok(operation) => {
                if tx.send(operation).await.is_err() {
                    // Receiver dropped, exit gracefully
                    break;
                }
            }
            // CSV parsing errors are critical - propagate them
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Applies operations received through the channel until it is closed by
/// the reader. Rejected operations are logged and skipped.
async fn apply_operations(
    mut rx: mpsc::Receiver<Operation>,
    store: Arc<AccountsStore>,
    engine: Engine,
) {
    while let Some(operation) = rx.recv().await {
        match operation.op_type {
            OperationType::Open => {
                let balance = operation.amount.unwrap_or(Decimal::ZERO);
                if balance < Decimal::ZERO {
                    info!(
                        account = %operation.account, %balance,
                        "skipping open with negative initial balance"
                    );
                    continue;
                }
                if let Err(e) = store.create(Account::new(operation.account, balance)) {
                    info!(%e, "skipping open operation");
                }
            }
            OperationType::Transfer => {
                let Some(to) = operation.to else {
                    info!(account = %operation.account, "skipping transfer without destination");
                    continue;
                };
                let Some(amount) = operation.amount else {
                    info!(account = %operation.account, "skipping transfer without amount");
                    continue;
                };
                match TransferRequest::new(operation.account, to, amount) {
                    Ok(request) => {
                        if let Err(e) = engine.transfer(&request).await {
                            let failure =
                                TransferFailure::new(&request, Utc::now(), e.to_string());
                            info!(?failure, "transfer rejected");
                        }
                    }
                    Err(e) => info!(%e, "skipping malformed transfer"),
                }
            }
        }
    }
}
