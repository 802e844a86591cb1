mod csv_utils;
mod dto;
mod engine;
mod error;
mod notifier;
mod runner;
mod stores;

pub use dto::{
    AccountRow, Operation, OperationType, TransferExecution, TransferFailure, TransferRequest,
};
pub use engine::Engine;
pub use error::Error;
pub use notifier::{LoggingNotifier, Notifier};
pub use runner::run;
pub use stores::{Account, AccountLock, AccountsStore};
