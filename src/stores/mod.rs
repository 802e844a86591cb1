//! Storage layer for the transfer engine. Provides the concurrency-safe
//! account registry ([`AccountsStore`]) with per-account exclusive locks.
//!
//! Accounts move in and out of the store as value snapshots; the only legal
//! mutation path is lock, read snapshot, compute new snapshot, update,
//! release.

mod accounts;

pub use accounts::{Account, AccountLock, AccountsStore};
