use tracing::info;

use crate::stores::Account;

/// External sink informed of completed balance changes.
///
/// Called once per affected account after a transfer has been committed.
/// Fire-and-forget: the engine never consults a result, and a lost
/// notification does not roll back the transfer.
pub trait Notifier: Send + Sync {
    fn notify(&self, account: &Account, message: &str);
}

/// Notifier that writes notifications to the log.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, account: &Account, message: &str) {
        info!(account = %account.id, "{}", message);
    }
}
