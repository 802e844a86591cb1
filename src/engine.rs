use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::dto::{TransferExecution, TransferRequest};
use crate::notifier::Notifier;
use crate::stores::AccountsStore;
use crate::Error;

/// Applies transfers as atomic, deadlock-free operations over the store.
pub struct Engine {
    store: Arc<AccountsStore>,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    pub fn new(store: Arc<AccountsStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Moves `request.amount` from the debit account to the credit account.
    ///
    /// Both balances change or neither does. Callers receive either the
    /// execution record or [`Error::InvalidTransfer`] with a stable reason;
    /// no other error kind crosses this boundary.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransferExecution, Error> {
        debug!(?request, "handling transfer request");

        if request.from == request.to {
            info!("aborting transfer between same accounts");
            return Err(Error::InvalidTransfer(
                "Same credit and debit accounts".to_owned(),
            ));
        }

        // Locks are always acquired for the lexicographically smaller
        // identifier first, independent of transfer direction, so two
        // transfers sharing an account can never circular-wait.
        let debit_first = request.from < request.to;
        let (first_id, second_id) = if debit_first {
            (&request.from, &request.to)
        } else {
            (&request.to, &request.from)
        };

        // The guards release on drop, in reverse acquisition order, on every
        // exit path below. If the second acquisition fails, the first guard
        // is already owned here and still released.
        let (first, first_lock) = self
            .store
            .lock(first_id)
            .await
            .map_err(|e| reject(request, e))?;
        let (second, second_lock) = self
            .store
            .lock(second_id)
            .await
            .map_err(|e| reject(request, e))?;

        let (debit, credit) = if debit_first {
            (first, second)
        } else {
            (second, first)
        };
        let (debit_lock, credit_lock) = if debit_first {
            (&first_lock, &second_lock)
        } else {
            (&second_lock, &first_lock)
        };

        if !debit.has_funds(request.amount) {
            info!(?request, "rejecting transfer: insufficient funds");
            return Err(Error::InvalidTransfer("Insufficient funds".to_owned()));
        }

        let debited = debit.debit(request.amount).map_err(|e| reject(request, e))?;
        let credited = credit
            .credit(request.amount)
            .map_err(|e| reject(request, e))?;

        // Both locks are held, so the persist order between the two accounts
        // does not matter.
        let _ = self.store.update(debit_lock, debited.clone());
        let _ = self.store.update(credit_lock, credited.clone());

        // Committed. Notifications are fire-and-forget from here on.
        self.notifier.notify(
            &debited,
            &format!("{} was credited to {}", request.amount, credited.id),
        );
        self.notifier.notify(
            &credited,
            &format!("{} was debited from {}", request.amount, debited.id),
        );

        Ok(TransferExecution::new(request, Utc::now()))
    }
}

/// Collapses a store- or account-level failure into the caller-facing
/// rejection, keeping the cause in the reason string.
fn reject(request: &TransferRequest, cause: Error) -> Error {
    info!(?request, %cause, "transfer failed");
    Error::InvalidTransfer(format!("Invalid transfer: {cause}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::Account;
    use rand::Rng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::timeout;

    #[derive(Default)]
    struct RecordingNotifier {
        notifications: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn notifications(&self) -> Vec<(String, String)> {
            self.notifications.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, account: &Account, message: &str) {
            self.notifications
                .lock()
                .unwrap()
                .push((account.id.clone(), message.to_owned()));
        }
    }

    fn setup() -> (Arc<AccountsStore>, Arc<RecordingNotifier>, Engine) {
        let store = Arc::new(AccountsStore::new());
        store.create(Account::new("account-1", dec!(100))).unwrap();
        store.create(Account::new("account-2", dec!(20))).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        // Method-call clone so the Arc is typed before it coerces to
        // Arc<dyn Notifier> at the argument site.
        let engine = Engine::new(Arc::clone(&store), notifier.clone());
        (store, notifier, engine)
    }

    fn request(from: &str, to: &str, amount: Decimal) -> TransferRequest {
        TransferRequest::new(from.to_owned(), to.to_owned(), amount).unwrap()
    }

    #[tokio::test]
    async fn test_transfers_funds_between_accounts() {
        let (store, notifier, engine) = setup();

        let execution = engine
            .transfer(&request("account-1", "account-2", dec!(70)))
            .await
            .unwrap();
        assert_eq!(execution.from, "account-1");
        assert_eq!(execution.to, "account-2");
        assert_eq!(execution.amount, dec!(70));

        assert_eq!(store.get("account-1"), Some(Account::new("account-1", dec!(30))));
        assert_eq!(store.get("account-2"), Some(Account::new("account-2", dec!(90))));

        assert_eq!(
            notifier.notifications(),
            vec![
                (
                    "account-1".to_owned(),
                    "70 was credited to account-2".to_owned()
                ),
                (
                    "account-2".to_owned(),
                    "70 was debited from account-1".to_owned()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_fails_to_transfer_funds_if_insufficient_amount() {
        let (store, notifier, engine) = setup();

        let result = engine
            .transfer(&request("account-1", "account-2", dec!(200)))
            .await;
        assert_eq!(
            result,
            Err(Error::InvalidTransfer("Insufficient funds".to_owned()))
        );

        assert_eq!(store.get("account-1"), Some(Account::new("account-1", dec!(100))));
        assert_eq!(store.get("account-2"), Some(Account::new("account-2", dec!(20))));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_fails_to_credit_unknown_account() {
        let (store, notifier, engine) = setup();

        let result = engine
            .transfer(&request("account-1", "unknown-account", dec!(200)))
            .await;
        assert_eq!(
            result,
            Err(Error::InvalidTransfer(
                "Invalid transfer: Account unknown-account does not exist".to_owned()
            ))
        );

        assert_eq!(store.get("account-1"), Some(Account::new("account-1", dec!(100))));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_fails_to_debit_unknown_account() {
        let (store, notifier, engine) = setup();

        let result = engine
            .transfer(&request("unknown-account", "account-2", dec!(200)))
            .await;
        assert_eq!(
            result,
            Err(Error::InvalidTransfer(
                "Invalid transfer: Account unknown-account does not exist".to_owned()
            ))
        );

        assert_eq!(store.get("account-2"), Some(Account::new("account-2", dec!(20))));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_fails_to_transfer_between_same_accounts() {
        let (store, notifier, engine) = setup();

        let result = engine
            .transfer(&request("account-1", "account-1", dec!(200)))
            .await;
        assert_eq!(
            result,
            Err(Error::InvalidTransfer(
                "Same credit and debit accounts".to_owned()
            ))
        );

        assert_eq!(store.get("account-1"), Some(Account::new("account-1", dec!(100))));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_negative_amount_reaching_the_engine() {
        // A negative amount slipping past boundary validation is caught by
        // the account-level guard and wrapped like any other cause.
        let (store, notifier, engine) = setup();

        let malformed = TransferRequest {
            from: "account-1".to_owned(),
            to: "account-2".to_owned(),
            amount: dec!(-5),
        };
        let result = engine.transfer(&malformed).await;
        assert_eq!(
            result,
            Err(Error::InvalidTransfer(
                "Invalid transfer: Invalid account change: cannot apply negative amount -5"
                    .to_owned()
            ))
        );

        assert_eq!(store.get("account-1"), Some(Account::new("account-1", dec!(100))));
        assert_eq!(store.get("account-2"), Some(Account::new("account-2", dec!(20))));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_consistently_transfers_funds_between_accounts() {
        let accounts_count = 3;
        let transfers_count = 10_000;
        let initial_deposit = dec!(3000);

        let store = Arc::new(AccountsStore::new());
        for i in 0..accounts_count {
            store
                .create(Account::new(format!("account-{i}"), initial_deposit))
                .unwrap();
        }
        let engine = Arc::new(Engine::new(
            Arc::clone(&store),
            Arc::new(RecordingNotifier::default()),
        ));

        let mut rng = rand::thread_rng();
        let barrier = Arc::new(Barrier::new(transfers_count));
        let mut handles = Vec::with_capacity(transfers_count);

        for _ in 0..transfers_count {
            let from = rng.gen_range(0..accounts_count);
            let to = loop {
                let candidate = rng.gen_range(0..accounts_count);
                if candidate != from {
                    break candidate;
                }
            };
            let request = request(
                &format!("account-{from}"),
                &format!("account-{to}"),
                Decimal::from(rng.gen_range(1..=100)),
            );

            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                // Rejected transfers (e.g. insufficient funds) are part of
                // the workload; conservation must hold regardless.
                let _ = engine.transfer(&request).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let total: Decimal = store.accounts().iter().map(|a| a.balance).sum();
        assert_eq!(total, initial_deposit * Decimal::from(accounts_count));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_symmetric_transfers_do_not_deadlock() {
        let store = Arc::new(AccountsStore::new());
        store.create(Account::new("acc-a", dec!(1000))).unwrap();
        store.create(Account::new("acc-b", dec!(1000))).unwrap();
        let engine = Arc::new(Engine::new(
            Arc::clone(&store),
            Arc::new(RecordingNotifier::default()),
        ));

        // 500 transfers in each direction, all released at once. With
        // request-dependent lock ordering this interleaving deadlocks; with
        // the fixed total order it must drain.
        let transfers_count = 1_000;
        let barrier = Arc::new(Barrier::new(transfers_count));
        let mut handles = Vec::with_capacity(transfers_count);

        for i in 0..transfers_count {
            let request = if i % 2 == 0 {
                request("acc-a", "acc-b", dec!(1))
            } else {
                request("acc-b", "acc-a", dec!(1))
            };
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.transfer(&request).await
            }));
        }

        for handle in handles {
            timeout(Duration::from_secs(60), handle)
                .await
                .expect("transfer did not complete: possible deadlock")
                .unwrap()
                .unwrap();
        }

        // Equal traffic both ways, so both balances end where they started.
        assert_eq!(store.get("acc-a"), Some(Account::new("acc-a", dec!(1000))));
        assert_eq!(store.get("acc-b"), Some(Account::new("acc-b", dec!(1000))));
    }
}
