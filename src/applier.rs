use super::eon::BalanceChange;
use super::network::notification::Notification;
use super::wallet::WalletState;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;

/// What applying one notification did to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    RolledOver,
    Registered,
    Ignored,
}

/// Applies `notification` to `wallet`. Eon contents are never edited in place,
/// each change installs a new eon snapshot. Redelivered notifications leave
/// the wallet as it was.
pub fn apply(wallet: &WalletState, notification: Notification) -> Outcome {
    let current = wallet.current_eon();
    match notification {
        Notification::IncomingTransfer(transfer)
        | Notification::IncomingReceipt(transfer)
        | Notification::IncomingConfirmation(transfer)
        | Notification::TimeoutTransfer(transfer)
        | Notification::MatchedSwap(transfer)
        | Notification::FinalizedSwap(transfer)
        | Notification::CancelledSwap(transfer) => {
            if transfer.eon_number != current.eon_number() {
                warn!(
                    "(applier) transfer {} belongs to eon {}, current is {}",
                    transfer.id,
                    transfer.eon_number,
                    current.eon_number()
                );
                return Outcome::Ignored;
            }
            wallet
                .storage()
                .update_current(|eon| eon.with_transfer(transfer));
            Outcome::Updated
        }
        Notification::RegisteredWallet(registration) => {
            if wallet.register(registration) {
                Outcome::Registered
            } else {
                Outcome::Ignored
            }
        }
        Notification::ConfirmedDeposit(deposit) => {
            if !accepts(current.deposits(), &deposit, current.eon_number()) {
                return Outcome::Ignored;
            }
            wallet
                .storage()
                .update_current(|eon| eon.with_deposit(deposit));
            Outcome::Updated
        }
        Notification::RequestedWithdrawal(withdrawal) => {
            debug!(
                "(applier) withdrawal of {} requested in eon {}",
                withdrawal.amount, withdrawal.eon_number
            );
            Outcome::Ignored
        }
        Notification::ConfirmedWithdrawal(withdrawal) => {
            if !accepts(current.withdrawals(), &withdrawal, current.eon_number()) {
                return Outcome::Ignored;
            }
            wallet
                .storage()
                .update_current(|eon| eon.with_withdrawal(withdrawal));
            Outcome::Updated
        }
        Notification::CheckpointCreated(records) => {
            let next = records.into_latest_eon(current.eon_number() + 1);
            if next.eon_number() <= current.eon_number() {
                warn!(
                    "(applier) stale checkpoint for eon {}, current is {}",
                    next.eon_number(),
                    current.eon_number()
                );
                return Outcome::Ignored;
            }
            if next.merkle_proof().is_none() {
                warn!("(applier) checkpoint for eon {} carries no merkle proof", next.eon_number());
            }
            info!(
                "(applier) eon {} checkpointed, now in eon {}",
                current.eon_number(),
                next.eon_number()
            );
            wallet.storage().roll_over(next);
            Outcome::RolledOver
        }
    }
}

/// Records of another eon and redelivered records carrying the same txid are
/// skipped.
fn accepts(existing: &[BalanceChange], change: &BalanceChange, eon_number: u64) -> bool {
    if change.eon_number != eon_number {
        warn!(
            "(applier) balance change for eon {} arrived in eon {}",
            change.eon_number, eon_number
        );
        return false;
    }
    if change.txid.is_some() && existing.iter().any(|c| c == change) {
        debug!("(applier) duplicate balance change {:?}", change.txid);
        return false;
    }
    true
}

/// Drains one subscriber queue into its wallet.
pub struct Applier {
    wallet: Arc<WalletState>,
    queue: mpsc::UnboundedReceiver<Notification>,
}

impl Applier {
    pub fn new(wallet: Arc<WalletState>, queue: mpsc::UnboundedReceiver<Notification>) -> Self {
        Self { wallet, queue }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            select! {
                _ = cancel.cancelled() => return,
                notification = self.queue.recv() => match notification {
                    Some(notification) => self.notification_handler(notification),
                    None => {
                        info!("(applier) queue closed");
                        return;
                    }
                }
            }
        }
    }

    fn notification_handler(&self, notification: Notification) {
        let kind = notification.kind();
        let outcome = apply(&self.wallet, notification);
        debug!("(applier) {} -> {:?}", kind, outcome);
        if outcome == Outcome::Ignored {
            return;
        }
        match self.wallet.ledger().balance() {
            Ok(balance) => info!(
                "(applier) {:?}/{:?} balance {} after {}",
                self.wallet.token_address(),
                self.wallet.wallet_address(),
                balance,
                kind
            ),
            Err(e) => error!("(applier) balance unavailable after {}: {}", kind, e),
        }
    }
}
