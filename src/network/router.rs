use super::notification::{
    parse_wallet_stream, wallet_stream, Envelope, Notification, Route, StreamEvent,
};
use crate::error::SyncResult;
use ethers::types::Address;
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;

/// Subscription identity, one ledger per owner and token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub token: Address,
    pub wallet: Address,
}

pub type Queue = mpsc::UnboundedSender<Notification>;

/// Demultiplexes the operator feed onto per (token, wallet) queues.
#[derive(Default)]
pub struct Router {
    subscriptions: HashMap<StreamKey, Queue>,
}

impl Router {
    pub fn subscribe(&mut self, key: StreamKey, queue: Queue) {
        if self.subscriptions.insert(key, queue).is_some() {
            debug!("(router) replaced queue of {:?}/{:?}", key.token, key.wallet);
        }
    }

    /// Returns whether the wallet stream is still needed by another token.
    pub fn unsubscribe(&mut self, key: &StreamKey) -> bool {
        self.subscriptions.remove(key);
        self.has_wallet(&key.wallet)
    }

    pub fn has_wallet(&self, wallet: &Address) -> bool {
        self.subscriptions.keys().any(|k| k.wallet == *wallet)
    }

    pub fn is_subscribed(&self, key: &StreamKey) -> bool {
        self.subscriptions.contains_key(key)
    }

    /// Distinct operator streams backing the current subscriptions.
    pub fn streams(&self) -> Vec<String> {
        self.subscriptions
            .keys()
            .map(|k| wallet_stream(&k.wallet))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Routes one inbound message and returns how many queues received it.
    pub fn route(&mut self, envelope: Envelope) -> SyncResult<usize> {
        if envelope.kind != "notification" {
            debug!("(router) skipping {} message", envelope.kind);
            return Ok(0);
        }

        let event: StreamEvent = serde_json::from_value(envelope.data)?;
        let wallet = parse_wallet_stream(&event.stream)?;
        let kind = event.data.kind.clone();
        let notification = match Notification::from_event(event.data)? {
            Some(n) => n,
            None => {
                warn!("(router) ignoring unknown event {} for {:?}", kind, wallet);
                return Ok(0);
            }
        };

        let delivered = match notification.route() {
            Route::Transfer {
                sender_token,
                recipient_token,
            } => {
                let mut delivered = 0;
                if sender_token != recipient_token {
                    let key = StreamKey {
                        token: recipient_token,
                        wallet,
                    };
                    delivered += self.deliver(key, notification.clone()) as usize;
                }
                let key = StreamKey {
                    token: sender_token,
                    wallet,
                };
                delivered + self.deliver(key, notification) as usize
            }
            Route::Token(token) => self.deliver(StreamKey { token, wallet }, notification) as usize,
            Route::Unroutable => {
                warn!("(router) {} for {:?} names no token", kind, wallet);
                0
            }
        };
        Ok(delivered)
    }

    fn deliver(&mut self, key: StreamKey, notification: Notification) -> bool {
        let queue = match self.subscriptions.get(&key) {
            Some(queue) => queue,
            None => {
                warn!(
                    "(router) no subscription for {:?}/{:?}, dropping {}",
                    key.token,
                    key.wallet,
                    notification.kind()
                );
                return false;
            }
        };
        debug!(
            "(router) routing {} to {:?}/{:?}",
            notification.kind(),
            key.token,
            key.wallet
        );
        if queue.send(notification).is_err() {
            warn!(
                "(router) queue of {:?}/{:?} was dropped, removing subscription",
                key.token, key.wallet
            );
            self.subscriptions.remove(&key);
            return false;
        }
        true
    }
}
