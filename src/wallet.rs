use super::eon::{Eon, EonRecords};
use super::ledger::Ledger;
use super::serde_helpers::address;
use super::storage::{EonSnapshot, Storage};
use super::transfer::WalletRef;
use ethers::types::Address;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, watch};

/// Operator acknowledgment that a wallet joined the hub for a token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    #[serde(with = "address")]
    pub token: Address,
    pub trail_identifier: u64,
    #[serde(default)]
    pub eon_number: Option<u64>,
}

/// Per (token, wallet) state the operator and the wallet owner agree on.
pub struct WalletState {
    identity: WalletRef,
    /// Settlement contract every commitment is scoped to
    contract_address: Address,
    /// Assigned once by the operator on registration
    trail_identifier: OnceLock<u64>,
    storage: Storage,
    registrations: broadcast::Sender<Registration>,
}

impl WalletState {
    pub fn new(
        wallet_address: Address,
        token_address: Address,
        contract_address: Address,
        trail_identifier: Option<u64>,
        current_eon: Eon,
        previous_eon: Option<Eon>,
    ) -> Self {
        let (registrations, _) = broadcast::channel(4);
        let cell = OnceLock::new();
        if let Some(id) = trail_identifier {
            let _ = cell.set(id);
        }
        Self {
            identity: WalletRef::new(wallet_address, token_address),
            contract_address,
            trail_identifier: cell,
            storage: Storage::new(current_eon, previous_eon),
            registrations,
        }
    }

    /// Initial state from the operator's wallet data for `eon_number`, and
    /// for the eon before it when there is one. Swaps spanning both eons are
    /// only credited with what they matched since the checkpoint.
    pub fn from_wallet_data(
        wallet_address: Address,
        token_address: Address,
        contract_address: Address,
        eon_number: u64,
        records: EonRecords,
        previous_records: Option<EonRecords>,
        registration: Option<&Registration>,
    ) -> Self {
        let previous_eon = match (eon_number.checked_sub(1), previous_records) {
            (Some(previous_number), Some(previous)) => {
                Some(previous.into_latest_eon(previous_number))
            }
            _ => None,
        };
        Self::new(
            wallet_address,
            token_address,
            contract_address,
            registration.map(|r| r.trail_identifier),
            records.into_latest_eon(eon_number),
            previous_eon,
        )
    }

    pub fn wallet_address(&self) -> Address {
        self.identity.address
    }

    pub fn token_address(&self) -> Address {
        self.identity.token
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn identity(&self) -> WalletRef {
        self.identity
    }

    pub fn trail_identifier(&self) -> Option<u64> {
        self.trail_identifier.get().copied()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn eons(&self) -> Arc<EonSnapshot> {
        self.storage.snapshot()
    }

    pub fn current_eon(&self) -> Arc<Eon> {
        self.storage.snapshot().current.clone()
    }

    pub fn previous_eon(&self) -> Option<Arc<Eon>> {
        self.storage.snapshot().previous.clone()
    }

    /// Accounting view pinned to the eons as they are right now.
    pub fn ledger(&self) -> Ledger {
        Ledger::new(
            self.identity,
            self.contract_address,
            self.trail_identifier(),
            self.storage.snapshot(),
        )
    }

    pub fn watch_eons(&self) -> watch::Receiver<Arc<EonSnapshot>> {
        self.storage.subscribe()
    }

    pub fn registration_receiver(&self) -> broadcast::Receiver<Registration> {
        self.registrations.subscribe()
    }

    /// Records the trail identifier and surfaces the registration. A second
    /// registration is a protocol violation and is ignored.
    pub fn register(&self, registration: Registration) -> bool {
        if self.trail_identifier.set(registration.trail_identifier).is_err() {
            warn!(
                "(wallet) {:?}/{:?} registered again with trail {}, keeping {:?}",
                self.identity.token,
                self.identity.address,
                registration.trail_identifier,
                self.trail_identifier()
            );
            return false;
        }
        info!(
            "(wallet) {:?}/{:?} registered with trail {}",
            self.identity.token, self.identity.address, registration.trail_identifier
        );
        if self.registrations.send(registration).is_err() {
            warn!("(wallet) registration confirmed but nobody is listening");
        }
        true
    }
}
