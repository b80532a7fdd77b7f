use crate::serde_helpers::{address, option_u256_dec, u256_dec};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletRef {
    #[serde(with = "address", alias = "wallet")]
    pub address: Address,
    #[serde(with = "address")]
    pub token: Address,
}

impl WalletRef {
    pub fn new(address: Address, token: Address) -> Self {
        Self { address, token }
    }
}

/// Cumulative spendings and gains of the signer as of one transfer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveState {
    #[serde(with = "u256_dec")]
    pub updated_spendings: U256,
    #[serde(with = "u256_dec")]
    pub updated_gains: U256,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchedAmounts {
    #[serde(with = "u256_dec")]
    pub matched_in: U256,
    #[serde(with = "u256_dec")]
    pub matched_out: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveStateType {
    Sender,
    Recipient,
    SenderCancellation,
    RecipientCancellation,
    RecipientFinalization,
    Fulfillment,
}

impl fmt::Display for ActiveStateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActiveStateType::Sender => "sender",
            ActiveStateType::Recipient => "recipient",
            ActiveStateType::SenderCancellation => "sender cancellation",
            ActiveStateType::RecipientCancellation => "recipient cancellation",
            ActiveStateType::RecipientFinalization => "recipient finalization",
            ActiveStateType::Fulfillment => "fulfillment",
        };
        f.write_str(name)
    }
}

/// One balance affecting event, either a plain transfer or one leg of a swap.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Stream identity, notifications about the same
    /// transfer share it
    pub id: u64,
    /// Swap identity, stable across eons
    #[serde(default)]
    pub tx_id: String,
    pub eon_number: u64,

    pub wallet: WalletRef,
    pub recipient: WalletRef,
    #[serde(default)]
    pub recipient_trail_identifier: u64,

    #[serde(with = "u256_dec")]
    pub amount: U256,
    #[serde(default, with = "u256_dec")]
    pub amount_swapped: U256,
    #[serde(default)]
    pub matched_amounts: MatchedAmounts,

    #[serde(with = "u256_dec")]
    pub nonce: U256,
    #[serde(default, with = "option_u256_dec")]
    pub position: Option<U256>,

    #[serde(default)]
    pub passive: bool,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub voided: bool,
    #[serde(default)]
    pub appended: bool,

    #[serde(default)]
    pub sender_active_state: Option<ActiveState>,
    #[serde(default)]
    pub recipient_active_state: Option<ActiveState>,
    #[serde(default)]
    pub sender_cancellation_active_state: Option<ActiveState>,
    #[serde(default)]
    pub recipient_cancellation_active_state: Option<ActiveState>,
    #[serde(default)]
    pub recipient_finalization_active_state: Option<ActiveState>,
    #[serde(default, alias = "recipient_fulfillment_active_state")]
    pub fulfillment_active_state: Option<ActiveState>,
}

impl Transfer {
    pub fn is_swap(&self) -> bool {
        !self.amount_swapped.is_zero()
    }

    /// Whether `wallet` is the sending side of this transfer.
    pub fn is_outgoing_for(&self, wallet: &WalletRef) -> bool {
        self.wallet == *wallet
    }

    /// Passive transfers received by `wallet` are committed to by the
    /// sender only.
    pub fn is_passively_received_by(&self, wallet: &WalletRef) -> bool {
        self.passive && !self.is_outgoing_for(wallet)
    }

    pub fn active_state(&self, kind: ActiveStateType) -> Option<&ActiveState> {
        match kind {
            ActiveStateType::Sender => self.sender_active_state.as_ref(),
            ActiveStateType::Recipient => self.recipient_active_state.as_ref(),
            ActiveStateType::SenderCancellation => self.sender_cancellation_active_state.as_ref(),
            ActiveStateType::RecipientCancellation => {
                self.recipient_cancellation_active_state.as_ref()
            }
            ActiveStateType::RecipientFinalization => {
                self.recipient_finalization_active_state.as_ref()
            }
            ActiveStateType::Fulfillment => self.fulfillment_active_state.as_ref(),
        }
    }

    /// Which signed snapshot is authoritative for `wallet` given the
    /// transfer's direction and status.
    pub fn active_state_type(&self, wallet: &WalletRef) -> ActiveStateType {
        let outgoing = self.is_outgoing_for(wallet);
        if !(self.is_swap() && self.processed) {
            return if outgoing {
                ActiveStateType::Sender
            } else {
                ActiveStateType::Recipient
            };
        }

        if outgoing {
            if self.cancelled {
                ActiveStateType::SenderCancellation
            } else {
                ActiveStateType::Sender
            }
        } else if self.recipient_finalization_active_state.is_some() {
            ActiveStateType::RecipientFinalization
        } else if self.cancelled {
            ActiveStateType::RecipientCancellation
        } else if self.complete {
            ActiveStateType::Fulfillment
        } else {
            ActiveStateType::Recipient
        }
    }
}
