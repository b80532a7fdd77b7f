use crate::eon::{Deposit, EonRecords, Withdrawal};
use crate::error::{SyncError, SyncResult};
use crate::serde_helpers::parse_address;
use crate::transfer::Transfer;
use crate::wallet::Registration;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const WALLET_STREAM_PREFIX: &str = "wallet/";

/// Name of the operator stream carrying a wallet's notifications.
pub fn wallet_stream(wallet: &Address) -> String {
    format!("{}{}", WALLET_STREAM_PREFIX, hex::encode(wallet.as_bytes()))
}

pub fn parse_wallet_stream(stream: &str) -> SyncResult<Address> {
    let wallet = stream
        .strip_prefix(WALLET_STREAM_PREFIX)
        .ok_or_else(|| SyncError::Address(format!("not a wallet stream: {}", stream)))?;
    parse_address(wallet).map_err(SyncError::Address)
}

/// Every inbound websocket message.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    /// Echoed back in an `ack`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Value>,
}

/// Payload of a `notification` envelope.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub stream: String,
    pub data: RawEvent,
}

/// A stream event, its payload fields sit next to `type`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawEvent {
    /// The event payload. An event whose only field is `data` carries its
    /// payload nested there instead.
    pub fn into_payload(mut self) -> Value {
        if self.fields.len() == 1 {
            if let Some(data) = self.fields.remove("data") {
                return data;
            }
        }
        Value::Object(self.fields)
    }
}

/// Control messages sent to the operator.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", content = "args", rename_all = "lowercase")]
pub enum Operation {
    Subscribe { streams: Vec<String> },
    Unsubscribe { streams: Vec<String> },
    Ack { uuid: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    IncomingTransfer(Transfer),
    IncomingReceipt(Transfer),
    IncomingConfirmation(Transfer),
    TimeoutTransfer(Transfer),
    MatchedSwap(Transfer),
    FinalizedSwap(Transfer),
    CancelledSwap(Transfer),
    RegisteredWallet(Registration),
    ConfirmedDeposit(Deposit),
    RequestedWithdrawal(Withdrawal),
    ConfirmedWithdrawal(Withdrawal),
    CheckpointCreated(EonRecords),
}

/// Which per token queues a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Both tokens of a transfer, equal for plain transfers
    Transfer {
        sender_token: Address,
        recipient_token: Address,
    },
    Token(Address),
    /// The payload named no token
    Unroutable,
}

impl Notification {
    /// Decodes a stream event, `Ok(None)` for kinds this client does not know.
    pub fn from_event(event: RawEvent) -> SyncResult<Option<Self>> {
        let kind = event.kind.clone();
        let data = event.into_payload();
        let notification = match kind.as_str() {
            "INCOMING_TRANSFER" => Notification::IncomingTransfer(serde_json::from_value(data)?),
            "INCOMING_RECEIPT" => Notification::IncomingReceipt(serde_json::from_value(data)?),
            "INCOMING_CONFIRMATION" => {
                Notification::IncomingConfirmation(serde_json::from_value(data)?)
            }
            "TIMEOUT_TRANSFER" => Notification::TimeoutTransfer(serde_json::from_value(data)?),
            "MATCHED_SWAP" => Notification::MatchedSwap(serde_json::from_value(data)?),
            "FINALIZED_SWAP" => Notification::FinalizedSwap(serde_json::from_value(data)?),
            "CANCELLED_SWAP" => Notification::CancelledSwap(serde_json::from_value(data)?),
            "REGISTERED_WALLET" => Notification::RegisteredWallet(serde_json::from_value(data)?),
            "CONFIRMED_DEPOSIT" => Notification::ConfirmedDeposit(serde_json::from_value(data)?),
            "REQUESTED_WITHDRAWAL" => {
                Notification::RequestedWithdrawal(serde_json::from_value(data)?)
            }
            "CONFIRMED_WITHDRAWAL" => {
                Notification::ConfirmedWithdrawal(serde_json::from_value(data)?)
            }
            "CHECKPOINT_CREATED" => Notification::CheckpointCreated(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::IncomingTransfer(_) => "INCOMING_TRANSFER",
            Notification::IncomingReceipt(_) => "INCOMING_RECEIPT",
            Notification::IncomingConfirmation(_) => "INCOMING_CONFIRMATION",
            Notification::TimeoutTransfer(_) => "TIMEOUT_TRANSFER",
            Notification::MatchedSwap(_) => "MATCHED_SWAP",
            Notification::FinalizedSwap(_) => "FINALIZED_SWAP",
            Notification::CancelledSwap(_) => "CANCELLED_SWAP",
            Notification::RegisteredWallet(_) => "REGISTERED_WALLET",
            Notification::ConfirmedDeposit(_) => "CONFIRMED_DEPOSIT",
            Notification::RequestedWithdrawal(_) => "REQUESTED_WITHDRAWAL",
            Notification::ConfirmedWithdrawal(_) => "CONFIRMED_WITHDRAWAL",
            Notification::CheckpointCreated(_) => "CHECKPOINT_CREATED",
        }
    }

    /// The transfer carried by transfer class notifications.
    pub fn transfer(&self) -> Option<&Transfer> {
        match self {
            Notification::IncomingTransfer(t)
            | Notification::IncomingReceipt(t)
            | Notification::IncomingConfirmation(t)
            | Notification::TimeoutTransfer(t)
            | Notification::MatchedSwap(t)
            | Notification::FinalizedSwap(t)
            | Notification::CancelledSwap(t) => Some(t),
            Notification::RegisteredWallet(_)
            | Notification::ConfirmedDeposit(_)
            | Notification::RequestedWithdrawal(_)
            | Notification::ConfirmedWithdrawal(_)
            | Notification::CheckpointCreated(_) => None,
        }
    }

    pub fn route(&self) -> Route {
        let token = match self {
            Notification::IncomingTransfer(t)
            | Notification::IncomingReceipt(t)
            | Notification::IncomingConfirmation(t)
            | Notification::TimeoutTransfer(t)
            | Notification::MatchedSwap(t)
            | Notification::FinalizedSwap(t)
            | Notification::CancelledSwap(t) => {
                return Route::Transfer {
                    sender_token: t.wallet.token,
                    recipient_token: t.recipient.token,
                }
            }
            Notification::RegisteredWallet(r) => Some(r.token),
            Notification::ConfirmedDeposit(c)
            | Notification::RequestedWithdrawal(c)
            | Notification::ConfirmedWithdrawal(c) => c.token,
            Notification::CheckpointCreated(records) => records.token,
        };
        token.map(Route::Token).unwrap_or(Route::Unroutable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use serde_json::json;

    const WALLET: &str = "00000000000000000000000000000000000000a1";

    fn event(value: Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }
    const TOKEN: &str = "0x0000000000000000000000000000000000000070";

    #[test]
    fn wallet_stream_names_round_trip() {
        let wallet = parse_address(WALLET).unwrap();
        let stream = wallet_stream(&wallet);
        assert_eq!(stream, format!("wallet/{}", WALLET));
        assert_eq!(parse_wallet_stream(&stream).unwrap(), wallet);
        assert!(parse_wallet_stream("market/abc").is_err());
    }

    #[test]
    fn operations_encode_as_op_and_args() {
        let ack = serde_json::to_value(Operation::Ack { uuid: json!("u-1") }).unwrap();
        assert_eq!(ack, json!({"op": "ack", "args": {"uuid": "u-1"}}));
        let sub = serde_json::to_value(Operation::Subscribe {
            streams: vec!["wallet/ab".into()],
        })
        .unwrap();
        assert_eq!(sub, json!({"op": "subscribe", "args": {"streams": ["wallet/ab"]}}));
    }

    #[test]
    fn decodes_deposit_with_token_route() {
        let flat = event(json!({
            "type": "CONFIRMED_DEPOSIT",
            "token": TOKEN,
            "amount": "5",
            "eon_number": 2
        }));
        let n = Notification::from_event(flat).unwrap().unwrap();
        assert_eq!(n.kind(), "CONFIRMED_DEPOSIT");
        assert_eq!(n.route(), Route::Token(parse_address(TOKEN).unwrap()));
        match n {
            Notification::ConfirmedDeposit(d) => assert_eq!(d.amount, U256::from(5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_kinds_are_skipped() {
        let unknown = event(json!({"type": "SOMETHING_NEW"}));
        assert!(Notification::from_event(unknown).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let malformed = event(json!({"type": "MATCHED_SWAP", "id": "not a number"}));
        assert!(matches!(
            Notification::from_event(malformed),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn checkpoint_without_token_is_unroutable() {
        let checkpoint = event(json!({"type": "CHECKPOINT_CREATED", "merkle_proofs": []}));
        let n = Notification::from_event(checkpoint).unwrap().unwrap();
        assert_eq!(n.route(), Route::Unroutable);
        assert!(n.transfer().is_none());
    }

    #[test]
    fn nested_payload_is_accepted() {
        let nested = event(json!({
            "type": "CONFIRMED_WITHDRAWAL",
            "data": {"token": TOKEN, "amount": "3", "eon_number": 2}
        }));
        match Notification::from_event(nested).unwrap().unwrap() {
            Notification::ConfirmedWithdrawal(w) => {
                assert_eq!(w.amount, U256::from(3));
                assert_eq!(w.eon_number, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
