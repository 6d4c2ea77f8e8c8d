//! Types exchanged with the request queue server.

use crate::chain::parse_chain_id;
use alloy_primitives::{Address, Bytes, ChainId, TxHash};
use alloy_rpc_types::TransactionRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope wrapping every answer of the queue server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Ok { data: Option<T> },
    Error { message: Option<String> },
}

/// A wallet connection as pushed to the queue: `[account, chainId]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection(pub Address, pub ChainId);

impl Connection {
    pub fn new(address: Address, chain_id: ChainId) -> Self {
        Self(address, chain_id)
    }
}

/// The queue's view of the wallet connection.
///
/// Accepts `null`, `[account, chainId]`, or `{connected, account?, chainId?}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub account: Option<Address>,
    pub chain_id: Option<ChainId>,
}

impl ConnectionStatus {
    /// Returns `true` if the queue's view differs from the given local connection.
    pub fn differs_from(&self, connection: &Connection) -> bool {
        // `Address` equality is byte-wise, so checksummed and lowercase forms compare equal.
        !self.connected || self.account != Some(connection.0) || self.chain_id != Some(connection.1)
    }
}

impl From<Option<Connection>> for ConnectionStatus {
    fn from(connection: Option<Connection>) -> Self {
        match connection {
            Some(Connection(account, chain_id)) => {
                Self { connected: true, account: Some(account), chain_id: Some(chain_id) }
            }
            None => Self::default(),
        }
    }
}

impl TryFrom<serde_json::Value> for ConnectionStatus {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        let parse_account = |value: Option<&Value>| match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                s.parse::<Address>().map(Some).map_err(|e| format!("invalid account {s:?}: {e}"))
            }
            Some(other) => Err(format!("invalid account {other}")),
        };

        match &value {
            Value::Null => Ok(Self::default()),
            Value::Array(items) if items.len() == 2 => {
                let account = parse_account(items.first())?;
                let chain_id = parse_chain_id(&items[1]);
                Ok(Self { connected: account.is_some() && chain_id.is_some(), account, chain_id })
            }
            Value::Object(map) => {
                let account = parse_account(map.get("account").or_else(|| map.get("address")))?;
                let chain_id = map
                    .get("chainId")
                    .or_else(|| map.get("chain_id"))
                    .and_then(parse_chain_id);
                let connected = map
                    .get("connected")
                    .and_then(Value::as_bool)
                    .unwrap_or(account.is_some() && chain_id.is_some());
                Ok(Self { connected, account, chain_id })
            }
            other => Err(format!("unexpected connection state: {other}")),
        }
    }
}

/// A transaction waiting to be signed and sent by the wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrowserTransaction {
    pub id: String,
    #[serde(flatten)]
    pub request: TransactionRequest,
    /// Alternative spelling of the chain id used by some producers.
    #[serde(default, rename = "chain_id", skip_serializing_if = "Option::is_none")]
    pub alt_chain_id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<serde_json::Value>,
}

impl BrowserTransaction {
    pub fn new(id: impl Into<String>, request: TransactionRequest) -> Self {
        Self { id: id.into(), request, alt_chain_id: None, network: None }
    }

    /// The chain the transaction must be sent on, if the request names one.
    pub fn chain_id(&self) -> Option<ChainId> {
        self.request
            .chain_id
            .or_else(|| self.alt_chain_id.as_ref().and_then(parse_chain_id))
            .or_else(|| self.network.as_ref().and_then(parse_chain_id))
    }
}

/// Kind of signature the wallet is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignType {
    /// `personal_sign`
    PersonalSign,
    /// `eth_signTypedData_v4`
    SignTypedDataV4,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPayload {
    pub message: String,
    pub address: Address,
}

/// A message waiting to be signed by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    pub id: String,
    #[serde(rename = "signType")]
    pub sign_type: SignType,
    pub request: SignPayload,
}

/// Transaction outcome reported back to the queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: String,
    pub hash: Option<TxHash>,
    pub error: Option<String>,
}

/// Signing outcome reported back to the queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    pub id: String,
    pub signature: Option<Bytes>,
    pub error: Option<String>,
}

/// The two queues a request can come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Transaction,
    Signing,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Signing => "signing",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request fetched from the queue.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingRequest {
    Transaction(BrowserTransaction),
    Signing(SignRequest),
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        match self {
            Self::Transaction(tx) => &tx.id,
            Self::Signing(req) => &req.id,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Transaction(_) => RequestKind::Transaction,
            Self::Signing(_) => RequestKind::Signing,
        }
    }
}

/// Receipt of an included transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    /// `true` if execution succeeded.
    pub status: bool,
}

/// Local record of how the last request ended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub request_id: String,
    pub hash: Option<TxHash>,
    pub signature: Option<Bytes>,
    pub receipt: Option<TxReceipt>,
    pub error: Option<String>,
}

impl OutcomeRecord {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), ..Default::default() }
    }
}
