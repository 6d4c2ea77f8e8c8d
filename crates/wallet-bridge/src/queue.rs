//! HTTP client for the request queue server.

use crate::{
    config::BridgeConfig,
    error::BridgeError,
    types::{
        ApiResponse, BrowserTransaction, Connection, ConnectionStatus, SignRequest, SignResponse,
        TransactionResponse,
    },
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use url::Url;

/// Header carrying the per-session token the queue server expects on every API call.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// The request queue as seen by the bridge.
#[async_trait]
pub trait Queue: fmt::Debug + Send + Sync {
    /// Reads the queue's view of the wallet connection.
    async fn connection(&self) -> Result<ConnectionStatus, BridgeError>;

    /// Publishes the wallet connection, `None` marks the wallet as disconnected.
    async fn set_connection(&self, connection: Option<Connection>) -> Result<(), BridgeError>;

    /// Reads the next pending transaction, if any.
    async fn next_transaction(&self) -> Result<Option<BrowserTransaction>, BridgeError>;

    /// Reads the next pending signing request, if any.
    async fn next_signing(&self) -> Result<Option<SignRequest>, BridgeError>;

    async fn respond_transaction(&self, response: &TransactionResponse)
    -> Result<(), BridgeError>;

    async fn respond_signing(&self, response: &SignResponse) -> Result<(), BridgeError>;
}

/// [`Queue`] implementation talking JSON over HTTP.
#[derive(Clone, Debug)]
pub struct QueueClient {
    client: reqwest::Client,
    api: Url,
}

impl QueueClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.session_token {
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| BridgeError::InvalidConfig("invalid session token".to_string()))?;
            value.set_sensitive(true);
            headers.insert(SESSION_TOKEN_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()?;
        let api = config
            .endpoint
            .join("api/")
            .map_err(|e| BridgeError::InvalidConfig(format!("invalid endpoint: {e}")))?;
        Ok(Self { client, api })
    }

    fn url(&self, path: &str) -> Result<Url, BridgeError> {
        self.api
            .join(path)
            .map_err(|e| BridgeError::InvalidConfig(format!("invalid path {path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, BridgeError> {
        let res = self.client.get(self.url(path)?).send().await?.error_for_status()?;
        let body = res.bytes().await?;
        trace!(target: "wallet_bridge::queue", path, len = body.len(), "GET");
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), BridgeError> {
        let res = self.client.post(self.url(path)?).json(body).send().await?.error_for_status()?;
        let body = res.bytes().await?;
        trace!(target: "wallet_bridge::queue", path, len = body.len(), "POST");
        if body.is_empty() {
            return Ok(());
        }
        match serde_json::from_slice::<ApiResponse<serde_json::Value>>(&body)? {
            ApiResponse::Ok { .. } => Ok(()),
            ApiResponse::Error { message } => Err(BridgeError::QueueRejected(
                message.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    /// Reads a pending request. An error envelope means the queue is empty.
    async fn next_request<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, BridgeError> {
        match self.get(path).await? {
            ApiResponse::Ok { data } => Ok(data),
            ApiResponse::Error { message } => {
                trace!(target: "wallet_bridge::queue", path, ?message, "nothing pending");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Queue for QueueClient {
    async fn connection(&self) -> Result<ConnectionStatus, BridgeError> {
        match self.get::<ConnectionStatus>("connection").await? {
            ApiResponse::Ok { data } => Ok(data.unwrap_or_default()),
            ApiResponse::Error { message } => Err(BridgeError::QueueRejected(
                message.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    async fn set_connection(&self, connection: Option<Connection>) -> Result<(), BridgeError> {
        self.post("connection", &connection).await
    }

    async fn next_transaction(&self) -> Result<Option<BrowserTransaction>, BridgeError> {
        self.next_request("transaction/request").await
    }

    async fn next_signing(&self) -> Result<Option<SignRequest>, BridgeError> {
        self.next_request("signing/request").await
    }

    async fn respond_transaction(
        &self,
        response: &TransactionResponse,
    ) -> Result<(), BridgeError> {
        self.post("transaction/response", response).await
    }

    async fn respond_signing(&self, response: &SignResponse) -> Result<(), BridgeError> {
        self.post("signing/response", response).await
    }
}
