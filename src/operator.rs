//! REST access to the operator. Failures surface to the caller as they are,
//! retrying is left to whoever drives the client.

use crate::eon::EonRecords;
use crate::error::{OperatorError, OperatorResult};
use crate::serde_helpers::address;
use crate::wallet::Registration;
use async_trait::async_trait;
use ethers::types::Address;
use log::debug;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait OperatorApi: Send + Sync {
    async fn current_eon(&self) -> OperatorResult<u64>;

    async fn wallet_data(
        &self,
        wallet: Address,
        token: Address,
        eon_number: u64,
    ) -> OperatorResult<EonRecords>;

    /// `None` when the wallet is not registered for `token`.
    async fn registration_data(
        &self,
        wallet: Address,
        token: Address,
    ) -> OperatorResult<Option<Registration>>;

    async fn post_admission(&self, request: &AdmissionRequest) -> OperatorResult<Value>;

    async fn submit_transfer(&self, transfer: &Value) -> OperatorResult<Value>;

    async fn submit_swap(&self, swap: &Value) -> OperatorResult<Value>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    #[serde(with = "address")]
    pub token: Address,
    #[serde(with = "address")]
    pub wallet: Address,
    /// Signature over the wallet's initial state checksum
    pub authorization: String,
}

#[derive(Deserialize)]
struct Audit {
    latest: LatestEon,
}

#[derive(Deserialize)]
struct LatestEon {
    eon_number: u64,
}

#[derive(Clone)]
pub struct HttpOperator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOperator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str) -> OperatorResult<Response> {
        let url = self.url(path);
        debug!("(operator) GET {}", url);
        Ok(self.client.get(&url).send().await?)
    }

    async fn post(&self, path: &str, body: &(impl Serialize + Sync)) -> OperatorResult<Value> {
        let url = self.url(path);
        debug!("(operator) POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        let bytes = expect_success(response)?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn expect_success(response: Response) -> OperatorResult<Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(OperatorError::Status {
            status,
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> OperatorResult<T> {
    let bytes = expect_success(response)?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl OperatorApi for HttpOperator {
    async fn current_eon(&self) -> OperatorResult<u64> {
        let audit: Audit = decode(self.get("audit/").await?).await?;
        Ok(audit.latest.eon_number)
    }

    async fn wallet_data(
        &self,
        wallet: Address,
        token: Address,
        eon_number: u64,
    ) -> OperatorResult<EonRecords> {
        let path = format!("audit/{}/{:#x}/{:#x}/", eon_number, token, wallet);
        decode(self.get(&path).await?).await
    }

    async fn registration_data(
        &self,
        wallet: Address,
        token: Address,
    ) -> OperatorResult<Option<Registration>> {
        let path = format!("audit/{:#x}/{:#x}/registration/", token, wallet);
        let response = self.get(&path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn post_admission(&self, request: &AdmissionRequest) -> OperatorResult<Value> {
        self.post("admission/", request).await
    }

    async fn submit_transfer(&self, transfer: &Value) -> OperatorResult<Value> {
        self.post("transfer/", transfer).await
    }

    async fn submit_swap(&self, swap: &Value) -> OperatorResult<Value> {
        self.post("swap/", swap).await
    }
}
