use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::core::block::Block;
use crate::core::crypto::Address;
use crate::core::transaction::Transaction;
use crate::core::view::{AccountInfo, AccountView, ChainView, HeadInfo, PendingSource, ViewError};

/// Per-request deadline for peer calls. A slow peer surfaces as
/// `Unavailable`; nothing here retries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body shared by all services.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: String,
}

/// Maps a non-success response to a `ViewError`, reading the body's `kind`
/// discriminator. 409 is the linkage race.
async fn rejection(response: reqwest::Response) -> ViewError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.unwrap_or(ErrorBody {
        error: format!("status {}", status),
        kind: String::new(),
    });

    if status == reqwest::StatusCode::CONFLICT {
        ViewError::Linkage(body.error)
    } else if status.is_server_error() {
        ViewError::Unavailable(body.error)
    } else {
        ViewError::Rejected {
            kind: body.kind,
            message: body.error,
        }
    }
}

fn unreachable_peer(e: reqwest::Error) -> ViewError {
    if e.is_timeout() {
        ViewError::Unavailable(format!("peer timed out: {}", e))
    } else {
        ViewError::Unavailable(format!("peer unreachable: {}", e))
    }
}

/// Client for the Blockchain service.
#[derive(Debug, Clone)]
pub struct BlockchainClient {
    base_url: String,
    http: reqwest::Client,
}

impl BlockchainClient {
    pub fn new(base_url: &str) -> Self {
        BlockchainClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ViewError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(unreachable_peer)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ViewError::Unavailable(format!("bad response body: {}", e)))
    }

    pub async fn balance_of(
        &self,
        address: &Address,
        at_height: Option<u64>,
    ) -> Result<u64, ViewError> {
        #[derive(Deserialize)]
        struct BalanceBody {
            balance: u64,
        }

        let path = match at_height {
            Some(height) => format!("/blockchain/balance/{}?height={}", address, height),
            None => format!("/blockchain/balance/{}", address),
        };

        let body: BalanceBody = self.get_json(&path).await?;
        Ok(body.balance)
    }
}

#[async_trait]
impl AccountView for BlockchainClient {
    async fn account_info(&self, address: &Address) -> Result<AccountInfo, ViewError> {
        self.get_json(&format!("/blockchain/accounts/{}", address))
            .await
    }
}

#[async_trait]
impl ChainView for BlockchainClient {
    async fn head(&self) -> Result<HeadInfo, ViewError> {
        self.get_json("/blockchain/head").await
    }

    async fn submit_block(&self, block: &Block) -> Result<(), ViewError> {
        let response = self
            .http
            .post(format!("{}/blockchain/blocks", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(block)
            .send()
            .await
            .map_err(unreachable_peer)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        Ok(())
    }
}

/// Receipt returned by the Transaction service for a submitted transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub status: String,
    pub id: String,
}

/// Client for the Transaction service.
#[derive(Debug, Clone)]
pub struct TransactionClient {
    base_url: String,
    http: reqwest::Client,
}

impl TransactionClient {
    pub fn new(base_url: &str) -> Self {
        TransactionClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn submit(&self, tx: &Transaction) -> Result<SubmitReceipt, ViewError> {
        let response = self
            .http
            .post(format!("{}/transaction/send", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(tx)
            .send()
            .await
            .map_err(unreachable_peer)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ViewError::Unavailable(format!("bad response body: {}", e)))
    }

    async fn get_pending(&self, query: &str) -> Result<Vec<Transaction>, ViewError> {
        #[derive(Deserialize)]
        struct PendingBody {
            transactions: Vec<Transaction>,
        }

        let response = self
            .http
            .get(format!("{}/transaction/pending{}", self.base_url, query))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(unreachable_peer)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body: PendingBody = response
            .json()
            .await
            .map_err(|e| ViewError::Unavailable(format!("bad response body: {}", e)))?;

        Ok(body.transactions)
    }
}

#[async_trait]
impl PendingSource for TransactionClient {
    async fn select(&self, max: usize) -> Result<Vec<Transaction>, ViewError> {
        self.get_pending(&format!("?limit={}", max)).await
    }

    async fn evict_mined(&self, block: &Block) -> Result<usize, ViewError> {
        #[derive(Deserialize)]
        struct EvictBody {
            evicted: usize,
        }

        let response = self
            .http
            .post(format!("{}/transaction/evict-mined", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(block)
            .send()
            .await
            .map_err(unreachable_peer)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body: EvictBody = response
            .json()
            .await
            .map_err(|e| ViewError::Unavailable(format!("bad response body: {}", e)))?;

        Ok(body.evicted)
    }

    async fn pending_for(&self, sender: &Address) -> Result<Vec<Transaction>, ViewError> {
        self.get_pending(&format!("?sender={}", sender)).await
    }
}
