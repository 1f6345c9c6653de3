//! DX Node Client - Receipt-Bearing HTTP Requests
//!
//! Wraps reqwest for all provider API interactions. Payment state rides
//! on headers: every authenticated request carries `X-DX-Address` (and
//! `X-DX-Signature` once a receipt exists), every successful query
//! response carries the superseding receipt in `X-DX-PleasePay`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::domain::receipt::Receipt;
use crate::error::{ChannelError, Result};
use crate::ports::node::{ChannelMetadata, NodeApi, QueryPayload, QueryReply, QueryRequest};

/// Header carrying the refreshed receipt on successful queries.
pub const RECEIPT_HEADER: &str = "X-DX-PleasePay";
/// Header identifying the payer on every authenticated request.
pub const ADDRESS_HEADER: &str = "X-DX-Address";
/// Header carrying the payer's signature over the last receipt.
pub const SIGNATURE_HEADER: &str = "X-DX-Signature";

/// Configuration for the node HTTP client.
#[derive(Debug, Clone)]
pub struct NodeClientConfig {
    /// Base URL of the provider node.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-alpha.dx.network".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the provider node's channel and query endpoints.
pub struct DxNodeClient {
    http: Client,
    config: NodeClientConfig,
}

impl DxNodeClient {
    pub fn new(config: NodeClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::Node(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn transport_err(e: reqwest::Error) -> ChannelError {
    ChannelError::Node(e.to_string())
}

#[async_trait]
impl NodeApi for DxNodeClient {
    async fn channel_metadata(&self) -> Result<ChannelMetadata> {
        let response = self
            .http
            .get(self.url("channel/metadata"))
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(ChannelError::Node(format!(
                "metadata endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ChannelError::Node(format!("malformed metadata: {e}")))
    }

    async fn last_receipt(&self, address: &str) -> Result<Option<Receipt>> {
        let response = self
            .http
            .get(self.url("channel/receipt"))
            .header(ADDRESS_HEADER, address)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(ChannelError::Node(format!(
                "receipt endpoint returned {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(transport_err)?;
        if body.is_empty() {
            // Zero usage so far.
            return Ok(None);
        }

        let receipt = serde_json::from_slice(&body)
            .map_err(|e| ChannelError::Node(format!("malformed receipt body: {e}")))?;
        Ok(Some(receipt))
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<QueryReply>> {
        let mut builder = self
            .http
            .get(self.url(&request.endpoint))
            .header(ADDRESS_HEADER, &request.address)
            .query(&[("model", request.model.as_str())])
            .query(&request.params);
        if let Some(signature) = &request.receipt_signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }

        let response = builder.send().await.map_err(transport_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Query rejected by node");
            return Ok(None);
        }

        // The receipt header is the provider's claim of what is now
        // owed; a response without it cannot be accounted for.
        let Some(header) = response.headers().get(RECEIPT_HEADER) else {
            warn!("Query response missing {RECEIPT_HEADER} header");
            return Ok(None);
        };
        let receipt: Receipt = header
            .to_str()
            .ok()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .ok_or_else(|| {
                ChannelError::Node(format!("malformed {RECEIPT_HEADER} header"))
            })?;

        let payload: QueryPayload = response
            .json()
            .await
            .map_err(|e| ChannelError::Node(format!("malformed query body: {e}")))?;

        Ok(Some(QueryReply { receipt, payload }))
    }

    async fn closing_signature(
        &self,
        address: &str,
        receipt_signature: Option<String>,
    ) -> Result<Vec<u8>> {
        let mut builder = self
            .http
            .get(self.url("channel/close"))
            .header(ADDRESS_HEADER, address);
        if let Some(signature) = receipt_signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }

        let response = builder.send().await.map_err(transport_err)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_err)?;

        if !status.is_success() {
            return Err(ChannelError::Node(format!(
                "close endpoint returned {status}: {body}"
            )));
        }

        // Body is the provider's settlement authorization as bare hex.
        alloy::hex::decode(body.trim())
            .map_err(|e| ChannelError::Node(format!("malformed closing signature: {e}")))
    }

    async fn is_synced(&self) -> bool {
        match self
            .http
            .get(self.url("semantic/status"))
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "Sync probe failed");
                false
            }
        }
    }
}
