//! HTTP gateway to the CCRV provider.
//!
//! Translates transport and HTTP-level failures into the crate error
//! taxonomy so the orchestrator never sees raw `reqwest` errors. The
//! gateway is stateless; all transaction state lives in the store.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::provider::payload::{ProviderAck, ProviderResultPayload, ResultEnvelope, SearchRequest};

/// Header carrying the transaction id on fetch-result requests.
const TRANSACTION_ID_HEADER: &str = "transaction-id";

/// Header carrying the API key on all provider requests.
const API_KEY_HEADER: &str = "x-api-key";

/// Typed client for the provider's initiate-search and fetch-result
/// endpoints.
///
/// Implementations must be side-effect-free on `fetch_result`: the provider
/// treats it as a query, so callers may poll without limit.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Submit a verification search and obtain a transaction id.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when the provider rejects the payload shape,
    /// [`Error::ProviderRejected`] for business-rule rejections, and
    /// [`Error::ProviderUnavailable`] for transport or 5xx failures.
    async fn submit(&self, request: &SearchRequest) -> Result<ProviderAck>;

    /// Fetch the current result for a previously-issued transaction id.
    ///
    /// # Errors
    ///
    /// [`Error::TransactionNotFound`] when the provider has no record of
    /// the id, [`Error::ProviderUnavailable`] for transport or 5xx failures
    /// or an unparseable response body.
    async fn fetch_result(&self, transaction_id: &str) -> Result<ProviderResultPayload>;
}

/// Production gateway backed by `reqwest`.
pub struct HttpProviderGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProviderGateway {
    /// Build a gateway from provider configuration.
    ///
    /// The request timeout bounds every provider call, so `initiate` and
    /// `poll` cannot block indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

/// Extract a provider error message from a non-success response body.
async fn response_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => format!("{status}: {body}"),
        _ => status.to_string(),
    }
}

#[async_trait]
impl ProviderGateway for HttpProviderGateway {
    async fn submit(&self, request: &SearchRequest) -> Result<ProviderAck> {
        debug!("Submitting CCRV search to {}", self.base_url);

        let response = self
            .with_auth(self.http.post(self.url("ccrv/search")).json(request))
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("submit failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let ack: ProviderAck = response.json().await.map_err(|e| {
                Error::ProviderUnavailable(format!("malformed submit response: {e}"))
            })?;
            if ack.transaction_id.trim().is_empty() {
                return Err(Error::ProviderUnavailable(
                    "submit response missing transaction id".to_string(),
                ));
            }
            debug!(
                "Provider accepted search, transaction {} ({:?})",
                ack.transaction_id, ack.ccrv_status
            );
            Ok(ack)
        } else if status == StatusCode::BAD_REQUEST {
            Err(Error::InvalidInput(response_message(response).await))
        } else if status.is_client_error() {
            Err(Error::ProviderRejected(response_message(response).await))
        } else {
            Err(Error::ProviderUnavailable(response_message(response).await))
        }
    }

    async fn fetch_result(&self, transaction_id: &str) -> Result<ProviderResultPayload> {
        let response = self
            .with_auth(
                self.http
                    .get(self.url("ccrv/result"))
                    .header(TRANSACTION_ID_HEADER, transaction_id),
            )
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("fetch-result failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::TransactionNotFound(transaction_id.to_string()));
        }
        if !status.is_success() {
            return Err(Error::ProviderUnavailable(response_message(response).await));
        }

        let envelope: ResultEnvelope = response.json().await.map_err(|e| {
            Error::ProviderUnavailable(format!("malformed result response: {e}"))
        })?;

        // A result body the parser cannot classify is a provider contract
        // violation; surface it as transient so the caller retries and the
        // stored record stays untouched.
        envelope.data.normalize().map_err(|e| {
            warn!(
                "Unrecognized fetch-result payload for {}: {}",
                transaction_id, e
            );
            Error::ProviderUnavailable(format!("unrecognized result payload: {e}"))
        })
    }
}
