//! Recording publication
//!
//! Recordings are published as block blobs in Azure Storage. The worker
//! authenticates as a service principal (OAuth2 client credentials) and
//! needs nothing else from the Azure SDK, so the two requests involved are
//! made directly.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{MissingVar, UploadError};

/// Storage REST API version sent with every blob request
const API_VERSION: &str = "2020-04-08";

const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Bound on each token request and each blob PUT
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Publishes finished recordings and reports where they ended up
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Stores `bytes` as `name` and returns its public URL
    ///
    /// Fails unless the store confirms the object was created.
    async fn put(
        &self,
        account: &str,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError>;

    /// URL an object stored by [`Uploader::put`] is reachable at
    fn locate(&self, account: &str, container: &str, name: &str) -> String;
}

/// Service principal credentials and endpoints for blob uploads
#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,

    /// Identity provider base URL
    pub authority: String,

    /// Replaces `https://{account}.blob.core.windows.net` when set
    pub endpoint: Option<String>,

    /// Per-request timeout, covering connect, send and the full response
    pub timeout: Duration,
}

impl BlobConfig {
    /// Reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`
    ///
    /// `AZURE_AUTHORITY_HOST` and `BLOB_ENDPOINT` optionally override the
    /// public endpoints; `BLOB_TIMEOUT_SECS` overrides the 60s request timeout.
    pub fn from_env() -> Result<Self, MissingVar> {
        let var = |name: &'static str| std::env::var(name).map_err(|_| MissingVar(name));

        Ok(Self {
            tenant_id: var("AZURE_TENANT_ID")?,
            client_id: var("AZURE_CLIENT_ID")?,
            client_secret: var("AZURE_CLIENT_SECRET")?,
            authority: std::env::var("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|_| DEFAULT_AUTHORITY.to_string()),
            endpoint: std::env::var("BLOB_ENDPOINT").ok(),
            timeout: std::env::var("BLOB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// [`Uploader`] for Azure Blob Storage
#[derive(Debug, Clone)]
pub struct AzureBlobUploader {
    config: BlobConfig,
    client: Client,
}

impl AzureBlobUploader {
    /// Create an uploader whose requests give up after `config.timeout`
    pub fn new(config: BlobConfig) -> Result<Self, UploadError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(config, client))
    }

    /// Create an uploader with a custom HTTP client
    ///
    /// `config.timeout` is ignored; the client's own settings apply.
    pub fn with_client(config: BlobConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn account_url(&self, account: &str) -> String {
        match &self.config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", account),
        }
    }

    /// Obtains a bearer token for the storage scope
    async fn token(&self) -> Result<String, UploadError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority.trim_end_matches('/'),
            self.config.tenant_id
        );

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", STORAGE_SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::TokenRejected {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UploadError::ParseError(format!("Failed to parse token response: {}", e)))?;

        debug!("Obtained storage access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl Uploader for AzureBlobUploader {
    async fn put(
        &self,
        account: &str,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let token = self.token().await?;
        let url = self.locate(account, container, name);
        let size = bytes.len();

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                chrono::Utc::now()
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            )
            .header("x-ms-blob-type", "BlockBlob")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::UploadFailed {
                status: status.as_u16(),
                message,
            });
        }

        info!("Uploaded {} bytes to {}", size, url);
        Ok(url)
    }

    fn locate(&self, account: &str, container: &str, name: &str) -> String {
        format!("{}/{}/{}", self.account_url(account), container, name)
    }
}
