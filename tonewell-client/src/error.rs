//! Error types for the outbound clients

use thiserror::Error;

/// Errors publishing a recording
#[derive(Debug, Error)]
pub enum UploadError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The identity provider refused the client credentials
    #[error("token request rejected (status {status}): {message}")]
    TokenRejected { status: u16, message: String },

    /// The blob service did not answer `201 Created`
    #[error("upload failed (status {status}): {message}")]
    UploadFailed { status: u16, message: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl UploadError {
    /// Check if the blob service or identity provider had a server-side fault
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed { status, .. } | Self::TokenRejected { status, .. } if *status >= 500
        )
    }
}

/// Errors telling an owner about their recording
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("mail transport failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// A required setting is absent from the environment
#[derive(Debug, Error)]
#[error("{0} environment variable not set")]
pub struct MissingVar(pub &'static str);
