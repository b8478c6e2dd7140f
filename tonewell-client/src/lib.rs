//! Tonewell Clients
//!
//! Outbound collaborators of the worker and the CLI:
//! - [`Uploader`]: publishes an encoded recording and returns its URL
//! - [`Notifier`]: tells the owner of a job where to find it
//!
//! # Example
//!
//! ```no_run
//! use tonewell_client::{AzureBlobUploader, BlobConfig, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let uploader = AzureBlobUploader::new(BlobConfig::from_env()?)?;
//!     let url = uploader
//!         .put("myaccount", "recordings", "take.flac", std::fs::read("take.flac")?)
//!         .await?;
//!     println!("Published at {}", url);
//!     Ok(())
//! }
//! ```

mod blob;
pub mod error;
mod notify;

// Re-export commonly used types
pub use blob::{AzureBlobUploader, BlobConfig, Uploader};
pub use error::{MissingVar, NotifyError, UploadError};
pub use notify::{EmailConfig, EmailNotifier, Notifier, READY_SUBJECT};
