//! Encoding of raw captures
//!
//! The capture holds all four input channels at 32 bits. Only the first two
//! carry the device's output; they are kept, normalised to -3 dBFS and
//! written as 24-bit FLAC.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use crate::config::EncoderConfig;
use crate::error::EncodeError;
use crate::process;

/// Turns a raw capture into the published format
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, raw: &Path, dest: &Path) -> Result<(), EncodeError>;
}

/// [`Encoder`] shelling out to SoX
pub struct SoxEncoder {
    config: EncoderConfig,
}

impl SoxEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Encoder for SoxEncoder {
    async fn encode(&self, raw: &Path, dest: &Path) -> Result<(), EncodeError> {
        if process::find_tool(&self.config.tool).is_none() {
            return Err(EncodeError::ToolMissing {
                tool: self.config.tool.clone(),
            });
        }

        info!("Encoding {} to {}", raw.display(), dest.display());

        let mut command = Command::new(&self.config.tool);
        command
            .arg(raw)
            .args(["-b", "24"])
            .arg(dest)
            .args(["remix", "1", "2"])
            .args(["norm", "-3"]);

        let output = tokio::time::timeout(
            self.config.timeout,
            command.kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| EncodeError::TimedOut {
            seconds: self.config.timeout.as_secs(),
        })??;

        if !output.status.success() {
            return Err(EncodeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Encoded {}", dest.display());
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn encoder(dir: &TempDir, body: &str, timeout: Duration) -> SoxEncoder {
        let path = dir.path().join("sox");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        SoxEncoder::new(EncoderConfig {
            tool: path.to_string_lossy().into_owned(),
            timeout,
        })
    }

    #[tokio::test]
    async fn test_encode_passes_sox_arguments() {
        let dir = TempDir::new().unwrap();
        // Copies input to output and records the argument list next to it
        let encoder = encoder(
            &dir,
            "cp \"$1\" \"$4\" && echo \"$@\" > \"$4.args\"",
            Duration::from_secs(10),
        );
        let raw = dir.path().join("job.wav");
        let flac = dir.path().join("job.flac");
        std::fs::write(&raw, b"pcm").unwrap();

        encoder.encode(&raw, &flac).await.unwrap();

        assert_eq!(std::fs::read(&flac).unwrap(), b"pcm");
        let args = std::fs::read_to_string(dir.path().join("job.flac.args")).unwrap();
        assert_eq!(
            args.trim(),
            format!(
                "{} -b 24 {} remix 1 2 norm -3",
                raw.display(),
                flac.display()
            )
        );
    }

    #[tokio::test]
    async fn test_encode_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let encoder = encoder(&dir, "echo 'bad header' >&2; exit 1", Duration::from_secs(10));

        let err = encoder
            .encode(&dir.path().join("a.wav"), &dir.path().join("a.flac"))
            .await
            .unwrap_err();

        assert!(matches!(err, EncodeError::Failed { ref stderr, .. } if stderr == "bad header"));
    }

    #[tokio::test]
    async fn test_encode_times_out() {
        let dir = TempDir::new().unwrap();
        let encoder = encoder(&dir, "exec sleep 30", Duration::from_millis(200));

        let err = encoder
            .encode(&dir.path().join("a.wav"), &dir.path().join("a.flac"))
            .await
            .unwrap_err();

        assert!(matches!(err, EncodeError::TimedOut { .. }));
    }
}
