//! Configuration module
//!
//! Settings shared by the CLI commands. Each is only required by the
//! commands that touch the resource it names.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tonewell_queue::PgJobQueue;

/// CLI configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Postgres connection string
    pub database_url: Option<String>,

    /// Directory submitted scores are stored in
    pub media_path: Option<PathBuf>,
}

impl Config {
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is not set (pass --database-url or set the variable)")
    }

    pub fn media_path(&self) -> Result<&Path> {
        let path = self
            .media_path
            .as_deref()
            .context("MEDIA_PATH is not set (pass --media-path or set the variable)")?;

        if !path.is_dir() {
            anyhow::bail!("media path {} is not a directory", path.display());
        }
        Ok(path)
    }

    /// Connects to the job store
    pub async fn open_queue(&self) -> Result<PgJobQueue> {
        let queue = PgJobQueue::open(self.database_url()?)
            .await
            .context("Failed to connect to the job store")?;
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_url_is_reported() {
        let config = Config::default();
        let err = config.database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_media_path_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("score.mid");
        std::fs::write(&file, b"").unwrap();

        let config = Config {
            media_path: Some(file),
            ..Default::default()
        };
        assert!(config.media_path().is_err());

        let config = Config {
            media_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(config.media_path().unwrap(), dir.path());
    }
}
