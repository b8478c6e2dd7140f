//! Operator command handlers

use anyhow::{Context, Result, bail};
use colored::*;
use std::io::Read;
use tonewell_client::{EmailConfig, EmailNotifier};
use tonewell_core::domain::Device;
use tonewell_queue::{JobQueue, db};

use crate::config::Config;

const ALERT_SUBJECT: &str = "Tonewell System Alert";

pub async fn migrate(config: &Config) -> Result<()> {
    let queue = config.open_queue().await?;
    let result = db::run_migrations(queue.pool())
        .await
        .context("Failed to run migrations");
    queue.close().await;
    result?;

    println!("{} Schema is up to date", "✓".green());
    Ok(())
}

pub async fn estimate(config: &Config, device: &str) -> Result<()> {
    let device = Device::from_id(device)?;
    let queue = config.open_queue().await?;
    let minutes = queue.estimate_wait(device.id).await;
    queue.close().await;
    let minutes = minutes?;

    println!("{}: about {} min", device.name.bold(), minutes);
    Ok(())
}

/// Mails whatever arrives on stdin, for supervisor failure hooks
pub async fn alert(to: &str) -> Result<()> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read alert from stdin")?;
    if body.trim().is_empty() {
        bail!("Refusing to send an empty alert");
    }

    let notifier = EmailNotifier::new(&EmailConfig::from_env()?)?;
    notifier.send(to, ALERT_SUBJECT, &body).await?;
    Ok(())
}
