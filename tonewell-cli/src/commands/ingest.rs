//! Ingestion command handlers
//!
//! The ingestor boundary: a score is validated, stored under the media
//! directory and only then handed to the queue as a fresh record.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use std::path::Path;
use tonewell_client::{EmailConfig, EmailNotifier};
use tonewell_core::domain::{Device, JobRecord, Owner};
use tonewell_core::score::{self, Validation};
use tonewell_queue::JobQueue;
use tracing::{info, warn};

const SUCCESS_SUBJECT: &str = "Tonewell Success Confirmation";
const ERROR_SUBJECT: &str = "Tonewell Error Confirmation";

/// Width of the stored `input_name` column
const MAX_NAME_CHARS: usize = 80;

/// Who gets told about the recording
#[derive(Debug, Args)]
#[group(required = true, multiple = true)]
pub struct OwnerArgs {
    /// Owner's mail address
    #[arg(long, conflicts_with_all = ["chat_user", "chat_channel"])]
    email: Option<String>,

    /// Owner's chat user id
    #[arg(long, requires = "chat_channel")]
    chat_user: Option<u64>,

    /// Chat channel the score was submitted in
    #[arg(long, requires = "chat_user")]
    chat_channel: Option<u64>,
}

impl OwnerArgs {
    fn into_owner(self) -> Result<Owner> {
        match (self.email, self.chat_user, self.chat_channel) {
            (Some(address), None, None) => Ok(Owner::Email { address }),
            (None, Some(user_id), Some(channel_id)) => Ok(Owner::Chat {
                user_id,
                channel_id,
            }),
            _ => bail!("Pass either --email or both --chat-user and --chat-channel"),
        }
    }
}

/// Prints the validation outcome of a score file
pub fn validate_file(file: &Path) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let validation = score::validate(&bytes);
    if !validation.is_ok() {
        bail!("{}: {}", file.display(), validation);
    }

    let seconds = score::duration(&bytes)?;
    println!(
        "{} {} ({}s)",
        "✓".green(),
        file.display().to_string().bold(),
        seconds
    );
    Ok(())
}

pub async fn enqueue(
    config: &crate::config::Config,
    device_id: &str,
    file: &Path,
    name: Option<String>,
    owner: OwnerArgs,
    confirm: bool,
) -> Result<()> {
    let device = Device::from_id(device_id)?;
    let owner = owner.into_owner()?;
    let name = match name {
        Some(name) => name,
        None => display_name(file)?,
    };
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mailer = if confirm {
        confirmation_mailer(&owner)?
    } else {
        None
    };

    let validation = score::validate(&bytes);
    if !validation.is_ok() {
        if let (Some(mailer), Owner::Email { address }) = (&mailer, &owner) {
            mailer
                .send(address, ERROR_SUBJECT, &rejection_message(validation))
                .await?;
        }
        bail!("{} rejected: {}", name, validation);
    }

    let media_path = config.media_path()?;
    let queue = config.open_queue().await?;
    let outcome = ingest(&queue, media_path, device, owner, name, &bytes).await;
    queue.close().await;
    let (job, minutes) = outcome?;

    println!(
        "{} Enqueued {} on {}",
        "✓".green(),
        job.id.to_string().cyan(),
        device.name.bold()
    );
    println!("  Estimated wait: {} min", minutes);

    if let (Some(mailer), Owner::Email { address }) = (&mailer, &job.owner) {
        mailer
            .send(
                address,
                SUCCESS_SUBJECT,
                &confirmation_message(&job.input_name, device, minutes),
            )
            .await?;
    }

    Ok(())
}

/// Stores the score and enqueues a job for it, returning the job and the
/// estimated wait in minutes including the new job
///
/// `bytes` must already have passed validation.
pub async fn ingest(
    queue: &dyn JobQueue,
    media_path: &Path,
    device: &Device,
    owner: Owner,
    name: String,
    bytes: &[u8],
) -> Result<(JobRecord, u32)> {
    let seconds = score::duration(bytes)?;
    let name: String = name.chars().take(MAX_NAME_CHARS).collect();
    let job = JobRecord::new(device, owner, name, seconds);

    let stored = media_path.join(&job.input_ref);
    tokio::fs::write(&stored, bytes)
        .await
        .with_context(|| format!("Failed to store score at {}", stored.display()))?;

    if let Err(e) = queue.enqueue(&job).await {
        if let Err(remove) = tokio::fs::remove_file(&stored).await {
            warn!("Failed to remove {}: {}", stored.display(), remove);
        }
        return Err(e).context("Failed to enqueue job");
    }
    info!("Enqueued job {} for {} ({}s)", job.id, device.id, seconds);

    let minutes = queue.estimate_wait(device.id).await?;
    Ok((job, minutes))
}

fn confirmation_mailer(owner: &Owner) -> Result<Option<EmailNotifier>> {
    match owner {
        Owner::Email { .. } => {
            let config = EmailConfig::from_env()?;
            Ok(Some(EmailNotifier::new(&config)?))
        }
        Owner::Chat { .. } => {
            println!(
                "{}",
                "Confirmations are only mailed; chat owners are not notified.".yellow()
            );
            Ok(None)
        }
    }
}

fn display_name(file: &Path) -> Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", file.display()))
}

fn confirmation_message(name: &str, device: &Device, minutes: u32) -> String {
    format!(
        "Your score \"{}\" looks good and is slated to be recorded on a {}! \
         Expect an email in about {} minutes...",
        name, device.name, minutes
    )
}

fn rejection_message(validation: Validation) -> String {
    format!(
        "Sorry but I could not process your score because \"{}\"",
        validation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonewell_core::domain::JobStatus;
    use tonewell_core::test_support::single_note_score;
    use tonewell_queue::MemoryJobQueue;

    fn email_owner() -> Owner {
        Owner::Email {
            address: "foo@bar.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_stores_score_and_enqueues() {
        let media = tempfile::tempdir().unwrap();
        let queue = MemoryJobQueue::new();
        let device = Device::from_id("nullsynth").unwrap();
        let bytes = single_note_score(120);

        let (job, minutes) = ingest(
            &queue,
            media.path(),
            device,
            email_owner(),
            "canyon.mid".to_string(),
            &bytes,
        )
        .await
        .unwrap();

        assert_eq!(job.input_duration, 120);
        assert_eq!(job.status, JobStatus::New);
        // 120s * 1.1 = 2.2 minutes
        assert_eq!(minutes, 3);

        let stored = std::fs::read(media.path().join(&job.input_ref)).unwrap();
        assert_eq!(stored, bytes);

        let front = queue.peek_front("nullsynth").await.unwrap().unwrap();
        assert_eq!(front.id, job.id);
    }

    #[tokio::test]
    async fn test_long_names_are_truncated() {
        let media = tempfile::tempdir().unwrap();
        let queue = MemoryJobQueue::new();
        let device = Device::from_id("nullsynth").unwrap();

        let (job, _) = ingest(
            &queue,
            media.path(),
            device,
            email_owner(),
            "é".repeat(200),
            &single_note_score(10),
        )
        .await
        .unwrap();

        assert_eq!(job.input_name.chars().count(), MAX_NAME_CHARS);
    }

    #[tokio::test]
    async fn test_estimate_includes_earlier_jobs() {
        let media = tempfile::tempdir().unwrap();
        let queue = MemoryJobQueue::new();
        let device = Device::from_id("nullsynth").unwrap();

        for _ in 0..2 {
            ingest(
                &queue,
                media.path(),
                device,
                email_owner(),
                "canyon.mid".to_string(),
                &single_note_score(300),
            )
            .await
            .unwrap();
        }

        // 600s * 1.1 = 11 minutes
        assert_eq!(queue.estimate_wait("nullsynth").await.unwrap(), 11);
    }

    #[test]
    fn test_owner_args() {
        let email = OwnerArgs {
            email: Some("foo@bar.com".to_string()),
            chat_user: None,
            chat_channel: None,
        };
        assert_eq!(email.into_owner().unwrap(), email_owner());

        let chat = OwnerArgs {
            email: None,
            chat_user: Some(1),
            chat_channel: Some(2),
        };
        assert_eq!(
            chat.into_owner().unwrap(),
            Owner::Chat {
                user_id: 1,
                channel_id: 2
            }
        );

        let partial = OwnerArgs {
            email: None,
            chat_user: Some(1),
            chat_channel: None,
        };
        assert!(partial.into_owner().is_err());
    }

    #[test]
    fn test_messages() {
        let device = Device::from_id("sc55mk2").unwrap();
        assert_eq!(
            confirmation_message("canyon.mid", device, 4),
            "Your score \"canyon.mid\" looks good and is slated to be recorded on a \
             Roland SC-55mk2! Expect an email in about 4 minutes..."
        );
        assert_eq!(
            rejection_message(Validation::TooBig),
            "Sorry but I could not process your score because \"MIDI file too big >256 KiB\""
        );
    }

    #[test]
    fn test_display_name_uses_file_name() {
        assert_eq!(
            display_name(Path::new("/tmp/scores/canyon.mid")).unwrap(),
            "canyon.mid"
        );
    }

    #[test]
    fn test_validate_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.mid");
        std::fs::write(&file, b"not a score").unwrap();

        let err = validate_file(&file).unwrap_err();
        assert!(err.to_string().contains("could not be parsed"));
    }
}
