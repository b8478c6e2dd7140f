//! Job command handlers
//!
//! Read-only views of the queue: listing a device's jobs and showing one
//! job in full.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use tonewell_core::domain::{Device, JobRecord, JobStatus};
use tonewell_queue::JobQueue;

use crate::config::Config;
use crate::id_resolver::resolve_job;
use crate::types::IdOrPrefix;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// List a device's jobs in queue order
    List {
        /// Device id
        device: String,

        /// Hide jobs that are done or failed
        #[arg(long)]
        pending: bool,
    },
    /// Show job details
    Show {
        /// Job ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let queue = config.open_queue().await?;

    let result = match command {
        JobCommands::List { device, pending } => list_jobs(&queue, &device, pending).await,
        JobCommands::Show { id } => show_job(&queue, &id).await,
    };

    queue.close().await;
    result
}

async fn list_jobs(queue: &dyn JobQueue, device: &str, pending: bool) -> Result<()> {
    let device = Device::from_id(device)?;
    let jobs: Vec<JobRecord> = queue
        .list(device.id)
        .await?
        .into_iter()
        .filter(|job| !pending || !job.status.is_terminal())
        .collect();

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} job(s) on {}:", jobs.len(), device.name).bold()
    );
    println!();
    for job in &jobs {
        print_job_summary(job);
    }

    Ok(())
}

async fn show_job(queue: &dyn JobQueue, id: &str) -> Result<()> {
    let job = resolve_job(queue, &IdOrPrefix::parse(id)?).await?;
    print_job_details(&job);
    Ok(())
}

fn print_job_summary(job: &JobRecord) {
    println!(
        "{} {} [{}]",
        "▸".cyan(),
        job.id.to_string().bold(),
        colorize_status(job.status)
    );
    println!("    Score:    {} ({}s)", job.input_name, job.input_duration);
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if job.retries > 0 {
        println!("    Retries:  {}", job.retries.to_string().yellow());
    }
    println!();
}

fn print_job_details(job: &JobRecord) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Status:      {}", colorize_status(job.status));
    println!("  Device:      {}", job.device);
    println!("  Owner:       {}", job.owner);
    println!("  Score:       {}", job.input_name);
    println!("  Stored as:   {}", job.input_ref.dimmed());
    println!("  Duration:    {}s", job.input_duration);
    println!("  Retries:     {}", job.retries);
    println!(
        "  Created:     {}",
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        job.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn colorize_status(status: JobStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        JobStatus::New => label.yellow(),
        JobStatus::Recording
        | JobStatus::Encoding
        | JobStatus::Uploading
        | JobStatus::Notifying => label.cyan(),
        JobStatus::Done => label.green(),
        JobStatus::Failed => label.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonewell_core::domain::Owner;
    use tonewell_queue::MemoryJobQueue;

    #[tokio::test]
    async fn test_list_and_show_against_memory_queue() {
        let queue = MemoryJobQueue::new();
        let device = Device::from_id("nullsynth").unwrap();
        let owner = Owner::Email {
            address: "foo@bar.com".to_string(),
        };
        let job = JobRecord::new(device, owner, "canyon.mid", 60);
        queue.enqueue(&job).await.unwrap();

        list_jobs(&queue, "nullsynth", false).await.unwrap();
        list_jobs(&queue, "nullsynth", true).await.unwrap();
        show_job(&queue, &job.id.to_string()[..8]).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_unknown_device() {
        let queue = MemoryJobQueue::new();
        assert!(list_jobs(&queue, "dx7", false).await.is_err());
    }

    #[test]
    fn test_every_status_has_a_colour() {
        for status in JobStatus::ALL {
            assert!(colorize_status(status).to_string().contains(status.as_str()));
        }
    }
}
