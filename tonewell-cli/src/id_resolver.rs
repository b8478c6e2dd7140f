//! ID resolver module
//!
//! Lets users name a job by a short, unambiguous prefix of its id. Jobs are
//! only listable per device, so resolving a prefix scans every known device.

use anyhow::{Context, Result, anyhow};
use tonewell_core::domain::{Device, JobRecord};
use tonewell_queue::JobQueue;

use crate::types::IdOrPrefix;

/// Finds the job named by `id_or_prefix`
///
/// # Errors
/// Returns an error if no job matches, if more than one does, or if the
/// store cannot be read.
pub async fn resolve_job(queue: &dyn JobQueue, id_or_prefix: &IdOrPrefix) -> Result<JobRecord> {
    if let Some(id) = id_or_prefix.as_uuid() {
        return queue
            .get(id)
            .await
            .context("Failed to fetch job")?
            .ok_or_else(|| anyhow!("No job found with ID {}", id));
    }

    let mut candidates = Vec::new();
    for device in Device::all() {
        let jobs = queue
            .list(device.id)
            .await
            .with_context(|| format!("Failed to list jobs for {}", device.id))?;
        candidates.extend(jobs);
    }

    pick_unique(candidates, id_or_prefix)
}

fn pick_unique(candidates: Vec<JobRecord>, id_or_prefix: &IdOrPrefix) -> Result<JobRecord> {
    let mut matches: Vec<JobRecord> = candidates
        .into_iter()
        .filter(|job| id_or_prefix.matches(&job.id))
        .collect();

    match matches.len() {
        0 => Err(anyhow!(
            "No job found with ID starting with '{}'",
            id_or_prefix
        )),
        1 => Ok(matches.remove(0)),
        _ => {
            let ids: Vec<String> = matches.iter().map(|j| j.id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
