//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::device::Device;
use super::owner::Owner;

/// A recording job
///
/// Created by the ingestor, mutated only by the worker that owns the job's
/// device, never deleted. `status` is the single source of truth when a job
/// is resumed after a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    /// Reserved; dequeue order ignores it.
    pub priority: i32,
    /// Resumption attempts at the current status.
    pub retries: u32,
    /// Device id; also the partition the job is queued in.
    pub device: String,
    pub owner: Owner,
    /// File name of the stored score under the media directory.
    pub input_ref: String,
    /// File name the submitter used.
    pub input_name: String,
    /// Playing time of the score in whole seconds (rounded up).
    pub input_duration: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobRecord {
    /// Builds a fresh record ready to be enqueued
    ///
    /// The stored score is addressed by the job id, so `input_ref` is derived
    /// from it. The caller is responsible for writing the score there.
    pub fn new(
        device: &Device,
        owner: Owner,
        input_name: impl Into<String>,
        input_duration: u32,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        Self {
            id,
            status: JobStatus::New,
            priority: 0,
            retries: 0,
            device: device.id.to_string(),
            owner,
            input_ref: format!("{}.mid", id),
            input_name: input_name.into(),
            input_duration,
            created_at: now,
            updated_at: now,
        }
    }

    /// The ordering domain this job belongs to
    pub fn partition_key(&self) -> &str {
        &self.device
    }
}

/// Job status
///
/// Jobs move strictly forward through
/// `New -> Recording -> Encoding -> Uploading -> Notifying -> Done`;
/// any live status may jump to `Failed` once the retry ceiling is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Recording,
    Encoding,
    Uploading,
    Notifying,
    Done,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::New,
        JobStatus::Recording,
        JobStatus::Encoding,
        JobStatus::Uploading,
        JobStatus::Notifying,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    /// Persisted representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Recording => "recording",
            JobStatus::Encoding => "encoding",
            JobStatus::Uploading => "uploading",
            JobStatus::Notifying => "notifying",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// `Done` and `Failed` are never left again
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Statuses whose score still has to be played on the device
    pub const fn is_waiting(&self) -> bool {
        matches!(self, JobStatus::New | JobStatus::Recording)
    }

    /// The status a successful stage advances to
    pub const fn successor(&self) -> Option<JobStatus> {
        match self {
            JobStatus::New => Some(JobStatus::Recording),
            JobStatus::Recording => Some(JobStatus::Encoding),
            JobStatus::Encoding => Some(JobStatus::Uploading),
            JobStatus::Uploading => Some(JobStatus::Notifying),
            JobStatus::Notifying => Some(JobStatus::Done),
            JobStatus::Done | JobStatus::Failed => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Estimated wait in minutes for `total_seconds` of queued playing time
///
/// Adds 10% for encoding and uploading and rounds up:
/// `ceil(total_seconds * 1.1 / 60)`, evaluated in integers.
pub fn estimate_wait_minutes(total_seconds: u64) -> u32 {
    let minutes = (total_seconds * 11).div_ceil(600);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_chain_reaches_done() {
        let mut status = JobStatus::New;
        let mut visited = vec![status];
        while let Some(next) = status.successor() {
            visited.push(next);
            status = next;
        }

        assert_eq!(
            visited,
            vec![
                JobStatus::New,
                JobStatus::Recording,
                JobStatus::Encoding,
                JobStatus::Uploading,
                JobStatus::Notifying,
                JobStatus::Done,
            ]
        );
        assert_eq!(JobStatus::Failed.successor(), None);
    }

    #[test]
    fn test_terminal_statuses() {
        for status in JobStatus::ALL {
            let expected = matches!(status, JobStatus::Done | JobStatus::Failed);
            assert_eq!(status.is_terminal(), expected, "{}", status);
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("queued".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serde_uses_persisted_names() {
        let json = serde_json::to_string(&JobStatus::Notifying).unwrap();
        assert_eq!(json, "\"notifying\"");
    }

    #[test]
    fn test_estimate_wait_minutes() {
        assert_eq!(estimate_wait_minutes(0), 0);
        assert_eq!(estimate_wait_minutes(1), 1);
        assert_eq!(estimate_wait_minutes(60), 2);
        assert_eq!(estimate_wait_minutes(180), 4);
        // 600s * 1.1 is exactly 11 minutes; float arithmetic would round to 12
        assert_eq!(estimate_wait_minutes(600), 11);
    }

    #[test]
    fn test_new_record_defaults() {
        let device = Device::from_id("nullsynth").unwrap();
        let owner = Owner::Email {
            address: "foo@bar.com".to_string(),
        };
        let job = JobRecord::new(device, owner, "canyon.mid", 300);

        assert_eq!(job.status, JobStatus::New);
        assert_eq!(job.retries, 0);
        assert_eq!(job.priority, 0);
        assert_eq!(job.partition_key(), "nullsynth");
        assert_eq!(job.input_ref, format!("{}.mid", job.id));
        assert_eq!(job.input_duration, 300);
    }
}
