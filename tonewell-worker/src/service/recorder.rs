//! Recording orchestration
//!
//! A recording runs two processes that share no clock: the capture tool
//! records the device's audio input for a fixed time while the playback tool
//! sends the score to the device's sequencer port. They are started capture
//! first and then watched on a fixed poll interval until both are done.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tonewell_core::domain::Device;
use tonewell_core::score;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::error::RecordError;
use crate::process::{self, Monitored};

/// Produces a raw capture of a score played on a device
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Plays `score` on `device` and records the result to `dest`
    ///
    /// On success `dest` exists; whether it holds anything useful is for the
    /// caller to check.
    async fn record(&self, score: &Path, dest: &Path, device: &Device) -> Result<(), RecordError>;
}

/// [`Recorder`] driving ALSA's sequencer playback and PCM capture tools
pub struct RecordingOrchestrator {
    config: RecorderConfig,
}

impl RecordingOrchestrator {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    fn require_tools(&self) -> Result<(), RecordError> {
        for tool in [&self.config.capture_tool, &self.config.playback_tool] {
            if process::find_tool(tool).is_none() {
                return Err(RecordError::ToolMissing { tool: tool.clone() });
            }
        }
        Ok(())
    }

    /// Resolves the device's port name to a `client:port` address
    async fn sequencer_address(&self, device: &Device) -> Result<String, RecordError> {
        let (status, listing) =
            process::output(Command::new(&self.config.playback_tool).arg("-l")).await?;
        if !status.success() {
            return Err(RecordError::PlaybackFailed { status });
        }

        let matches: Vec<_> = process::parse_port_listing(&listing)
            .into_iter()
            .filter(|(_, name)| name.starts_with(device.sequencer_port))
            .collect();

        match matches.as_slice() {
            [(address, name)] => {
                debug!("Resolved sequencer port {} to {}", name, address);
                Ok(address.clone())
            }
            [] => Err(RecordError::PortNotFound {
                port: device.sequencer_port.to_string(),
            }),
            _ => Err(RecordError::AmbiguousPort {
                port: device.sequencer_port.to_string(),
                matches: matches.into_iter().map(|(_, name)| name).collect(),
            }),
        }
    }

    /// Puts the device into its power-on state and lets it settle
    async fn reset(&self, device: &Device, address: &str, dest: &Path) -> Result<(), RecordError> {
        let reset_path = dest.with_extension("reset.mid");
        tokio::fs::write(&reset_path, score::sysex_sequence(device.reset_sysex)?).await?;

        let result = process::output(
            Command::new(&self.config.playback_tool)
                .arg("-p")
                .arg(address)
                .arg(&reset_path),
        )
        .await;

        if let Err(e) = tokio::fs::remove_file(&reset_path).await {
            debug!("Failed to remove {}: {}", reset_path.display(), e);
        }

        let (status, _) = result?;
        if !status.success() {
            return Err(RecordError::PlaybackFailed { status });
        }

        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    fn capture_command(&self, device: &Device, seconds: u32, dest: &Path) -> Command {
        let mut command = Command::new(&self.config.capture_tool);
        command
            .args(["--fatal-errors", "--nonblock"])
            .args(["--buffer-size", "96000"])
            .args(["--device", device.audio_port])
            .args(["--rate", "48000"])
            .args(["--channels", "4"])
            .args(["--format", "S32_LE"])
            .args(["--duration", &seconds.to_string()])
            .arg(dest);
        command
    }

    /// Watches both processes until the recording is complete or has failed
    async fn supervise(
        &self,
        capture: &mut Monitored,
        playback: &mut Monitored,
        seconds: u32,
    ) -> Result<(), RecordError> {
        let grace = self.config.terminate_grace;
        let budget = Duration::from_secs(u64::from(seconds)) + self.config.playback_grace;
        let deadline = Instant::now() + budget;
        let mut ticker = tokio::time::interval(self.config.poll_interval);

        loop {
            ticker.tick().await;

            if let Some(status) = playback.poll()? {
                info!("Playback exited with {}", status);
                if !status.success() {
                    // capture is reaped when the caller drops it
                    return Err(RecordError::PlaybackFailed { status });
                }

                return match capture.poll()? {
                    Some(status) if !status.success() => Err(RecordError::CaptureFailed { status }),
                    Some(_) => Ok(()),
                    None => {
                        // Stopped by us, so any exit status is a finished recording
                        let status = capture.terminate(grace).await?;
                        info!("Capture stopped with {}", status);
                        Ok(())
                    }
                };
            }

            if let Some(status) = capture.poll()? {
                info!("Capture exited with {} before playback finished", status);
                playback.terminate(grace).await?;
                if !status.success() {
                    return Err(RecordError::CaptureFailed { status });
                }
                // Capture ran for the full score length; playback was only trailing
                return Ok(());
            }

            if Instant::now() >= deadline {
                warn!("Playback overran by {:?}, stopping it", self.config.playback_grace);
                playback.terminate(grace).await?;
                capture.terminate(grace).await?;
                return Err(RecordError::PlaybackTimedOut {
                    seconds: budget.as_secs(),
                });
            }
        }
    }
}

#[async_trait]
impl Recorder for RecordingOrchestrator {
    async fn record(&self, score: &Path, dest: &Path, device: &Device) -> Result<(), RecordError> {
        self.require_tools()?;

        let seconds = score::duration_of_file(score)?;
        let address = self.sequencer_address(device).await?;

        self.reset(device, &address, dest).await?;

        info!(
            "Recording {} ({}s) on {} via {}",
            score.display(),
            seconds,
            device.name,
            address
        );

        let mut capture = Monitored::spawn(
            "capture",
            &mut self.capture_command(device, seconds, dest),
        )?;
        let mut playback = Monitored::spawn(
            "playback",
            Command::new(&self.config.playback_tool)
                .arg("-p")
                .arg(&address)
                .arg(score),
        )?;

        let result = self.supervise(&mut capture, &mut playback, seconds).await;

        if result.is_err() {
            // Reap whatever is still running before reporting
            for monitored in [&mut playback, &mut capture] {
                if let Err(e) = monitored.terminate(self.config.terminate_grace).await {
                    warn!("Failed to stop {}: {}", monitored.name, e);
                }
            }
        }
        playback.log_output().await;
        capture.log_output().await;

        result?;

        info!("Recorded {}", dest.display());
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tonewell_core::test_support::single_note_score;

    const LISTING: &str = " Port    Client name                      Port name\\n 14:0    Midi Through                     Midi Through Port-0\\n";

    struct Rig {
        dir: TempDir,
        config: RecorderConfig,
        score: PathBuf,
        dest: PathBuf,
    }

    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Playback stub that lists a through port, accepts resets, then runs `body`
    fn rig(playback_body: &str, capture_body: &str) -> Rig {
        let dir = TempDir::new().unwrap();

        let playback_tool = script(
            dir.path(),
            "playback",
            &format!(
                "if [ \"$1\" = \"-l\" ]; then printf '{}'; exit 0; fi\n\
                 case \"$3\" in *.reset.mid) exit 0 ;; esac\n\
                 {}",
                LISTING, playback_body
            ),
        );
        let capture_tool = script(
            dir.path(),
            "capture",
            &format!(
                "for last; do :; done\n\
                 echo pcm > \"$last\"\n\
                 {}",
                capture_body
            ),
        );

        let score = dir.path().join("job.mid");
        std::fs::write(&score, single_note_score(1)).unwrap();
        let dest = dir.path().join("job.wav");

        Rig {
            config: RecorderConfig {
                playback_tool,
                capture_tool,
                poll_interval: Duration::from_millis(50),
                settle_delay: Duration::ZERO,
                playback_grace: Duration::from_secs(1),
                terminate_grace: Duration::from_secs(1),
            },
            dir,
            score,
            dest,
        }
    }

    async fn run(rig: &Rig) -> Result<(), RecordError> {
        let device = Device::from_id("nullsynth").unwrap();
        RecordingOrchestrator::new(rig.config.clone())
            .record(&rig.score, &rig.dest, device)
            .await
    }

    #[tokio::test]
    async fn test_record_stops_capture_after_playback() {
        let rig = rig("sleep 0.2", "exec sleep 30");

        let started = std::time::Instant::now();
        run(&rig).await.unwrap();

        assert!(rig.dest.exists());
        assert!(started.elapsed() < Duration::from_secs(10));
        // reset file is cleaned up
        assert!(!rig.dir.path().join("job.reset.mid").exists());
    }

    #[tokio::test]
    async fn test_record_capture_failure_stops_playback() {
        let rig = rig("exec sleep 30", "exit 2");

        let started = std::time::Instant::now();
        let err = run(&rig).await.unwrap_err();

        assert!(matches!(err, RecordError::CaptureFailed { status } if status.code() == Some(2)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_record_playback_failure() {
        let rig = rig("exit 3", "exec sleep 30");

        let err = run(&rig).await.unwrap_err();
        assert!(matches!(err, RecordError::PlaybackFailed { status } if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_record_bounds_runaway_playback() {
        let rig = rig("exec sleep 30", "exec sleep 30");

        let started = std::time::Instant::now();
        let err = run(&rig).await.unwrap_err();

        // 1s score plus 1s grace
        assert!(matches!(err, RecordError::PlaybackTimedOut { seconds: 2 }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_record_missing_tool() {
        let mut rig = rig("exit 0", "exit 0");
        rig.config.capture_tool = "/nonexistent/tonewell/arecord".to_string();

        let err = run(&rig).await.unwrap_err();
        assert!(matches!(err, RecordError::ToolMissing { tool } if tool.ends_with("arecord")));
        assert!(!rig.dest.exists());
    }

    #[tokio::test]
    async fn test_record_unknown_port() {
        let rig = rig("exit 0", "exit 0");
        let device = Device::from_id("sc55mk2").unwrap();

        let err = RecordingOrchestrator::new(rig.config.clone())
            .record(&rig.score, &rig.dest, device)
            .await
            .unwrap_err();

        assert!(matches!(err, RecordError::PortNotFound { .. }));
    }
}
