//! Score handling
//!
//! Submitted scores are Standard MIDI Files. The core needs two things from
//! them: how long they play (to bound capture and to estimate queue wait)
//! and whether they are acceptable at all.

use midly::num::{u15, u28};
use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

/// Largest accepted score, in bytes
pub const MAX_SCORE_BYTES: usize = 256 * 1024;

/// Longest accepted score, in seconds
pub const MAX_SCORE_SECONDS: u32 = 15 * 60;

/// Tempo in effect until the first tempo event, in microseconds per quarter
const DEFAULT_TEMPO: u32 = 500_000;

/// Errors reading a score
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("failed to read score: {0}")]
    Io(#[from] std::io::Error),

    #[error("score could not be parsed: {0}")]
    Parse(String),

    #[error("score must be type 0 or type 1")]
    UnsupportedFormat,
}

/// Outcome of structurally validating a submitted score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Ok,
    TooBig,
    ParseFailure,
    UnsupportedFormat,
    TooLong,
}

impl Validation {
    /// Description suitable for sending back to the submitter
    pub fn description(&self) -> &'static str {
        match self {
            Validation::Ok => "OK",
            Validation::TooBig => "MIDI file too big >256 KiB",
            Validation::ParseFailure => "MIDI file could not be parsed",
            Validation::UnsupportedFormat => "MIDI file must be type 0 or type 1",
            Validation::TooLong => "MIDI file too long >15 min",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Validation::Ok)
    }
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Checks a submitted score before it is ever enqueued
pub fn validate(bytes: &[u8]) -> Validation {
    if bytes.len() > MAX_SCORE_BYTES {
        return Validation::TooBig;
    }

    let smf = match Smf::parse(bytes) {
        Ok(smf) => smf,
        Err(_) => return Validation::ParseFailure,
    };

    match length_seconds(&smf) {
        Ok(seconds) if seconds > f64::from(MAX_SCORE_SECONDS) => Validation::TooLong,
        Ok(_) => Validation::Ok,
        Err(ScoreError::UnsupportedFormat) => Validation::UnsupportedFormat,
        Err(_) => Validation::ParseFailure,
    }
}

/// Playing time of a score in whole seconds, rounded up
pub fn duration(bytes: &[u8]) -> Result<u32, ScoreError> {
    let smf = Smf::parse(bytes).map_err(|e| ScoreError::Parse(e.to_string()))?;
    let seconds = length_seconds(&smf)?;
    Ok(seconds.ceil() as u32)
}

/// Playing time of the score stored at `path`
pub fn duration_of_file(path: &Path) -> Result<u32, ScoreError> {
    let bytes = std::fs::read(path)?;
    duration(&bytes)
}

/// Wraps a single SysEx message in a type 0 file
///
/// Playback tools only accept files, so device reset messages are sent
/// through them in this form.
pub fn sysex_sequence(sysex: &[u8]) -> Result<Vec<u8>, ScoreError> {
    // the event body excludes the leading status byte
    let body = sysex.strip_prefix(&[0xF0]).unwrap_or(sysex);

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(480)),
    ));
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::SysEx(body),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    let mut out = Vec::new();
    smf.write_std(&mut out)?;
    Ok(out)
}

/// Total playing time in seconds, with the tempo map applied across all tracks
fn length_seconds(smf: &Smf) -> Result<f64, ScoreError> {
    if smf.header.format == Format::Sequential {
        return Err(ScoreError::UnsupportedFormat);
    }

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut end_tick = 0u64;

    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                tempo_changes.push((tick, tempo.as_int()));
            }
        }
        end_tick = end_tick.max(tick);
    }

    match smf.header.timing {
        Timing::Metrical(ticks_per_beat) => {
            let ticks_per_beat = f64::from(ticks_per_beat.as_int());
            if ticks_per_beat == 0.0 {
                return Err(ScoreError::Parse("zero ticks per beat".to_string()));
            }

            tempo_changes.sort_by_key(|(tick, _)| *tick);

            let mut seconds = 0.0;
            let mut last_tick = 0u64;
            let mut tempo = DEFAULT_TEMPO;
            for (tick, next_tempo) in tempo_changes {
                if tick > end_tick {
                    break;
                }
                seconds += ticks_to_seconds(tick - last_tick, tempo, ticks_per_beat);
                last_tick = tick;
                tempo = next_tempo;
            }
            seconds += ticks_to_seconds(end_tick - last_tick, tempo, ticks_per_beat);

            Ok(seconds)
        }
        Timing::Timecode(fps, subframes) => {
            let ticks_per_second = f64::from(fps.as_f32()) * f64::from(subframes);
            if ticks_per_second == 0.0 {
                return Err(ScoreError::Parse("zero timecode resolution".to_string()));
            }
            Ok(end_tick as f64 / ticks_per_second)
        }
    }
}

fn ticks_to_seconds(ticks: u64, tempo: u32, ticks_per_beat: f64) -> f64 {
    ticks as f64 * f64::from(tempo) / (ticks_per_beat * 1_000_000.0)
}
