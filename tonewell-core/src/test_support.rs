//! Score builders for tests across the workspace

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

const TICKS_PER_BEAT: u16 = 24;

/// A type 0 score holding one note that lasts `seconds` at the default tempo
pub fn single_note_score(seconds: u32) -> Vec<u8> {
    // 120 bpm: two beats per second
    note_score(seconds * 2 * u32::from(TICKS_PER_BEAT), None)
}

/// A type 0 score holding one note `beats` long under a fixed `tempo`
pub fn score_with_tempo(beats: u32, tempo: u32) -> Vec<u8> {
    note_score(beats * u32::from(TICKS_PER_BEAT), Some(tempo))
}

fn note_score(ticks: u32, tempo: Option<u32>) -> Vec<u8> {
    let mut track = Vec::new();
    if let Some(tempo) = tempo {
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))),
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(60),
                vel: u7::new(100),
            },
        },
    });
    track.push(TrackEvent {
        delta: u28::new(ticks),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(60),
                vel: u7::new(0),
            },
        },
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_BEAT)),
    ));
    smf.tracks.push(track);

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).expect("writing to a Vec cannot fail");
    bytes
}
