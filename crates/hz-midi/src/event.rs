//! Decoded events, tracks and files

use serde::{Deserialize, Serialize};

use crate::quarter::quarter_position;

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// High-nibble message types
pub mod message_type {
    pub const NOTE_OFF: u8 = 0x8;
    pub const NOTE_ON: u8 = 0x9;
    pub const POLY_PRESSURE: u8 = 0xA;
    pub const CONTROL_CHANGE: u8 = 0xB;
    pub const PROGRAM_CHANGE: u8 = 0xC;
    pub const CHANNEL_PRESSURE: u8 = 0xD;
    pub const PITCH_BEND: u8 = 0xE;
    pub const SYSTEM: u8 = 0xF;

    /// Channel-voice types, the only ones running status may repeat
    #[inline]
    pub fn is_voice(message_type: u8) -> bool {
        (NOTE_OFF..=PITCH_BEND).contains(&message_type)
    }

    /// Types that carry a note and a velocity byte
    #[inline]
    pub fn has_velocity(message_type: u8) -> bool {
        matches!(message_type, NOTE_OFF | NOTE_ON | POLY_PRESSURE)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Note-bearing event found during a linear pass over a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// High nibble of the governing status byte (0x8, 0x9 or 0xA)
    pub message_type: u8,
    /// Low nibble of the governing status byte
    pub channel: u8,
    pub note: u8,
    /// 0 means "note off written as note on"
    pub velocity: u8,
    /// Absolute position of the velocity byte in the source stream
    pub velocity_offset: u64,
    /// Ticks since the previous record in the same track
    pub time_delta: u32,
    /// Cumulative ticks since the start of the track
    pub tick: u64,
}

impl Event {
    /// Silent events carry no velocity information.
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.velocity == 0
    }

    /// Quarter of a four-beat bar this event starts in
    #[inline]
    pub fn quarter_position(&self, ticks_per_quarter_note: u16) -> u8 {
        quarter_position(self.tick, ticks_per_quarter_note)
    }
}

/// Events of one `MTrk` chunk, in stream order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub events: Vec<Event>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Division field interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    /// Ticks per quarter note
    Metrical,
    /// SMPTE frames; ticks-per-quarter is left at 0
    Timecode,
}

/// Result of decoding one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiFile {
    pub time_format: TimeFormat,
    /// 0 for timecode files
    pub ticks_per_quarter_note: u16,
    pub tracks: Vec<Track>,
}

impl MidiFile {
    /// All events, tracks concatenated in file order
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.tracks.iter().flat_map(|t| t.events.iter())
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    /// Flatten into an owned event list
    pub fn into_events(self) -> Vec<Event> {
        self.tracks.into_iter().flat_map(|t| t.events).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(tick: u64, velocity: u8) -> Event {
        Event {
            message_type: message_type::NOTE_ON,
            channel: 0,
            note: 60,
            velocity,
            velocity_offset: 0,
            time_delta: 0,
            tick,
        }
    }

    #[test]
    fn test_voice_classification() {
        assert!(!message_type::is_voice(0x7));
        for t in 0x8..=0xE {
            assert!(message_type::is_voice(t));
        }
        assert!(!message_type::is_voice(0xF));

        assert!(message_type::has_velocity(message_type::NOTE_ON));
        assert!(message_type::has_velocity(message_type::POLY_PRESSURE));
        assert!(!message_type::has_velocity(message_type::CONTROL_CHANGE));
    }

    #[test]
    fn test_event_quarter_position() {
        assert_eq!(event(960, 80).quarter_position(480), 2);
        assert_eq!(event(960, 80).quarter_position(0), 0);
        assert!(event(0, 0).is_silent());
    }

    #[test]
    fn test_file_flattening() {
        let file = MidiFile {
            time_format: TimeFormat::Metrical,
            ticks_per_quarter_note: 96,
            tracks: vec![
                Track { events: vec![event(0, 1), event(10, 2)] },
                Track::new(),
                Track { events: vec![event(5, 3)] },
            ],
        };
        assert_eq!(file.event_count(), 3);
        let velocities: Vec<u8> = file.events().map(|e| e.velocity).collect();
        assert_eq!(velocities, vec![1, 2, 3]);
        assert_eq!(file.into_events().len(), 3);
    }
}
