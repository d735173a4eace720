//! Standard MIDI File decoder
//!
//! Two macro-states: awaiting a track chunk header, and parsing events
//! inside a track. Only note-bearing events (0x8, 0x9, 0xA) are kept; for
//! each one the absolute offset of its velocity byte is recorded so the file
//! can later be patched in place.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use log::debug;

use crate::error::{ChunkId, MidiError, MidiResult};
use crate::event::{message_type, Event, MidiFile, TimeFormat, Track};
use crate::reader::ByteReader;

/// Required `MThd` payload length
pub const HEADER_LENGTH: u32 = 6;

const TIMECODE_FLAG: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    AwaitingTrack,
    /// Parsing events until the offset reaches `end`
    Events { end: u64 },
}

/// Decoder over one seekable stream.
///
/// All state, the byte offset included, belongs to the instance, so
/// independent files can be decoded on different threads.
pub struct Decoder<R> {
    reader: ByteReader<R>,
    running_status: Option<u8>,
    track_tick: u64,
    tracks: Vec<Track>,
}

impl<R: Read + Seek> Decoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: ByteReader::new(inner),
            running_status: None,
            track_tick: 0,
            tracks: Vec::new(),
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Decode the whole stream.
    ///
    /// Any failure other than end-of-stream aborts the decode and nothing
    /// decoded so far is returned. On success the stream is left at offset 0.
    pub fn decode(&mut self) -> MidiResult<MidiFile> {
        self.running_status = None;
        self.track_tick = 0;
        self.tracks.clear();

        self.reader.rewind()?;
        let (time_format, ticks_per_quarter_note) = self.read_header()?;

        let mut state = ChunkState::AwaitingTrack;
        loop {
            let step = match state {
                ChunkState::AwaitingTrack => self.parse_track_header(),
                ChunkState::Events { end } => self.parse_event(end),
            };
            match step {
                Ok(next) => state = next,
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => {
                    self.tracks.clear();
                    return Err(e);
                }
            }
        }

        self.reader.rewind()?;

        let file = MidiFile {
            time_format,
            ticks_per_quarter_note,
            tracks: std::mem::take(&mut self.tracks),
        };
        debug!(
            "decoded {} tracks, {} events (tpq {})",
            file.tracks.len(),
            file.event_count(),
            file.ticks_per_quarter_note
        );
        Ok(file)
    }

    fn read_header(&mut self) -> MidiResult<(TimeFormat, u16)> {
        let header = self.reader.read_chunk_header()?;
        if header.id != ChunkId::HEADER {
            return Err(MidiError::UnsupportedFormat(format!(
                "expected header chunk {}, found {}",
                ChunkId::HEADER,
                header.id
            )));
        }
        if header.length != HEADER_LENGTH {
            return Err(MidiError::UnsupportedFormat(format!(
                "expected header size to be {}, was {}",
                HEADER_LENGTH, header.length
            )));
        }

        let format = self.reader.read_u16_be()?;
        let track_count = self.reader.read_u16_be()?;
        let division = self.reader.read_u16_be()?;
        debug!("SMF format {}, {} tracks declared, division {:#06X}", format, track_count, division);

        if division & TIMECODE_FLAG == 0 {
            Ok((TimeFormat::Metrical, division & 0x7FFF))
        } else {
            Ok((TimeFormat::Timecode, 0))
        }
    }

    fn parse_track_header(&mut self) -> MidiResult<ChunkState> {
        let chunk_offset = self.reader.offset();
        let header = self.reader.read_chunk_header()?;
        if header.id != ChunkId::TRACK {
            return Err(MidiError::UnexpectedData {
                expected: ChunkId::TRACK,
                found: header.id,
                offset: chunk_offset,
            });
        }

        self.tracks.push(Track::new());
        self.track_tick = 0;
        self.running_status = None;

        Ok(ChunkState::Events {
            end: header.end_offset(),
        })
    }

    fn parse_event(&mut self, end: u64) -> MidiResult<ChunkState> {
        if self.reader.offset() >= end {
            return Ok(ChunkState::AwaitingTrack);
        }
        let state = ChunkState::Events { end };

        let time_delta = self.reader.read_var_len()?;
        self.track_tick += time_delta as u64;

        let mut status = self.reader.read_byte()?;
        if status & 0x80 == 0 {
            // Running status: this is a data byte of an event that reuses the
            // previous voice status.
            if let Some(previous) = self.running_status.filter(|s| message_type::is_voice(*s >> 4)) {
                self.reader.unread_byte()?;
                status = previous;
            }
        }

        let kind = status >> 4;
        if kind == 0 {
            return Ok(state);
        }
        self.running_status = Some(status);

        match kind {
            0x2..=0x6 | message_type::PROGRAM_CHANGE | message_type::CHANNEL_PRESSURE => {
                self.reader.skip(1)?;
            }
            message_type::CONTROL_CHANGE | message_type::PITCH_BEND => {
                self.reader.skip(2)?;
            }
            message_type::NOTE_OFF | message_type::NOTE_ON | message_type::POLY_PRESSURE => {
                let note = self.reader.read_u7()?;
                let velocity_offset = self.reader.offset();
                let velocity = self.reader.read_u7()?;
                let event = Event {
                    message_type: kind,
                    channel: status & 0x0F,
                    note,
                    velocity,
                    velocity_offset,
                    time_delta,
                    tick: self.track_tick,
                };
                if let Some(track) = self.tracks.last_mut() {
                    track.events.push(event);
                }
            }
            message_type::SYSTEM => match status {
                0xF0 | 0xF7 => {
                    self.reader.skip_var_len_text()?;
                }
                _ => {
                    let _meta_type = self.reader.read_byte()?;
                    self.reader.skip_var_len_text()?;
                }
            },
            _ => {}
        }

        Ok(state)
    }
}

/// Decode an in-memory file.
pub fn decode_bytes(bytes: &[u8]) -> MidiResult<MidiFile> {
    Decoder::new(Cursor::new(bytes)).decode()
}

/// Read and decode a file from disk.
pub fn decode_file<P: AsRef<Path>>(path: P) -> MidiResult<MidiFile> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_bytes(&bytes)
}
