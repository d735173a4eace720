//! Velocity distribution database
//!
//! Distinct velocities observed per (note, message type, quarter position)
//! across a corpus. Only membership is kept, not frequency, so the result of
//! merging files is independent of the order they arrive in.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use hz_midi::Event;
use serde::{Deserialize, Serialize};

use crate::config::DatabaseLayout;
use crate::error::{CorpusError, CorpusResult};

/// Distinct velocities, ascending
pub type VelocitySet = BTreeSet<u8>;

type PositionMap = BTreeMap<u8, VelocitySet>;
type TypeMap = BTreeMap<u8, PositionMap>;

const MAX_DATA_VALUE: u8 = 0x7F;
const MAX_POSITION: u8 = 3;
const MAX_MESSAGE_TYPE: u8 = 0xF;

// ═══════════════════════════════════════════════════════════════════════════════
// LOOKUP SEAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Candidate velocities for an event key
pub trait VelocitySource {
    fn candidates(&self, note: u8, message_type: u8, position: u8) -> Option<&VelocitySet>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITIONED DATABASE
// ═══════════════════════════════════════════════════════════════════════════════

/// note → message type → quarter position → velocities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VelocityDatabase {
    notes: BTreeMap<u8, TypeMap>,
}

impl VelocityDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. Velocity 0 is ignored.
    ///
    /// Returns true if the velocity was not yet known for this key.
    pub fn insert(&mut self, note: u8, message_type: u8, position: u8, velocity: u8) -> bool {
        if velocity == 0 {
            return false;
        }
        self.notes
            .entry(note)
            .or_default()
            .entry(message_type)
            .or_default()
            .entry(position)
            .or_default()
            .insert(velocity)
    }

    /// Add a decoded event, deriving its quarter position from the file division.
    pub fn record(&mut self, event: &Event, ticks_per_quarter_note: u16) -> bool {
        if event.is_silent() {
            return false;
        }
        let position = event.quarter_position(ticks_per_quarter_note);
        self.insert(event.note, event.message_type, position, event.velocity)
    }

    /// Add every event of one file; returns the number of new observations.
    pub fn record_events<'a, I>(&mut self, events: I, ticks_per_quarter_note: u16) -> usize
    where
        I: IntoIterator<Item = &'a Event>,
    {
        events
            .into_iter()
            .filter(|e| self.record(e, ticks_per_quarter_note))
            .count()
    }

    /// Set-union with another database.
    pub fn merge(&mut self, other: &VelocityDatabase) {
        for (note, message_type, position, velocities) in other.iter() {
            for &velocity in velocities {
                self.insert(note, message_type, position, velocity);
            }
        }
    }

    pub fn candidates(&self, note: u8, message_type: u8, position: u8) -> Option<&VelocitySet> {
        self.notes.get(&note)?.get(&message_type)?.get(&position)
    }

    /// Union over all positions for (note, type)
    pub fn coarse_candidates(&self, note: u8, message_type: u8) -> Option<VelocitySet> {
        let positions = self.notes.get(&note)?.get(&message_type)?;
        let union: VelocitySet = positions.values().flatten().copied().collect();
        if union.is_empty() { None } else { Some(union) }
    }

    /// Every (note, type, position) key with its velocities
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8, u8, &VelocitySet)> + '_ {
        self.notes.iter().flat_map(|(&note, types)| {
            types.iter().flat_map(move |(&message_type, positions)| {
                positions
                    .iter()
                    .map(move |(&position, velocities)| (note, message_type, position, velocities))
            })
        })
    }

    /// Number of (note, type, position) keys
    pub fn key_count(&self) -> usize {
        self.iter().count()
    }

    /// Total stored velocities over all keys
    pub fn velocity_count(&self) -> usize {
        self.iter().map(|(_, _, _, v)| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Collapse quarter positions.
    pub fn to_coarse(&self) -> CoarseDatabase {
        let mut coarse = CoarseDatabase::new();
        for (note, message_type, _, velocities) in self.iter() {
            for &velocity in velocities {
                coarse.insert(note, message_type, velocity);
            }
        }
        coarse
    }

    fn validate(&self) -> CorpusResult<()> {
        for (note, message_type, position, velocities) in self.iter() {
            check_key(note, message_type)?;
            if position > MAX_POSITION {
                return Err(CorpusError::SchemaMismatch(format!(
                    "quarter position {} out of range for note {}",
                    position, note
                )));
            }
            check_velocities(velocities)?;
        }
        Ok(())
    }

    /// Serialize in the given layout as pretty JSON.
    pub fn to_writer<W: Write>(&self, writer: W, layout: DatabaseLayout) -> CorpusResult<()> {
        match layout {
            DatabaseLayout::Positioned => serde_json::to_writer_pretty(writer, self)?,
            DatabaseLayout::Coarse => serde_json::to_writer_pretty(writer, &self.to_coarse())?,
        }
        Ok(())
    }

    /// Save to file in the given layout
    pub fn save<P: AsRef<Path>>(&self, path: P, layout: DatabaseLayout) -> CorpusResult<()> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf, layout)?;
        buf.push(b'\n');
        fs::write(path, buf)?;
        Ok(())
    }
}

impl VelocitySource for VelocityDatabase {
    fn candidates(&self, note: u8, message_type: u8, position: u8) -> Option<&VelocitySet> {
        VelocityDatabase::candidates(self, note, message_type, position)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COARSE DATABASE
// ═══════════════════════════════════════════════════════════════════════════════

/// note → message type → velocities, ignoring quarter position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoarseDatabase {
    notes: BTreeMap<u8, BTreeMap<u8, VelocitySet>>,
}

impl CoarseDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, note: u8, message_type: u8, velocity: u8) -> bool {
        if velocity == 0 {
            return false;
        }
        self.notes
            .entry(note)
            .or_default()
            .entry(message_type)
            .or_default()
            .insert(velocity)
    }

    pub fn candidates(&self, note: u8, message_type: u8) -> Option<&VelocitySet> {
        self.notes.get(&note)?.get(&message_type)
    }

    pub fn key_count(&self) -> usize {
        self.notes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    fn validate(&self) -> CorpusResult<()> {
        for (&note, types) in &self.notes {
            for (&message_type, velocities) in types {
                check_key(note, message_type)?;
                check_velocities(velocities)?;
            }
        }
        Ok(())
    }
}

impl VelocitySource for CoarseDatabase {
    fn candidates(&self, note: u8, message_type: u8, _position: u8) -> Option<&VelocitySet> {
        CoarseDatabase::candidates(self, note, message_type)
    }
}

fn check_key(note: u8, message_type: u8) -> CorpusResult<()> {
    if note > MAX_DATA_VALUE {
        return Err(CorpusError::SchemaMismatch(format!("note {} out of range", note)));
    }
    if message_type > MAX_MESSAGE_TYPE {
        return Err(CorpusError::SchemaMismatch(format!(
            "message type {} out of range for note {}",
            message_type, note
        )));
    }
    Ok(())
}

fn check_velocities(velocities: &VelocitySet) -> CorpusResult<()> {
    match velocities.iter().next_back() {
        Some(&v) if v > MAX_DATA_VALUE => Err(CorpusError::SchemaMismatch(format!(
            "velocity {} out of range",
            v
        ))),
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTED FORM
// ═══════════════════════════════════════════════════════════════════════════════

/// A database read back from disk, in whichever layout it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedDatabase {
    Positioned(VelocityDatabase),
    Coarse(CoarseDatabase),
}

impl LoadedDatabase {
    pub fn layout(&self) -> DatabaseLayout {
        match self {
            LoadedDatabase::Positioned(_) => DatabaseLayout::Positioned,
            LoadedDatabase::Coarse(_) => DatabaseLayout::Coarse,
        }
    }

    pub fn key_count(&self) -> usize {
        match self {
            LoadedDatabase::Positioned(db) => db.key_count(),
            LoadedDatabase::Coarse(db) => db.key_count(),
        }
    }

    /// Parse JSON, detecting the layout.
    ///
    /// A document that fits neither layout, for instance one mixing both
    /// shapes, fails with `SchemaMismatch`.
    pub fn from_reader<R: Read>(reader: R) -> CorpusResult<Self> {
        let value: serde_json::Value = serde_json::from_reader(reader)?;

        if let Ok(db) = VelocityDatabase::deserialize(&value) {
            db.validate()?;
            return Ok(LoadedDatabase::Positioned(db));
        }
        match CoarseDatabase::deserialize(&value) {
            Ok(db) => {
                db.validate()?;
                Ok(LoadedDatabase::Coarse(db))
            }
            Err(e) => Err(CorpusError::SchemaMismatch(format!(
                "neither positioned nor coarse layout: {}",
                e
            ))),
        }
    }

    /// Load from file
    pub fn load<P: AsRef<Path>>(path: P) -> CorpusResult<Self> {
        let content = fs::read(path)?;
        Self::from_reader(content.as_slice())
    }
}

impl VelocitySource for LoadedDatabase {
    fn candidates(&self, note: u8, message_type: u8, position: u8) -> Option<&VelocitySet> {
        match self {
            LoadedDatabase::Positioned(db) => db.candidates(note, message_type, position),
            LoadedDatabase::Coarse(db) => db.candidates(note, message_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hz_midi::message_type;

    fn note_on(note: u8, velocity: u8, tick: u64) -> Event {
        Event {
            message_type: message_type::NOTE_ON,
            channel: 0,
            note,
            velocity,
            velocity_offset: 0,
            time_delta: 0,
            tick,
        }
    }

    #[test]
    fn test_insert_deduplicates_and_ignores_silence() {
        let mut db = VelocityDatabase::new();
        assert!(db.insert(60, 9, 0, 64));
        assert!(!db.insert(60, 9, 0, 64));
        assert!(!db.insert(60, 9, 0, 0));
        assert!(db.insert(60, 9, 1, 64));
        assert_eq!(db.key_count(), 2);
        assert_eq!(db.velocity_count(), 2);
    }

    #[test]
    fn test_record_uses_quarter_position() {
        let mut db = VelocityDatabase::new();
        let events = [note_on(60, 70, 0), note_on(60, 80, 960), note_on(60, 0, 480)];
        assert_eq!(db.record_events(&events, 480), 2);

        assert_eq!(db.candidates(60, 9, 0).unwrap().iter().copied().collect::<Vec<_>>(), vec![70]);
        assert_eq!(db.candidates(60, 9, 2).unwrap().iter().copied().collect::<Vec<_>>(), vec![80]);
        assert!(db.candidates(60, 9, 1).is_none());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = VelocityDatabase::new();
        a.insert(60, 9, 0, 10);
        a.insert(62, 8, 3, 20);
        let mut b = VelocityDatabase::new();
        b.insert(60, 9, 0, 30);
        b.insert(60, 9, 0, 10);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.velocity_count(), 3);
    }

    #[test]
    fn test_coarse_union() {
        let mut db = VelocityDatabase::new();
        db.insert(60, 9, 0, 10);
        db.insert(60, 9, 3, 90);
        let union = db.coarse_candidates(60, 9).unwrap();
        assert_eq!(union.into_iter().collect::<Vec<_>>(), vec![10, 90]);
        assert!(db.coarse_candidates(61, 9).is_none());

        let coarse = db.to_coarse();
        assert_eq!(coarse.candidates(60, 9).unwrap().len(), 2);
        assert_eq!(VelocitySource::candidates(&coarse, 60, 9, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_json_shape() {
        let mut db = VelocityDatabase::new();
        db.insert(60, 9, 2, 80);
        db.insert(60, 9, 2, 64);
        let value = serde_json::to_value(&db).unwrap();
        assert_eq!(value, serde_json::json!({ "60": { "9": { "2": [64, 80] } } }));
    }

    #[test]
    fn test_round_trip_both_layouts() {
        let mut db = VelocityDatabase::new();
        db.insert(36, 9, 0, 100);
        db.insert(36, 9, 1, 90);
        db.insert(127, 8, 3, 1);

        let mut buf = Vec::new();
        db.to_writer(&mut buf, DatabaseLayout::Positioned).unwrap();
        assert_eq!(
            LoadedDatabase::from_reader(buf.as_slice()).unwrap(),
            LoadedDatabase::Positioned(db.clone())
        );

        let mut buf = Vec::new();
        db.to_writer(&mut buf, DatabaseLayout::Coarse).unwrap();
        let loaded = LoadedDatabase::from_reader(buf.as_slice()).unwrap();
        assert_eq!(loaded.layout(), DatabaseLayout::Coarse);
        assert_eq!(loaded, LoadedDatabase::Coarse(db.to_coarse()));
    }

    #[test]
    fn test_unordered_json_loads() {
        let json = r#"{ "64": { "9": { "1": [90, 12, 90] } } }"#;
        let loaded = LoadedDatabase::from_reader(json.as_bytes()).unwrap();
        let expected: VelocitySet = [12, 90].into_iter().collect();
        assert_eq!(loaded.candidates(64, 9, 1), Some(&expected));
    }

    #[test]
    fn test_mixed_layouts_rejected() {
        let json = r#"{ "60": { "9": [64] }, "61": { "9": { "0": [64] } } }"#;
        assert!(matches!(
            LoadedDatabase::from_reader(json.as_bytes()),
            Err(CorpusError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let json = r#"{ "60": { "9": { "7": [64] } } }"#;
        assert!(matches!(
            LoadedDatabase::from_reader(json.as_bytes()),
            Err(CorpusError::SchemaMismatch(_))
        ));
        let json = r#"{ "60": { "9": [200] } }"#;
        assert!(matches!(
            LoadedDatabase::from_reader(json.as_bytes()),
            Err(CorpusError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(
            LoadedDatabase::from_reader(&b"{ \"60\": "[..]),
            Err(CorpusError::Json(_))
        ));
    }
}
