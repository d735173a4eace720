//! Velocity resynthesis
//!
//! Each non-silent event is resolved once: candidates are looked up by its
//! key, a bounded number of uniform draws is taken, and the first draw inside
//! the window replaces the original velocity. When every draw misses, the
//! original is kept, so a pass always terminates.

use std::io::{Seek, Write};

use hz_corpus::{LoadedDatabase, VelocitySet, VelocitySource};
use hz_midi::MidiFile;
use log::{debug, trace};
use rand::Rng;
use serde::Serialize;

use crate::config::Granularity;
use crate::error::HumanizeResult;
use crate::patch::write_velocity;
use crate::window::VelocityWindow;

/// Draw up to `candidates.len()` times, returning the first value accepted by
/// `window`, or `original` if none is.
pub fn sample_velocity<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &VelocitySet,
    original: u8,
    window: VelocityWindow,
) -> u8 {
    let attempts = candidates.len();
    for _ in 0..attempts {
        let index = rng.random_range(0..attempts);
        match candidates.iter().nth(index) {
            Some(&velocity) if window.accepts(velocity) => return velocity,
            _ => {}
        }
    }
    original
}

/// Per-file counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HumanizeReport {
    /// Events seen, silent ones included
    pub examined: usize,
    /// Velocity bytes overwritten
    pub rewritten: usize,
    /// Events whose sampled velocity equalled the original
    pub unchanged: usize,
    /// Events with no candidates in the database
    pub missing: usize,
    pub skipped_silent: usize,
}

/// Rewrites velocities of a decoded file from a [`VelocitySource`]
pub struct Resynthesizer<'a, S: ?Sized, R> {
    source: &'a S,
    window: VelocityWindow,
    rng: R,
}

impl<'a, S: VelocitySource + ?Sized, R: Rng> Resynthesizer<'a, S, R> {
    pub fn new(source: &'a S, window: VelocityWindow, rng: R) -> Self {
        Self { source, window, rng }
    }

    /// Resolve every event of `file`, patching `out` at the recorded offsets.
    ///
    /// `out` must hold the same bytes `file` was decoded from.
    pub fn apply<W: Write + Seek>(
        &mut self,
        file: &MidiFile,
        out: &mut W,
    ) -> HumanizeResult<HumanizeReport> {
        let mut report = HumanizeReport::default();
        let tpq = file.ticks_per_quarter_note;

        for event in file.events() {
            report.examined += 1;
            if event.is_silent() {
                report.skipped_silent += 1;
                continue;
            }

            let position = event.quarter_position(tpq);
            let Some(candidates) = self.source.candidates(event.note, event.message_type, position)
            else {
                report.missing += 1;
                continue;
            };

            let velocity = sample_velocity(&mut self.rng, candidates, event.velocity, self.window);
            if velocity == event.velocity {
                report.unchanged += 1;
                continue;
            }

            write_velocity(out, event.velocity_offset, velocity)?;
            report.rewritten += 1;
            trace!(
                "note {} type {:X} q{} @{}: {} -> {}",
                event.note,
                event.message_type,
                position,
                event.velocity_offset,
                event.velocity,
                velocity
            );
        }

        debug!(
            "Resynthesized {} events: {} rewritten, {} unchanged, {} missing, {} silent",
            report.examined, report.rewritten, report.unchanged, report.missing, report.skipped_silent
        );
        Ok(report)
    }
}

impl Granularity {
    /// Shape a loaded database for lookups at this granularity.
    ///
    /// A positioned database is pooled for coarse lookups. A coarse database
    /// has no positions to offer, so it is used as is either way.
    pub fn prepare(self, database: LoadedDatabase) -> LoadedDatabase {
        match (self, database) {
            (Granularity::Coarse, LoadedDatabase::Positioned(db)) => {
                LoadedDatabase::Coarse(db.to_coarse())
            }
            (Granularity::Positioned, LoadedDatabase::Coarse(db)) => {
                debug!("Coarse database loaded, quarter positions ignored");
                LoadedDatabase::Coarse(db)
            }
            (_, database) => database,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hz_corpus::VelocityDatabase;
    use hz_midi::decode_bytes;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::io::Cursor;

    fn set(values: &[u8]) -> VelocitySet {
        values.iter().copied().collect()
    }

    /// 480 tpq: note 60 at q0 and q1, note 62 at q1, then a silent note-on
    fn fixture() -> Vec<u8> {
        let track: &[u8] = &[
            0x00, 0x90, 60, 100, //
            0x83, 0x60, 60, 100, // +480
            0x00, 62, 50, //
            0x00, 60, 0, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(track);
        bytes
    }

    #[test]
    fn test_single_candidate_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(sample_velocity(&mut rng, &set(&[64]), 100, VelocityWindow::default()), 64);
        }
    }

    #[test]
    fn test_falls_back_when_nothing_fits() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let window = VelocityWindow::new(40, 60).unwrap();
        assert_eq!(sample_velocity(&mut rng, &set(&[10, 20, 100]), 77, window), 77);
        assert_eq!(sample_velocity(&mut rng, &set(&[]), 77, window), 77);
    }

    #[test]
    fn test_samples_stay_inside_window() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let window = VelocityWindow::new(30, 90).unwrap();
        let candidates = set(&[10, 40, 50, 80, 120]);
        for _ in 0..200 {
            let v = sample_velocity(&mut rng, &candidates, 5, window);
            assert!(v == 5 || window.accepts(v));
        }
    }

    #[test]
    fn test_apply_rewrites_matching_keys_only() {
        let bytes = fixture();
        let file = decode_bytes(&bytes).unwrap();

        let mut db = VelocityDatabase::new();
        db.insert(60, 9, 0, 64);

        let mut out = Cursor::new(bytes.clone());
        let mut resynth =
            Resynthesizer::new(&db, VelocityWindow::default(), ChaCha8Rng::seed_from_u64(9));
        let report = resynth.apply(&file, &mut out).unwrap();

        assert_eq!(report.examined, 4);
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.missing, 2);
        assert_eq!(report.skipped_silent, 1);

        let patched = out.into_inner();
        let events: Vec<_> = file.events().collect();
        assert_eq!(patched[events[0].velocity_offset as usize], 64);
        assert_eq!(patched[events[1].velocity_offset as usize], 100);
        let differing = bytes.iter().zip(&patched).filter(|(a, b)| a != b).count();
        assert_eq!(differing, 1);
    }

    #[test]
    fn test_original_value_counts_as_unchanged() {
        let bytes = fixture();
        let file = decode_bytes(&bytes).unwrap();
        let mut db = VelocityDatabase::new();
        db.insert(62, 9, 1, 50);

        let mut out = Cursor::new(bytes.clone());
        let report = Resynthesizer::new(&db, VelocityWindow::default(), ChaCha8Rng::seed_from_u64(0))
            .apply(&file, &mut out)
            .unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.rewritten, 0);
        assert_eq!(out.into_inner(), bytes);
    }

    #[test]
    fn test_coarse_granularity_pools_positions() {
        let mut db = VelocityDatabase::new();
        db.insert(60, 9, 3, 33);
        let prepared = Granularity::Coarse.prepare(LoadedDatabase::Positioned(db.clone()));
        assert_eq!(prepared.candidates(60, 9, 0), Some(&set(&[33])));

        let untouched = Granularity::Positioned.prepare(LoadedDatabase::Positioned(db));
        assert!(untouched.candidates(60, 9, 0).is_none());
    }
}
