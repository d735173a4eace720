//! hz-humanize: Velocity resynthesis for Standard MIDI Files
//!
//! Replaces note velocities with values drawn from a corpus database,
//! restricted to an acceptance window. The output file is a byte copy of the
//! input with single-byte velocity overwrites, nothing else.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hz_corpus::LoadedDatabase;
//! use hz_humanize::{humanize_file, HumanizeConfig};
//!
//! let db = LoadedDatabase::load("velocities.json")?;
//! let report = humanize_file(&db, "in.mid", "out.mid", &HumanizeConfig::default())?;
//! println!("{} velocities rewritten", report.rewritten);
//! ```

mod config;
mod error;
mod patch;
mod resynth;
mod window;

pub use config::*;
pub use error::*;
pub use patch::*;
pub use resynth::*;
pub use window::*;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use hz_corpus::{LoadedDatabase, VelocitySource};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Load a database file and shape it for `granularity` lookups.
pub fn load_database<P: AsRef<Path>>(
    path: P,
    granularity: Granularity,
) -> HumanizeResult<LoadedDatabase> {
    let database = LoadedDatabase::load(path)?;
    info!(
        "Loaded {:?} database with {} keys",
        database.layout(),
        database.key_count()
    );
    Ok(granularity.prepare(database))
}

/// Copy `input` to `output`, then rewrite velocities of the copy in place.
///
/// The input is decoded before anything is written. If patching fails the
/// output may already exist as a full or partly patched copy. When both
/// paths name the same file, it is patched directly without copying.
pub fn humanize_file<S, P, Q>(
    source: &S,
    input: P,
    output: Q,
    config: &HumanizeConfig,
) -> HumanizeResult<HumanizeReport>
where
    S: VelocitySource + ?Sized,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    config.validate()?;
    let (input, output) = (input.as_ref(), output.as_ref());

    let file = hz_midi::decode_file(input)?;
    if is_same_file(input, output) {
        debug!("{} patched in place", input.display());
    } else {
        fs::copy(input, output)?;
    }

    let mut out = OpenOptions::new().read(true).write(true).open(output)?;
    let rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let report = Resynthesizer::new(source, config.window, rng).apply(&file, &mut out)?;
    out.flush()?;

    info!(
        "Humanized {} -> {}: {} of {} velocities rewritten",
        input.display(),
        output.display(),
        report.rewritten,
        report.examined
    );
    Ok(report)
}

/// Both paths resolve to one existing file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
