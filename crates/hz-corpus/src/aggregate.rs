//! Corpus aggregation
//!
//! Drains a [`ScanPipeline`] into a [`VelocityDatabase`]. The aggregator is the
//! only owner of the database; workers never touch it.

use std::path::PathBuf;

use log::{debug, info};

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::database::VelocityDatabase;
use crate::error::{CorpusError, CorpusResult};
use crate::pool::{ScanPipeline, ScanStats};

/// Database built from a corpus, with run totals
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub database: VelocityDatabase,
    pub stats: ScanStats,
    /// Files merged into the database
    pub files: usize,
    /// Decoded events over those files, silent ones included
    pub events: usize,
}

/// Drain `pipeline` into a fresh database.
///
/// The first per-file error aborts the run and discards everything merged so
/// far. Draining also stops once `config.result_limit` files were merged. On
/// every path the pipeline is cancelled and waited for before returning. If
/// the token fired from outside before every input was admitted and
/// delivered, the partial database is dropped and `CorpusError::Cancelled`
/// is returned. A cancel that lands after the stream ended changes nothing.
pub fn build_database(mut pipeline: ScanPipeline, config: &ScanConfig) -> CorpusResult<ScanOutput> {
    let mut database = VelocityDatabase::new();
    let mut files = 0usize;
    let mut events = 0usize;
    let mut failure = None;
    let mut limit_reached = false;

    while let Some(result) = pipeline.recv() {
        match result {
            Ok(file) => {
                let added = database.record_events(&file.events, file.ticks_per_quarter_note);
                files += 1;
                events += file.events.len();
                debug!(
                    "Merged {} ({} events, {} new velocities)",
                    file.path.display(),
                    file.events.len(),
                    added
                );
                if config.result_limit.is_some_and(|limit| files >= limit) {
                    limit_reached = true;
                    break;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    pipeline.cancel();
    let stats = pipeline.wait();

    if let Some(e) = failure {
        return Err(e);
    }
    if !limit_reached && (!stats.complete || stats.abandoned > 0) {
        return Err(CorpusError::Cancelled { processed: files });
    }

    info!(
        "Scanned {} files ({} events): {} keys, {} velocities",
        files,
        events,
        database.key_count(),
        database.velocity_count()
    );

    Ok(ScanOutput {
        database,
        stats,
        files,
        events,
    })
}

/// Spawn a pipeline over `paths` and aggregate it.
pub fn scan_paths<I>(paths: I, config: &ScanConfig, token: CancelToken) -> CorpusResult<ScanOutput>
where
    I: IntoIterator<Item = PathBuf>,
    I::IntoIter: Send + 'static,
{
    let pipeline = ScanPipeline::spawn(paths, config, token)?;
    build_database(pipeline, config)
}

/// Like [`scan_paths`], for inputs that can fail while being read, such as a
/// [`PathList`](crate::PathList). An input error fails the scan.
pub fn scan_inputs<I>(
    inputs: I,
    config: &ScanConfig,
    token: CancelToken,
) -> CorpusResult<ScanOutput>
where
    I: IntoIterator<Item = CorpusResult<PathBuf>>,
    I::IntoIter: Send + 'static,
{
    let pipeline = ScanPipeline::spawn_fallible(inputs, config, token)?;
    build_database(pipeline, config)
}
