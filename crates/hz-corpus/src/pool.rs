//! Bounded-concurrency scan pipeline
//!
//! ```text
//! paths ─► driver ──[gate: N slots]──► worker ─┐
//!                                      worker ─┼─► result (one at a time) ─► aggregator
//!                                      worker ─┘
//! ```
//!
//! The driver admits a path only after taking a gate slot, and each worker
//! gives its slot back when it exits. Workers hand their result over a
//! rendezvous channel; once the cancel token fires, a worker whose result is
//! not being received drops it instead of blocking. The driver reports
//! completion only after every admitted worker has exited.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use crossbeam_utils::sync::WaitGroup;
use hz_midi::{decode_file, Event};
use log::{debug, warn};
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::{CorpusError, CorpusResult};

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Events of one successfully decoded corpus file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    pub path: PathBuf,
    pub ticks_per_quarter_note: u16,
    pub events: Vec<Event>,
}

/// One delivered result: a decoded file, or `CorpusError::Item` for the path
pub type ScanResult = CorpusResult<DecodedFile>;

/// Counters reported when the pipeline completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Paths that took a gate slot
    pub admitted: usize,
    /// Results received by the aggregator
    pub delivered: usize,
    /// Results dropped after cancellation
    pub abandoned: usize,
    /// Paths that failed to decode, delivered or not
    pub failed: usize,
    /// The driver reached the end of its input
    pub complete: bool,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicUsize,
    delivered: AtomicUsize,
    abandoned: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ScanStats {
        ScanStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            complete: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORKER
// ═══════════════════════════════════════════════════════════════════════════════

/// Gives one gate slot back when dropped
struct SlotGuard {
    gate: Receiver<()>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.gate.try_recv();
    }
}

struct Worker {
    path: PathBuf,
    results: Sender<ScanResult>,
    token: CancelToken,
    counters: Arc<Counters>,
    _slot: SlotGuard,
    _in_flight: WaitGroup,
}

impl Worker {
    fn run(self) {
        if self.token.is_cancelled() {
            Counters::bump(&self.counters.abandoned);
            return;
        }

        let result = match decode_file(&self.path) {
            Ok(file) => {
                debug!(
                    "Decoded {}: {} events, {} tpq",
                    self.path.display(),
                    file.event_count(),
                    file.ticks_per_quarter_note
                );
                Ok(DecodedFile {
                    path: self.path.clone(),
                    ticks_per_quarter_note: file.ticks_per_quarter_note,
                    events: file.into_events(),
                })
            }
            Err(source) => {
                Counters::bump(&self.counters.failed);
                debug!("Decode failed for {}: {}", self.path.display(), source);
                Err(CorpusError::Item {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        select! {
            send(self.results, result) -> sent => match sent {
                Ok(()) => Counters::bump(&self.counters.delivered),
                Err(_) => Counters::bump(&self.counters.abandoned),
            },
            recv(self.token.signal()) -> _ => {
                warn!("Scan cancelled, dropping result for {}", self.path.display());
                Counters::bump(&self.counters.abandoned);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to a running scan
pub struct ScanPipeline {
    results: Receiver<ScanResult>,
    done: Receiver<ScanStats>,
    driver: Option<JoinHandle<()>>,
    token: CancelToken,
    counters: Arc<Counters>,
    exhausted: bool,
}

impl ScanPipeline {
    /// Start decoding `paths` with at most `config.max_concurrent_files`
    /// files in flight.
    pub fn spawn<I>(paths: I, config: &ScanConfig, token: CancelToken) -> CorpusResult<Self>
    where
        I: IntoIterator<Item = PathBuf>,
        I::IntoIter: Send + 'static,
    {
        Self::spawn_fallible(paths.into_iter().map(Ok), config, token)
    }

    /// Like [`spawn`](Self::spawn), for inputs that can fail while being read.
    ///
    /// The first input error is delivered as a result and ends admission.
    pub fn spawn_fallible<I>(
        inputs: I,
        config: &ScanConfig,
        token: CancelToken,
    ) -> CorpusResult<Self>
    where
        I: IntoIterator<Item = CorpusResult<PathBuf>>,
        I::IntoIter: Send + 'static,
    {
        config.validate()?;

        let (gate_tx, gate_rx) = bounded(config.max_concurrent_files);
        let (result_tx, result_rx) = bounded(0);
        let (done_tx, done_rx) = bounded(1);
        let counters = Arc::new(Counters::default());

        let driver = Driver {
            inputs: inputs.into_iter(),
            gate_tx,
            gate_rx,
            results: result_tx,
            token: token.clone(),
            counters: Arc::clone(&counters),
        };

        let handle = thread::Builder::new()
            .name("hz-scan-driver".to_string())
            .spawn(move || {
                let stats = driver.run();
                let _ = done_tx.send(stats);
            })
            .map_err(|e| CorpusError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            results: result_rx,
            done: done_rx,
            driver: Some(handle),
            token,
            counters,
            exhausted: false,
        })
    }

    /// Next result in arrival order; `None` once every worker has exited.
    pub fn recv(&mut self) -> Option<ScanResult> {
        match self.results.recv() {
            Ok(result) => Some(result),
            Err(_) => {
                self.exhausted = true;
                None
            }
        }
    }

    /// Stop admitting paths and release blocked workers.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the driver reports completion.
    ///
    /// If the result stream was not drained to the end, the pipeline is
    /// cancelled first so no worker is left waiting on a delivery.
    pub fn wait(mut self) -> ScanStats {
        if !self.exhausted {
            self.token.cancel();
        }
        self.finish()
    }

    fn finish(&mut self) -> ScanStats {
        let Some(handle) = self.driver.take() else {
            return self.counters.snapshot();
        };
        let stats = self
            .done
            .recv()
            .unwrap_or_else(|_| self.counters.snapshot());
        if handle.join().is_err() {
            warn!("Scan driver thread panicked");
        }
        stats
    }
}

impl Drop for ScanPipeline {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.token.cancel();
            self.finish();
        }
    }
}

struct Driver<I> {
    inputs: I,
    gate_tx: Sender<()>,
    gate_rx: Receiver<()>,
    results: Sender<ScanResult>,
    token: CancelToken,
    counters: Arc<Counters>,
}

impl<I: Iterator<Item = CorpusResult<PathBuf>>> Driver<I> {
    fn run(self) -> ScanStats {
        let Driver {
            inputs,
            gate_tx,
            gate_rx,
            results,
            token,
            counters,
        } = self;
        let in_flight = WaitGroup::new();
        let mut complete = true;

        for input in inputs {
            if token.is_cancelled() {
                complete = false;
                break;
            }
            let path = match input {
                Ok(path) => path,
                Err(e) => {
                    warn!("Scan input failed: {}", e);
                    deliver_error(&results, &token, e);
                    complete = false;
                    break;
                }
            };

            // Take a slot, or give up as soon as the token fires.
            let acquired = select! {
                send(gate_tx, ()) -> sent => sent.is_ok(),
                recv(token.signal()) -> _ => false,
            };
            if !acquired {
                complete = false;
                break;
            }
            let slot = SlotGuard {
                gate: gate_rx.clone(),
            };
            if token.is_cancelled() {
                complete = false;
                break;
            }

            Counters::bump(&counters.admitted);
            let worker = Worker {
                path,
                results: results.clone(),
                token: token.clone(),
                counters: Arc::clone(&counters),
                _slot: slot,
                _in_flight: in_flight.clone(),
            };

            let spawned = thread::Builder::new()
                .name("hz-scan-worker".to_string())
                .spawn(move || worker.run());
            if let Err(e) = spawned {
                warn!("Failed to spawn scan worker: {}", e);
                deliver_error(&results, &token, CorpusError::ThreadSpawn(e.to_string()));
                complete = false;
                break;
            }
        }

        drop(results);
        in_flight.wait();

        let stats = ScanStats {
            complete,
            ..counters.snapshot()
        };
        debug!(
            "Scan driver finished: {} admitted, {} delivered, {} abandoned, {} failed",
            stats.admitted, stats.delivered, stats.abandoned, stats.failed
        );
        stats
    }
}

/// Hand `error` to the aggregator unless the scan is cancelled first.
fn deliver_error(results: &Sender<ScanResult>, token: &CancelToken, error: CorpusError) {
    select! {
        send(results, Err(error)) -> _ => {},
        recv(token.signal()) -> _ => {},
    }
}
