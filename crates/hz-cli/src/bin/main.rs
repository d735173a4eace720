//! hz: velocity humanizer for Standard MIDI Files
//!
//! Usage:
//!   hz scan -l corpus.txt -o velocities.json      - Build a velocity database
//!   hz humanize -d velocities.json -i in.mid -o out.mid
//!                                                 - Rewrite velocities from it
//!   hz inspect -i song.mid                        - Dump decoded events as JSON
//!
//! Set `RUST_LOG=debug` for per-file and per-event detail.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hz_corpus::{scan_inputs, CancelToken, CorpusError, DatabaseLayout, PathList, ScanConfig};
use hz_humanize::{humanize_file, load_database, Granularity, HumanizeConfig, VelocityWindow};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "hz", version, about = "Velocity humanizer for Standard MIDI Files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a velocity database from a list of MIDI files
    Scan {
        /// File with one MIDI path per line
        #[arg(short, long)]
        list: PathBuf,
        /// Database file to write
        #[arg(short, long)]
        output: PathBuf,
        /// Files decoded in parallel [default: 2]
        #[arg(short, long)]
        parallel: Option<usize>,
        /// Stop after this many decoded files
        #[arg(long)]
        limit: Option<usize>,
        /// Write note -> type -> velocities, without quarter positions
        #[arg(long)]
        coarse: bool,
        /// JSON scan configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Rewrite velocities of a MIDI file from a database
    Humanize {
        /// Database file written by `scan`
        #[arg(short, long)]
        database: PathBuf,
        /// Source MIDI file
        #[arg(short, long)]
        input: PathBuf,
        /// Destination MIDI file
        #[arg(short, long)]
        output: PathBuf,
        /// Exclusive lower velocity bound [default: 0]
        #[arg(long)]
        min: Option<u8>,
        /// Exclusive upper velocity bound [default: 127]
        #[arg(long)]
        max: Option<u8>,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        /// Pool candidates over all quarter positions
        #[arg(long)]
        coarse: bool,
        /// JSON humanize configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the decoded events of a MIDI file as JSON
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            list,
            output,
            parallel,
            limit,
            coarse,
            config,
        } => {
            let mut scan_config = match config {
                Some(path) => ScanConfig::load(&path)
                    .with_context(|| format!("Failed to load scan config {}", path.display()))?,
                None => ScanConfig::default(),
            };
            if let Some(count) = parallel {
                scan_config = scan_config.with_concurrency(count);
            }
            if limit.is_some() {
                scan_config = scan_config.with_result_limit(limit);
            }
            if coarse {
                scan_config = scan_config.with_layout(DatabaseLayout::Coarse);
            }
            run_scan(&list, &output, &scan_config)
        }
        Commands::Humanize {
            database,
            input,
            output,
            min,
            max,
            seed,
            coarse,
            config,
        } => {
            let mut humanize_config = match config {
                Some(path) => HumanizeConfig::load(&path).with_context(|| {
                    format!("Failed to load humanize config {}", path.display())
                })?,
                None => HumanizeConfig::default(),
            };
            let window = VelocityWindow {
                min: min.unwrap_or(humanize_config.window.min),
                max: max.unwrap_or(humanize_config.window.max),
            };
            humanize_config = humanize_config.with_window(window);
            if seed.is_some() {
                humanize_config = humanize_config.with_seed(seed);
            }
            if coarse {
                humanize_config = humanize_config.with_granularity(Granularity::Coarse);
            }
            run_humanize(&database, &input, &output, &humanize_config)
        }
        Commands::Inspect { input } => run_inspect(&input),
    }
}

fn run_scan(list: &Path, output: &Path, config: &ScanConfig) -> Result<()> {
    config.validate().context("Invalid scan options")?;
    let paths = PathList::open(list)
        .with_context(|| format!("Failed to open path list {}", list.display()))?;

    let token = CancelToken::new();
    spawn_interrupt_listener(token.clone());

    let scanned = match scan_inputs(paths, config, token) {
        Ok(scanned) => scanned,
        Err(CorpusError::Cancelled { processed }) => {
            anyhow::bail!("Interrupted after {} files, no database written", processed)
        }
        Err(e @ CorpusError::PathList { .. }) => {
            return Err(e).with_context(|| format!("Failed to read path list {}", list.display()))
        }
        Err(e) => return Err(e).context("Scan failed"),
    };

    scanned
        .database
        .save(output, config.layout)
        .with_context(|| format!("Failed to write database {}", output.display()))?;

    info!("Scan stats: {:?}", scanned.stats);
    println!(
        "{} files, {} events -> {} keys, {} velocities ({:?}) written to {}",
        scanned.files,
        scanned.events,
        scanned.database.key_count(),
        scanned.database.velocity_count(),
        config.layout,
        output.display()
    );
    Ok(())
}

fn run_humanize(database: &Path, input: &Path, output: &Path, config: &HumanizeConfig) -> Result<()> {
    config.validate().context("Invalid humanize options")?;
    let db = load_database(database, config.granularity)
        .with_context(|| format!("Failed to load database {}", database.display()))?;

    let report = humanize_file(&db, input, output, config)
        .with_context(|| format!("Failed to humanize {}", input.display()))?;

    println!(
        "{} events: {} rewritten, {} unchanged, {} without candidates, {} silent",
        report.examined, report.rewritten, report.unchanged, report.missing, report.skipped_silent
    );
    Ok(())
}

fn run_inspect(input: &Path) -> Result<()> {
    let file = hz_midi::decode_file(input)
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &file).context("Failed to write JSON")?;
    writeln!(out)?;
    Ok(())
}

/// Cancel `token` on Ctrl-C.
///
/// The listener runs on its own thread with a single-threaded runtime, so the
/// scan itself stays on plain threads.
fn spawn_interrupt_listener(token: CancelToken) {
    let spawned = thread::Builder::new()
        .name("hz-interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                warn!("Interrupted, waiting for in-flight files");
                token.cancel();
            }
        });
    if let Err(e) = spawned {
        warn!("Ctrl-C handling unavailable: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_flags() {
        let cli = Cli::try_parse_from(["hz", "scan", "-l", "list.txt", "-o", "db.json", "-p", "4"])
            .unwrap();
        match cli.command {
            Commands::Scan {
                list,
                parallel,
                coarse,
                ..
            } => {
                assert_eq!(list, PathBuf::from("list.txt"));
                assert_eq!(parallel, Some(4));
                assert!(!coarse);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_humanize_requires_database() {
        assert!(Cli::try_parse_from(["hz", "humanize", "-i", "a.mid", "-o", "b.mid"]).is_err());
        let cli = Cli::try_parse_from([
            "hz", "humanize", "-d", "db.json", "-i", "a.mid", "-o", "b.mid", "--min", "20",
            "--max", "100",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Humanize {
                min: Some(20),
                max: Some(100),
                ..
            }
        ));
    }

    fn write_midi(path: &Path) {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&[0, 0, 0, 8, 0x00, 0x90, 60, 64, 0x00, 0xFF, 0x2F, 0x00]);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_scan_writes_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let midi = dir.path().join("a.mid");
        write_midi(&midi);

        let list = dir.path().join("list.txt");
        std::fs::write(&list, format!("{}\n", midi.display())).unwrap();
        let output = dir.path().join("db.json");

        run_scan(&list, &output, &ScanConfig::default()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "60": { "9": { "0": [64] } } }));
    }

    #[test]
    fn test_scan_unreadable_list_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let midi = dir.path().join("a.mid");
        write_midi(&midi);
        let list = dir.path().join("list.txt");
        let mut content = format!("{}\n", midi.display()).into_bytes();
        content.extend_from_slice(b"\xFF\xFE\nb.mid\n");
        std::fs::write(&list, content).unwrap();
        let output = dir.path().join("db.json");

        let err = run_scan(&list, &output, &ScanConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to read path list"));
        assert!(format!("{err:#}").contains("line 2"));
        assert!(!output.exists());
    }
}
