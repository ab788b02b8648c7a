//! cardsweep - Scan MIFARE Classic card images against default keys
//!
//! This tool replays card memory images through the same session the
//! reader runs against a live tag, printing every block a default key opens.
//! It can also build SELECT APDUs and decode their responses.

use anyhow::{bail, Context, Result};
use cardsweep_core::{
    build_select_apdu, bytes_to_hex, hex_to_bytes, CardReader, ClassicLayout, DumpCard, KeyOrder,
    KeyTable, ReportSink, ScanResult, ScannerConfig, SelectResponse, SessionReport, SessionState,
    SinkRef,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Scan MIFARE Classic card images against well-known default keys
#[derive(Parser, Debug)]
#[command(name = "cardsweep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan card images for sectors opened by a candidate key
    Scan(ScanArgs),
    /// Build a SELECT AID command, optionally decoding a response
    Apdu(ApduArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    input: InputMode,

    /// Key file with one 12-digit hex key per line (default: built-in table)
    #[arg(short, long)]
    keys: Option<PathBuf>,

    /// Probe the key that opened the previous sector first
    #[arg(long)]
    memoize_keys: bool,

    /// Block whose text is reported as the account identifier
    #[arg(long)]
    account_block: Option<usize>,

    /// Output format for block contents
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single card image
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of card images to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApduArgs {
    /// Application identifier in hex
    #[arg(default_value = cardsweep_core::SAMPLE_LOYALTY_AID)]
    aid: String,

    /// Response bytes in hex (payload followed by the status word)
    #[arg(short, long)]
    response: Option<String>,
}

/// Output format for block contents
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Block contents decoded as UTF-8
    Text,
    /// Block contents as hex
    Hex,
}

/// Prints session events to stdout
struct PrintSink {
    format: OutputFormat,
}

impl PrintSink {
    fn format_result(&self, result: &ScanResult) -> String {
        let data = match self.format {
            OutputFormat::Text => result.text().escape_debug().to_string(),
            OutputFormat::Hex => result.data_hex(),
        };
        format!(
            "sector {:>2} block {:>3} key {} | {}",
            result.sector, result.block, result.key, data
        )
    }
}

impl ReportSink for PrintSink {
    fn on_scan_result(&self, result: &ScanResult) {
        println!("{}", self.format_result(result));
    }

    fn on_account_received(&self, account: &str) {
        println!("Account: {}", account);
    }
}

/// Tracks card images already scanned, by content
#[derive(Default)]
struct ImageRegistry {
    /// Maps content hash -> first path seen with it
    seen: HashMap<blake3::Hash, PathBuf>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    scanned: usize,
    duplicates_skipped: usize,
    failed: usize,
    blocks: usize,
}

impl ImageRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Short form of a content hash for log output (first 8 chars)
    fn short_hash(hash: &blake3::Hash) -> String {
        hash.to_hex()[..8].to_string()
    }

    /// Register an image; returns false if identical content was already seen
    fn register(&mut self, path: &Path, image: &[u8]) -> bool {
        let hash = blake3::hash(image);
        if let Some(first) = self.seen.get(&hash) {
            debug!(
                "Skipping duplicate: {} (same content as {}, {})",
                path.display(),
                first.display(),
                Self::short_hash(&hash)
            );
            self.stats.duplicates_skipped += 1;
            return false;
        }
        trace!("{}: content {}", path.display(), Self::short_hash(&hash));
        self.seen.insert(hash, path.to_path_buf());
        true
    }

    fn record(&mut self, report: &SessionReport) {
        self.stats.scanned += 1;
        self.stats.blocks += report.results().len();
        if report.state() == SessionState::Failed {
            self.stats.failed += 1;
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} scanned, {} duplicates skipped, {} failed, {} blocks read",
            self.stats.scanned, self.stats.duplicates_skipped, self.stats.failed, self.stats.blocks
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match &cli.command {
        Command::Scan(args) => run_scan(args),
        Command::Apdu(args) => run_apdu(args),
    }
}

/// Build the card reader described by the scan arguments
fn build_reader(args: &ScanArgs, sink: &Arc<PrintSink>) -> Result<CardReader> {
    let keys = match &args.keys {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file: {}", path.display()))?;
            KeyTable::parse(&text)
                .with_context(|| format!("Invalid key file: {}", path.display()))?
        }
        None => KeyTable::default(),
    };
    debug!("Probing with {} candidate keys", keys.len());

    let order = if args.memoize_keys {
        KeyOrder::LastSuccessFirst
    } else {
        KeyOrder::TableOrder
    };
    let mut reader = CardReader::with_config(keys, ScannerConfig::new().key_order(order))
        .sink(SinkRef::new(sink));
    if let Some(block) = args.account_block {
        reader = reader.account_block(block);
    }
    Ok(reader)
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let sink = Arc::new(PrintSink {
        format: args.format,
    });
    let reader = build_reader(args, &sink)?;

    if let Some(ref file) = args.input.file {
        process_single_file(&reader, file)
    } else if let Some(ref directory) = args.input.directory {
        process_directory(&reader, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Scan a single card image
fn process_single_file(reader: &CardReader, file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let image = fs::read(file)
        .with_context(|| format!("Failed to read card image: {}", file.display()))?;
    let report = process_image(reader, file, image)?;

    if let Some(err) = report.error() {
        bail!("Scan of {} failed: {}", file.display(), err);
    }
    if report.results().is_empty() {
        println!("No sector of {} opened with the candidate keys", file.display());
    }
    Ok(())
}

/// Scan every card image under a directory
fn process_directory(reader: &CardReader, directory: &Path) -> Result<()> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());
    let mut registry = ImageRegistry::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || is_hidden(path) {
            continue;
        }
        if !is_likely_card_image(path) {
            trace!("Skipping non-image: {}", path.display());
            continue;
        }

        let image = match fs::read(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                continue;
            }
        };
        if !registry.register(path, &image) {
            continue;
        }

        println!("== {}", path.display());
        match process_image(reader, path, image) {
            Ok(report) => {
                if let Some(err) = report.error() {
                    // Log error but continue with other images
                    warn!("Error scanning {}: {}", path.display(), err);
                }
                registry.record(&report);
            }
            Err(e) => warn!("Error processing {}: {:#}", path.display(), e),
        }
    }

    registry.print_summary();
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// A card image is recognized by its size alone
fn is_likely_card_image(path: &Path) -> bool {
    fs::metadata(path)
        .ok()
        .and_then(|metadata| usize::try_from(metadata.len()).ok())
        .map(|len| ClassicLayout::from_image_len(len).is_ok())
        .unwrap_or(false)
}

/// Run one card session over an image
fn process_image(reader: &CardReader, path: &Path, image: Vec<u8>) -> Result<SessionReport> {
    let mut card = DumpCard::from_bytes(image)
        .with_context(|| format!("Not a card image: {}", path.display()))?;
    debug!("{}: {:?} layout", path.display(), card.layout());

    let report = reader.on_card_discovered(&mut card);
    debug!(
        "{}: session {} ({} of {} sectors opened, {} authentication attempts)",
        path.display(),
        report.state(),
        report.stats().sectors_authenticated,
        card.layout().sector_count(),
        report.stats().auth_attempts
    );
    Ok(report)
}

fn run_apdu(args: &ApduArgs) -> Result<()> {
    let apdu = build_select_apdu(&args.aid)
        .with_context(|| format!("Cannot build SELECT for AID '{}'", args.aid))?;
    println!("SELECT: {}", bytes_to_hex(&apdu));

    if let Some(ref response) = args.response {
        let raw = hex_to_bytes(response).context("Response is not valid hex")?;
        let response = SelectResponse::parse(&raw)?;
        println!("Status: {}", response.status_hex());
        match response.account() {
            Some(account) => println!("Account: {}", account),
            None => println!("Service rejected the SELECT"),
        }
    }

    Ok(())
}
