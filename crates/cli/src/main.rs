use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bookscan_core::config::{apply_env, config_path, load_config, load_config_from, save_config_to, set_config_key, AppConfig};
use bookscan_core::error::LookupError;
use bookscan_core::isbn::{self, BookIdentifier};
use bookscan_core::lookup::rakuten::RakutenBooksProvider;
use bookscan_core::progress::{ProgressEvent, ProgressHandler};
use bookscan_core::scan::{CaptureControl, Detection, DetectionOutcome, ScanCoordinator, ScanObserver, ScanState, Symbology};
use bookscan_core::Url;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "bookscan")]
#[command(about = "Scan ISBN/QR codes and look books up in an online catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log lookups and gate transitions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate ISBN-13 codes and derive marketplace URLs (offline)
    Isbn {
        /// 13-digit codes
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Look up a single ISBN-13 in the catalog
    Lookup {
        /// 13-digit code
        #[arg(required = true)]
        code: String,
    },

    /// Run a scan session fed by `<symbology> <payload>` lines on stdin
    Scan {
        /// Stay paused after the first result instead of resuming capture
        #[arg(long)]
        no_resume: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "bookscan=info,bookscan_core=info"
    } else {
        "bookscan=warn,bookscan_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_file = cli.config.clone().or_else(config_path);
    let result = match &cli.command {
        Commands::Isbn { codes } => run_isbn(codes, cli.json),
        Commands::Lookup { code } => load(cli.config.as_deref()).and_then(|cfg| run_lookup(&cfg, code, cli.json)),
        Commands::Scan { no_resume } => load(cli.config.as_deref()).and_then(|cfg| run_scan(&cfg, !*no_resume, cli.json)),
        Commands::Config { action } => run_config(action, config_file.as_deref(), cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error + Send + Sync>> {
    match explicit {
        Some(path) if path.exists() => Ok(apply_env(load_config_from(path)?, |k| std::env::var(k).ok())),
        Some(_) => Ok(apply_env(AppConfig::default(), |k| std::env::var(k).ok())),
        None => Ok(load_config()),
    }
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}

#[derive(serde::Serialize)]
struct BookReport<'a> {
    isbn13: &'a str,
    isbn10: Option<String>,
    ean13_checksum_ok: bool,
    title: Option<&'a str>,
    marketplace_url: Option<&'a str>,
    storefront_url: Option<&'a str>,
}

impl<'a> BookReport<'a> {
    fn new(book: &'a BookIdentifier) -> Self {
        Self {
            isbn13: book.digits(),
            isbn10: book.isbn10(),
            ean13_checksum_ok: book.has_valid_ean13_checksum(),
            title: book.title(),
            marketplace_url: book.marketplace_url_primary().map(Url::as_str),
            storefront_url: book.marketplace_url_secondary().map(Url::as_str),
        }
    }

    fn print_text(&self) {
        println!("ISBN-13: {}", self.isbn13);
        if let Some(isbn10) = &self.isbn10 {
            println!("ISBN-10: {}", isbn10);
        }
        if !self.ean13_checksum_ok {
            println!("Warning: EAN-13 check digit does not match");
        }
        if let Some(t) = self.title {
            println!("Title: {}", t);
        }
        if let Some(u) = self.marketplace_url {
            println!("Marketplace: {}", u);
        }
        if let Some(u) = self.storefront_url {
            println!("Storefront: {}", u);
        }
    }
}

fn run_isbn(codes: &[String], json: bool) -> CliResult {
    let mut books = Vec::new();
    for code in codes {
        books.push(code.parse::<BookIdentifier>()?);
    }
    if json {
        let reports: Vec<BookReport> = books.iter().map(BookReport::new).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for book in &books {
            BookReport::new(book).print_text();
            if !book.is_bookland() {
                println!("Not a Bookland (978/979) code: no marketplace URL");
            }
        }
    }
    Ok(())
}

/// Renders body progress on a spinner.
struct SpinnerProgress(ProgressBar);

impl SpinnerProgress {
    fn new(isbn: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
        bar.set_message(format!("Looking up {}", isbn));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self(bar)
    }
}

impl ProgressHandler for SpinnerProgress {
    fn on_progress(&self, event: ProgressEvent) {
        match event.total {
            Some(total) => self.0.set_message(format!("{}: {}/{} bytes", event.isbn, event.received, total)),
            None => self.0.set_message(format!("{}: {} bytes", event.isbn, event.received)),
        }
    }
}

fn run_lookup(cfg: &AppConfig, code: &str, json: bool) -> CliResult {
    let book: BookIdentifier = code.parse()?;
    let rt = runtime()?;
    let provider = RakutenBooksProvider::new(&cfg.catalog, rt.handle().clone())?;
    let spinner = Arc::new(SpinnerProgress::new(book.digits()));
    let provider = provider.with_progress(spinner.clone());

    let result = rt.block_on(provider.query(book.digits()));
    spinner.0.finish_and_clear();

    let book = book.with_catalog_item(result?);
    let report = BookReport::new(&book);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_text();
    }
    Ok(())
}

/// Stand-in for a camera: stdin keeps flowing, the flag records whether
/// decoded lines are being consumed.
#[derive(Default)]
struct TerminalCapture {
    running: AtomicBool,
}

impl CaptureControl for TerminalCapture {
    fn start_capture(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("capture running");
    }

    fn stop_capture(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("capture paused");
    }
}

enum ScanEvent {
    Qr { text: String, links: Vec<Url> },
    Book(Result<BookIdentifier, LookupError>),
}

struct ChannelObserver(mpsc::UnboundedSender<ScanEvent>);

impl ScanObserver for ChannelObserver {
    fn on_qr(&self, text: &str, links: Vec<Url>) {
        let _ = self.0.send(ScanEvent::Qr {
            text: text.to_string(),
            links,
        });
    }

    fn on_book(&self, result: Result<BookIdentifier, LookupError>) {
        let _ = self.0.send(ScanEvent::Book(result));
    }
}

/// `EAN13 9784798140628` / `QR any text`. A bare 13-digit line counts as EAN-13.
fn parse_detection(line: &str) -> Option<Detection> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((label, payload)) => Some(Detection::new(Symbology::from_label(label), payload.trim_start())),
        None if isbn::validate(line).is_some() => Some(Detection::ean13(line)),
        None => None,
    }
}

fn print_event(event: &ScanEvent, json: bool) -> CliResult {
    match event {
        ScanEvent::Qr { text, links } => {
            let links: Vec<&str> = links.iter().map(Url::as_str).collect();
            if json {
                println!("{}", serde_json::json!({ "kind": "qr", "text": text, "links": links }));
            } else {
                println!("QR: {}", text);
                for link in links {
                    println!("  link: {}", link);
                }
            }
        }
        ScanEvent::Book(Ok(book)) => {
            let report = BookReport::new(book);
            if json {
                println!("{}", serde_json::json!({ "kind": "book", "book": serde_json::to_value(&report)? }));
            } else {
                report.print_text();
            }
        }
        ScanEvent::Book(Err(e)) => {
            if json {
                println!("{}", serde_json::json!({ "kind": "error", "message": e.to_string() }));
            } else {
                println!("Lookup failed: {}", e);
            }
        }
    }
    Ok(())
}

fn run_scan(cfg: &AppConfig, auto_resume: bool, json: bool) -> CliResult {
    let rt = runtime()?;
    let provider = Arc::new(RakutenBooksProvider::new(&cfg.catalog, rt.handle().clone())?);
    rt.block_on(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let coordinator = ScanCoordinator::new(
            provider,
            Arc::new(TerminalCapture::default()),
            Arc::new(ChannelObserver(tx)),
        );
        coordinator.start();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut input_open = true;
        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => match line? {
                    Some(line) => {
                        if let Some(detection) = parse_detection(&line) {
                            let outcome = coordinator.on_detection(detection);
                            if let DetectionOutcome::Ignored(reason) = outcome {
                                tracing::debug!(?reason, "detection ignored");
                            }
                        }
                    }
                    None => input_open = false,
                },
                Some(event) = rx.recv() => {
                    print_event(&event, json)?;
                    if auto_resume {
                        coordinator.resume();
                    }
                },
                else => break,
            }
            if !input_open && coordinator.state() != ScanState::AwaitingResult {
                break;
            }
        }
        // drain anything delivered alongside end of input
        while let Ok(event) = rx.try_recv() {
            print_event(&event, json)?;
        }
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    })
}

fn run_config(action: &ConfigAction, path: Option<&Path>, json: bool) -> CliResult {
    let path = path.ok_or("Could not determine config directory")?;
    match action {
        ConfigAction::Init => {
            save_config_to(&AppConfig::default(), path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = if path.exists() { load_config_from(path)? } else { AppConfig::default() };
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let mut cfg = if path.exists() { load_config_from(path)? } else { AppConfig::default() };
            set_config_key(&mut cfg, key, value)?;
            save_config_to(&cfg, path)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}
