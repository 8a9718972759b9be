use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use matchscout::{
    config::{parse_max_depth, EncodingMode, ScanConfig},
    results::{AggregateSnapshot, FileOutcome, ScanSummary},
    ProgressSink, ScanCoordinator, ScanError, ScanState,
};
use std::{num::NonZeroUsize, path::PathBuf, process, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, ScanError>;

/// Count regular-expression matches in every file under a directory
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Regular expression to count
    pattern: String,

    /// Directory to scan
    root: Option<PathBuf>,

    /// Maximum depth to descend; 1 scans only the root's direct children
    #[arg(long)]
    max_depth: Option<String>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Completed outcomes buffered ahead of the display
    #[arg(long)]
    buffer: Option<NonZeroUsize>,

    /// File extensions to include (e.g. rs,go,js)
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// Patterns to ignore (glob format)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// How to handle invalid UTF-8 sequences (failfast|lossy)
    #[arg(long)]
    encoding: Option<String>,

    /// Follow symbolic links
    #[arg(long)]
    follow_links: bool,

    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show only statistics, not per-file results
    #[arg(short, long)]
    stats: bool,

    /// Print the final summary as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(ScanState::Cancelled) => 1,
        Ok(_) => 0,
        // Already reported through the sink.
        Err(e) if e.is_input_error() => 2,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            1
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<ScanState> {
    let sink = Arc::new(TerminalSink::new(cli.stats, cli.json));

    let config = build_config(&cli).map_err(|e| {
        sink.on_input_error(&e.to_string());
        e
    })?;
    init_logging(&config.log_level);

    let mut coordinator = ScanCoordinator::new(sink.clone());
    coordinator.start(&config)?;
    let summary = coordinator.wait()?;
    sink.clear();

    if cli.json {
        println!("{}", summary.to_json()?);
    } else {
        print_summary(&summary);
    }
    Ok(summary.state)
}

fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let file_config = ScanConfig::load_from(cli.config.as_deref())?;
    let defaults = ScanConfig::default();

    let max_depth = cli.max_depth.as_deref().map(parse_max_depth).transpose()?;
    let encoding_mode = match cli.encoding.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("failfast") => EncodingMode::FailFast,
        Some("lossy") => EncodingMode::Lossy,
        Some(other) => {
            return Err(ScanError::config_error(format!(
                "unknown encoding mode '{}', expected failfast or lossy",
                other
            )))
        }
    };
    let file_extensions = cli.extensions.as_ref().map(|e| {
        e.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    });

    let cli_config = ScanConfig {
        root_path: defaults.root_path,
        pattern: cli.pattern.clone(),
        max_depth,
        file_extensions,
        ignore_patterns: cli.ignore.clone(),
        follow_links: cli.follow_links,
        thread_count: cli.threads.unwrap_or(defaults.thread_count),
        channel_capacity: cli.buffer.unwrap_or(defaults.channel_capacity),
        encoding_mode,
        log_level: cli.log_level.clone().unwrap_or(defaults.log_level),
    };

    let mut config = file_config.merge_with_cli(cli_config);
    // A root named on the command line wins even when it is the default `.`.
    if let Some(root) = &cli.root {
        config.root_path = root.clone();
    }
    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Renders scan progress on the terminal
struct TerminalSink {
    bar: ProgressBar,
    stats_only: bool,
    quiet: bool,
}

impl TerminalSink {
    fn new(stats_only: bool, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        Self {
            bar,
            stats_only,
            quiet,
        }
    }

    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ProgressSink for TerminalSink {
    fn on_scan_started(&self, _total_unknown: bool) {
        self.bar.set_message("discovering files");
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn on_total_known(&self, total: u64) {
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        self.bar.set_style(style);
        self.bar.set_length(total);
    }

    fn on_file_outcome(&self, outcome: &FileOutcome) {
        if !self.stats_only && !self.quiet {
            self.bar.suspend(|| println!("{}", format_outcome(outcome)));
        }
        self.bar.inc(1);
    }

    fn on_aggregate_update(&self, snapshot: &AggregateSnapshot) {
        self.bar
            .set_message(format!("({} with matches)", snapshot.files_with_match));
    }

    fn on_scan_finished(&self) {
        self.bar.finish_and_clear();
    }

    fn on_input_error(&self, message: &str) {
        eprintln!("{}: {}", "error".red().bold(), message);
    }
}

fn format_outcome(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Success {
            path,
            matches,
            elapsed,
        } => {
            // Sub-microsecond noise only clutters the output.
            let elapsed = Duration::from_micros(elapsed.as_micros() as u64);
            format!(
                "{}: {} matches ({})",
                path.display().to_string().blue(),
                matches.to_string().green(),
                humantime::format_duration(elapsed)
            )
        }
        FileOutcome::Failure { path, message } => {
            format!("{}: {}", path.display().to_string().blue(), message.red())
        }
    }
}

fn print_summary(summary: &ScanSummary) {
    let s = &summary.snapshot;
    if summary.state == ScanState::Cancelled {
        println!(
            "\nScan cancelled after {} of {} files",
            s.files_completed, summary.files_discovered
        );
    }
    println!(
        "\nScanned {} files in {}: {} with matches, {} failed",
        s.files_completed,
        humantime::format_duration(Duration::from_millis(summary.elapsed.as_millis() as u64)),
        s.files_with_match,
        s.files_failed
    );
    match s.mean() {
        Some(mean) => println!("Mean matches per matching file: {:.2}", mean),
        None => println!("Mean matches per matching file: n/a"),
    }
    println!("Files with matches: {:.2}%", s.match_percentage());
}
