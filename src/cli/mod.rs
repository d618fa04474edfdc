//! CLI mode - command-line interface for downloading share links.

mod progress;

use std::path::PathBuf;

pub use progress::{ConsoleProgress, print_summary};

use crate::{AppConfig, Downloader, SessionStats};

/// Options collected from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Share links, in the order given.
    pub urls: Vec<String>,
    /// Destination directory; overrides the configured one.
    pub output: Option<PathBuf>,
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
    /// Skip files that already exist with the expected size.
    pub skip_existing: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print usage and exit successfully.
    Help,
    /// Download the given links.
    Run(CliOptions),
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns a message for unknown options, options missing their value, or
/// an empty link list.
pub fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let args: Vec<String> = args.into_iter().collect();
    let mut options = CliOptions::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                i += 1;
                let value = args.get(i).ok_or("--output requires a directory")?;
                options.output = Some(PathBuf::from(value));
            }
            "-c" | "--config" => {
                i += 1;
                let value = args.get(i).ok_or("--config requires a file")?;
                options.config = Some(PathBuf::from(value));
            }
            "--skip-existing" => options.skip_existing = true,
            "-q" | "--quiet" => options.quiet = true,
            "-h" | "--help" => return Ok(Command::Help),
            arg if !arg.starts_with('-') => options.urls.push(arg.to_string()),
            other => return Err(format!("Unknown option: {other}")),
        }
        i += 1;
    }

    if options.urls.is_empty() {
        return Err("no links given".to_string());
    }
    Ok(Command::Run(options))
}

/// Prints usage to stderr.
pub fn print_usage() {
    eprintln!("Usage: megalink [OPTIONS] <url>...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <url>                 MEGA file or folder share link (key included)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <DIR>    Destination directory (default: current directory)");
    eprintln!("  -c, --config <FILE>   Configuration file (TOML)");
    eprintln!("      --skip-existing   Skip files already present with the expected size");
    eprintln!("  -q, --quiet           No progress output");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG              Log filter (e.g. megalink=debug)");
}

/// Downloads every link in `options`, one after another.
///
/// Returns `true` if all links succeeded. A failing link is reported and
/// the remaining links are still attempted.
pub async fn run(options: CliOptions) -> bool {
    let config = match AppConfig::load(options.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return false;
        }
    };

    let mut download_config = config.download;
    if options.skip_existing {
        download_config = download_config.with_skip_existing(true);
    }
    let output = options.output.unwrap_or(config.output_dir);

    let downloader = match Downloader::new(download_config) {
        Ok(downloader) => downloader,
        Err(e) => {
            eprintln!("Error: {e}");
            return false;
        }
    };

    let console = if options.quiet {
        ConsoleProgress::hidden()
    } else {
        ConsoleProgress::new()
    };

    let mut totals = SessionStats::new();
    let mut failures = 0usize;
    for url in &options.urls {
        match downloader.download(url, &output, &console).await {
            Ok(done) => {
                log::info!("{url}: {} file(s) written", done.paths.len());
                totals.merge(&done.stats);
            }
            Err(e) => {
                failures += 1;
                console.finish();
                eprintln!("Error: {url}: {e}");
            }
        }
    }
    console.finish();

    if !options.quiet {
        print_summary(&totals);
    }
    if failures > 0 {
        eprintln!("{failures} of {} link(s) failed", options.urls.len());
    }
    failures == 0
}
