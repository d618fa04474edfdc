//! Console rendering of progress events and the session summary.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{DownloadProgress, ProgressEvent, SessionStats, Stage, format_bytes, format_duration, format_line};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Renders progress events on the terminal.
///
/// In-progress lines replace the spinner message; `done` and `error` lines
/// are printed above it and stay on screen.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    /// Creates a renderer with a ticking spinner.
    pub fn new() -> Self {
        Self::with_bar(make_spinner())
    }

    /// Creates a renderer that draws nothing, used for `--quiet`.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    const fn with_bar(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// Clears the spinner line.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadProgress for ConsoleProgress {
    fn on_event(&self, event: &ProgressEvent) {
        let line = format_line(event);
        match event.stage {
            Stage::Starting | Stage::Downloading => self.bar.set_message(line),
            Stage::Done => self.bar.println(line),
            Stage::Error => self.bar.println(style(line).red().to_string()),
        }
    }
}

fn make_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(template);
    }
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

/// Prints a summary of download statistics.
pub fn print_summary(stats: &SessionStats) {
    if stats.files_downloaded == 0 && stats.files_skipped == 0 {
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    if stats.files_downloaded > 0 {
        println!("  Files downloaded:  {}", stats.files_downloaded);
        println!("  Total size:        {}", format_bytes(stats.total_bytes));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!(
            "  Average speed:     {}/s",
            format_bytes(stats.average_speed())
        );
        println!("  Peak speed:        {}/s", format_bytes(stats.peak_speed));
    }

    if stats.files_skipped > 0 {
        println!("  Files skipped:     {}", stats.files_skipped);
    }

    println!("{SEPARATOR}");
}
