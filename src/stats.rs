//! Download statistics types.

use std::time::{Duration, Instant};

/// Statistics for a single file download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Bytes written.
    pub size: u64,
    /// Time taken to download the file.
    pub elapsed: Duration,
    /// Average download speed in bytes per second.
    pub average_speed: u64,
    /// Highest sampled speed in bytes per second.
    pub peak_speed: u64,
}

impl FileStats {
    /// Builds stats for `size` bytes moved in `elapsed`.
    #[must_use]
    pub fn new(size: u64, elapsed: Duration, peak_speed: u64) -> Self {
        let average_speed = bytes_per_second(size, elapsed);
        Self {
            size,
            elapsed,
            average_speed,
            peak_speed: peak_speed.max(average_speed),
        }
    }
}

/// Statistics for an entire download session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of files successfully downloaded.
    pub files_downloaded: usize,
    /// Number of files skipped (already complete, or no metadata).
    pub files_skipped: usize,
    /// Total bytes downloaded.
    pub total_bytes: u64,
    /// Total elapsed time for the session.
    pub elapsed: Duration,
    /// Highest per-file peak speed in bytes per second.
    pub peak_speed: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    /// Creates a new empty session stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            files_downloaded: 0,
            files_skipped: 0,
            total_bytes: 0,
            elapsed: Duration::ZERO,
            peak_speed: 0,
        }
    }

    /// Returns the average download speed in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_second(self.total_bytes, self.elapsed)
    }

    /// Folds another session's numbers into this one.
    pub fn merge(&mut self, other: &Self) {
        self.files_downloaded += other.files_downloaded;
        self.files_skipped += other.files_skipped;
        self.total_bytes += other.total_bytes;
        self.elapsed += other.elapsed;
        self.peak_speed = self.peak_speed.max(other.peak_speed);
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Builder for accumulating session statistics during downloads.
pub struct SessionStatsBuilder {
    files_downloaded: usize,
    files_skipped: usize,
    total_bytes: u64,
    start_time: Instant,
    peak_speed: u64,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    /// Creates a new session stats builder. The session clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files_downloaded: 0,
            files_skipped: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            peak_speed: 0,
        }
    }

    /// Records a skipped file.
    pub const fn add_skipped(&mut self) {
        self.files_skipped += 1;
    }

    /// Records a completed file download.
    pub fn add_download(&mut self, file_stats: &FileStats) {
        self.files_downloaded += 1;
        self.total_bytes += file_stats.size;
        self.peak_speed = self.peak_speed.max(file_stats.peak_speed);
    }

    /// Builds the final session statistics.
    #[must_use]
    pub fn build(self) -> SessionStats {
        SessionStats {
            files_downloaded: self.files_downloaded,
            files_skipped: self.files_skipped,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
            peak_speed: self.peak_speed,
        }
    }
}
