//! Progress display module
//!
//! Handles displaying transfer progress in the CLI.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Transfer statistics for progress display
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Bytes written to the destination
    pub downloaded: u64,
    /// Total bytes; -1 while unknown
    pub total: i64,
    /// Transfer rate in bytes per second
    pub bytes_per_second: u64,
    /// Estimated remaining milliseconds; -1 while unknown
    pub eta_millis: i64,
    /// Progress (0.0 to 1.0)
    pub progress: f64,
}

impl TransferStats {
    /// Create new transfer stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: u64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Format an ETA in milliseconds; unknown renders as infinity
    pub fn format_eta(eta_millis: i64) -> String {
        if eta_millis < 0 {
            "∞".to_string()
        } else {
            Self::format_duration(Duration::from_millis(eta_millis as u64))
        }
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the transfer
    start_time: Instant,
    /// Last update time
    last_update: Instant,
    /// Update interval
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            update_interval: Duration::from_millis(500),
            quiet,
        }
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            update_interval: interval,
            quiet,
        }
    }

    /// Update the progress display, rate-limited to the update interval
    pub fn update(&mut self, stats: &TransferStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        if self.last_update.elapsed() < self.update_interval {
            return Ok(());
        }
        self.last_update = Instant::now();

        self.print_progress(stats)?;
        io::stdout().flush()?;

        Ok(())
    }

    /// Print progress bar
    pub fn print_progress(&mut self, stats: &TransferStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        // Clear the current line
        print!("\r\x1b[2K");

        let progress_percent = stats.progress * 100.0;

        let bar_width: usize = 40;
        let filled = (progress_percent / 100.0 * bar_width as f64) as usize;
        let empty = bar_width.saturating_sub(filled);
        let bar: String = "=".repeat(filled) + &" ".repeat(empty);

        let total_str = if stats.total >= 0 {
            TransferStats::format_bytes(stats.total as u64)
        } else {
            "?".to_string()
        };

        let line = format!(
            "[{}] {:.1}% | {} / {} | ↓ {} | ETA: {}",
            bar,
            progress_percent,
            TransferStats::format_bytes(stats.downloaded),
            total_str,
            TransferStats::format_speed(stats.bytes_per_second),
            TransferStats::format_eta(stats.eta_millis),
        );
        print!("{}", line);

        Ok(())
    }

    /// Print completion message
    pub fn print_complete(&self, stats: &TransferStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        // Clear the progress line
        print!("\r\x1b[2K");
        io::stdout().flush()?;

        println!();
        println!("Transfer Complete!");
        println!(
            "  Downloaded: {}",
            TransferStats::format_bytes(stats.downloaded)
        );
        println!(
            "  Elapsed Time: {}",
            TransferStats::format_duration(self.start_time.elapsed())
        );

        Ok(())
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(TransferStats::format_bytes(0), "0.00 B");
        assert_eq!(TransferStats::format_bytes(1024), "1.00 KB");
        assert_eq!(TransferStats::format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(TransferStats::format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(TransferStats::format_speed(1024), "1.00 KB/s");
        assert_eq!(TransferStats::format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(TransferStats::format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(TransferStats::format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(TransferStats::format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(TransferStats::format_eta(-1), "∞");
        assert_eq!(TransferStats::format_eta(5000), "5s");
    }

    #[test]
    fn test_transfer_stats_default() {
        let stats = TransferStats::default();
        assert_eq!(stats.downloaded, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.bytes_per_second, 0);
        assert_eq!(stats.progress, 0.0);
    }

    #[test]
    fn test_progress_display_new() {
        let display = ProgressDisplay::new(false);
        assert!(!display.is_quiet());
        assert_eq!(display.elapsed().as_secs(), 0);
    }

    #[test]
    fn test_progress_display_quiet() {
        let display = ProgressDisplay::new(true);
        assert!(display.is_quiet());
    }

    #[test]
    fn test_progress_display_with_interval() {
        let display = ProgressDisplay::with_interval(false, Duration::from_secs(2));
        assert!(!display.is_quiet());
    }
}
