use std::io::Write;

use crate::outcome::{BatchReport, Tally};

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;

    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}

/// Progress line for the terminal, updated from each `BatchReport`.
#[derive(Debug, Default)]
pub struct BatchStatistics {
    pub windows_done: usize,
    pub windows_total: usize,
    pub tally: Tally,
}

impl BatchStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, report: &BatchReport) {
        self.windows_done = report.window;
        self.windows_total = report.windows;
        self.tally = report.tally.clone();
    }

    pub fn line(&self) -> String {
        format!(
            "Batch {} of {}: {} saved, {} failed ({})",
            self.windows_done,
            self.windows_total,
            self.tally.succeeded,
            self.tally.failed,
            format_bytes(self.tally.bytes)
        )
    }

    pub fn print(&self) {
        print!("\x1b[2K\r{}", self.line());
        let _ = std::io::stdout().lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1024.00 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_bytes(u64::MAX), "16777216.00 TiB");
    }

    #[test]
    fn progress_line() {
        let mut stats = BatchStatistics::new();
        stats.update(&BatchReport {
            window: 2,
            windows: 3,
            tally: Tally {
                attempted: 4,
                succeeded: 3,
                failed: 1,
                bytes: 2048 * 1024,
            },
            outcomes: vec![],
        });
        assert_eq!(stats.line(), "Batch 2 of 3: 3 saved, 1 failed (2.00 MiB)");
    }
}
