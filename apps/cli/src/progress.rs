//! Single-line progress output on stderr.

use std::io::Write;
use std::time::{Duration, Instant};

use filemail_client::{SpeedCalculator, TransferProgress};

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Redraws one status line as chunks are acknowledged.
pub struct ProgressPrinter {
    speed: SpeedCalculator,
    last_file: String,
    last_draw: Option<Instant>,
    quiet: bool,
}

impl ProgressPrinter {
    pub fn new(quiet: bool) -> Self {
        Self {
            speed: SpeedCalculator::default(),
            last_file: String::new(),
            last_draw: None,
            quiet,
        }
    }

    pub fn update(&mut self, p: &TransferProgress) {
        if p.file_name != self.last_file {
            self.last_file.clone_from(&p.file_name);
            self.speed.reset();
        }
        self.speed.record(p.transferred_bytes);

        if self.quiet {
            return;
        }
        let due = self
            .last_draw
            .is_none_or(|t| t.elapsed() >= REDRAW_INTERVAL);
        if !due && !p.is_done() {
            return;
        }
        self.last_draw = Some(Instant::now());

        let remaining = p.total_bytes.saturating_sub(p.transferred_bytes);
        let line = render(p, self.speed.bytes_per_second(), self.speed.eta(remaining));
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[2K{line}");
        if p.is_done() {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }
}

fn render(p: &TransferProgress, bytes_per_sec: f64, eta: Option<Duration>) -> String {
    let mut line = format!(
        "{} {:5.1}% {}/{}",
        p.file_name,
        p.percent(),
        format_bytes(p.transferred_bytes),
        format_bytes(p.total_bytes)
    );
    if bytes_per_sec > 0.0 {
        line.push_str(&format!("  {}/s", format_bytes(bytes_per_sec as u64)));
    }
    if let Some(eta) = eta {
        line.push_str(&format!("  ETA {}", format_duration(eta)));
    }
    line
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m{s:02}s"),
        (h, m, _) => format!("{h}h{m:02}m"),
    }
}
