//! Shared helpers for the timing benches: per-iteration clocks and a
//! markdown report kept under `crates/attention/benchmarks/`.

use std::{fs, path::Path, time::Instant};

const REPORT: &str = "crates/attention/benchmarks/RESULTS.md";

/// Per-iteration wall-clock samples, in milliseconds.
pub struct Timing {
    millis: Vec<f64>,
}

impl Timing {
    /// Runs `body` `warmup` times unclocked, then `iterations` times clocked.
    pub fn collect<E>(
        warmup: usize,
        iterations: usize,
        mut body: impl FnMut() -> Result<(), E>,
    ) -> Result<Self, E> {
        for _ in 0..warmup {
            body()?;
        }
        let mut millis = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let start = Instant::now();
            body()?;
            millis.push(start.elapsed().as_secs_f64() * 1e3);
        }
        millis.sort_by(f64::total_cmp);
        Ok(Self { millis })
    }

    pub fn percentile(&self, q: f64) -> f64 {
        if self.millis.is_empty() {
            return f64::NAN;
        }
        let idx = ((self.millis.len() - 1) as f64 * q).round() as usize;
        self.millis[idx]
    }

    pub fn calls_per_sec(&self) -> f64 {
        let total: f64 = self.millis.iter().sum();
        self.millis.len() as f64 * 1e3 / total
    }
}

pub fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let line = |cells: &[String]| format!("| {} |\n", cells.join(" | "));
    let mut table = line(&headers.iter().map(|h| h.to_string()).collect::<Vec<_>>());
    table.push_str(&line(&vec!["---".to_string(); headers.len()]));
    for row in rows {
        table.push_str(&line(row));
    }
    table
}

/// Replaces (or appends) the `section` block of the report.
pub fn record_section(section: &str, table: &str) -> std::io::Result<()> {
    let tag = section.to_uppercase();
    let (open, close) = (format!("<!-- {tag}_START -->"), format!("<!-- {tag}_END -->"));
    let block = format!("{open}\n## {section}\n\n{table}{close}\n");

    let path = Path::new(REPORT);
    let mut report = match fs::read_to_string(path) {
        Ok(existing) => existing,
        Err(_) => "# Variational Attention Benchmarks\n\n".to_string(),
    };
    match (report.find(&open), report.find(&close)) {
        (Some(start), Some(end)) if start < end => {
            let mut end = end + close.len();
            if report[end..].starts_with('\n') {
                end += 1;
            }
            report.replace_range(start..end, &block);
        }
        _ => {
            if !report.ends_with('\n') {
                report.push('\n');
            }
            report.push_str(&block);
        }
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, report)
}
