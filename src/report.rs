//! Human-facing output: log lines, collapsible groups and tables.

use std::sync::{Arc, Mutex};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Output sink for query and mutation results. Nothing is read back.
pub trait Report: Send {
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn error(&mut self, message: &str);
    fn group_start(&mut self, title: &str);
    fn group_end(&mut self);
    fn table(&mut self, columns: &[&str], rows: &[Vec<String>]);
}

/// Writes to stdout with box-drawing separators.
#[derive(Debug)]
pub struct ConsoleReport {
    depth: usize,
    /// Cells longer than this are cut with an ellipsis.
    max_cell_width: usize,
}

impl ConsoleReport {
    pub fn new() -> Self {
        Self {
            depth: 0,
            max_cell_width: 80,
        }
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}

impl Default for ConsoleReport {
    fn default() -> Self {
        Self::new()
    }
}

impl Report for ConsoleReport {
    fn info(&mut self, message: &str) {
        println!("{}{}", self.indent(), message);
    }

    fn warn(&mut self, message: &str) {
        println!("{}⚠️  {}", self.indent(), message);
    }

    fn error(&mut self, message: &str) {
        eprintln!("{}❌ {}", self.indent(), message);
    }

    fn group_start(&mut self, title: &str) {
        println!("\n{}{}", self.indent(), title);
        println!("{}{}", self.indent(), RULE);
        self.depth += 1;
    }

    fn group_end(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        println!("{}{}", self.indent(), RULE);
    }

    fn table(&mut self, columns: &[&str], rows: &[Vec<String>]) {
        for line in render_table(columns, rows, self.max_cell_width) {
            println!("{}{}", self.indent(), line);
        }
    }
}

/// Keeps every line in memory. Clones share the same buffer, so a caller can
/// hand a clone to the engine and inspect it afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingReport {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    fn push(&mut self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl Report for RecordingReport {
    fn info(&mut self, message: &str) {
        self.push(format!("INFO {}", message));
    }

    fn warn(&mut self, message: &str) {
        self.push(format!("WARN {}", message));
    }

    fn error(&mut self, message: &str) {
        self.push(format!("ERROR {}", message));
    }

    fn group_start(&mut self, title: &str) {
        self.push(format!("GROUP {}", title));
    }

    fn group_end(&mut self) {
        self.push("END".to_string());
    }

    fn table(&mut self, columns: &[&str], rows: &[Vec<String>]) {
        for line in render_table(columns, rows, usize::MAX) {
            self.push(format!("TABLE {}", line));
        }
    }
}

/// Lay out rows under `columns` with a header rule, padding by char count.
pub fn render_table(columns: &[&str], rows: &[Vec<String>], max_cell_width: usize) -> Vec<String> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| truncate(row.get(i).map(String::as_str).unwrap_or(""), max_cell_width))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let format_row = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{:<width$}", value, width = *width))
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(format_row(columns.to_vec()));
    lines.push(
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─"),
    );
    for row in &cells {
        lines.push(format_row(row.iter().map(String::as_str).collect()));
    }
    lines
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let kept: String = value.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}
