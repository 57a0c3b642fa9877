use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Destination for the export text produced by a query.
pub trait Clipboard: Send {
    fn name(&self) -> &str;
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// The desktop clipboard, reached through the platform's copy command.
pub struct SystemClipboard {
    program: &'static str,
    args: &'static [&'static str],
}

impl SystemClipboard {
    pub fn detect() -> Self {
        let (program, args): (&'static str, &'static [&'static str]) = if cfg!(target_os = "macos") {
            ("pbcopy", &[])
        } else if cfg!(target_os = "windows") {
            ("clip", &[])
        } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            ("wl-copy", &[])
        } else if command_exists("xclip") {
            ("xclip", &["-selection", "clipboard"])
        } else {
            ("xsel", &["--clipboard", "--input"])
        };
        Self { program, args }
    }
}

impl Clipboard for SystemClipboard {
    fn name(&self) -> &str {
        "clipboard"
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let mut child = Command::new(self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        // Close stdin before waiting so the command sees EOF, and reap it
        // even when the write fails.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin
                .write_all(text.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.program)),
            None => Err(anyhow!("Clipboard command has no stdin")),
        };
        let status = child.wait()?;
        written?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        debug!("Copied {} bytes with {}", text.len(), self.program);
        Ok(())
    }
}

fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Writes the export to a file instead of the clipboard.
pub struct FileClipboard {
    path: PathBuf,
    label: String,
}

impl FileClipboard {
    pub fn new(path: PathBuf) -> Self {
        let label = path.display().to_string();
        Self { path, label }
    }
}

impl Clipboard for FileClipboard {
    fn name(&self) -> &str {
        &self.label
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write export to {:?}", self.path))
    }
}

/// In-memory clipboard; clones share the captured texts.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    texts: Arc<Mutex<Vec<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent text written, if any.
    pub fn last(&self) -> Option<String> {
        self.texts.lock().ok().and_then(|texts| texts.last().cloned())
    }
}

impl Clipboard for MemoryClipboard {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.texts
            .lock()
            .map_err(|_| anyhow::anyhow!("clipboard lock poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_system_clipboard_pipes_text_to_command() {
        let mut clipboard = SystemClipboard {
            program: "cat",
            args: &[],
        };
        clipboard.write_text("=== a.com (1) ===").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_system_clipboard_reports_broken_pipe() {
        // `true` exits without reading; a write larger than the pipe buffer
        // fails, and the command is still waited on.
        let mut clipboard = SystemClipboard {
            program: "true",
            args: &[],
        };
        let text = "x".repeat(4 * 1024 * 1024);
        let err = clipboard.write_text(&text).unwrap_err();
        assert!(err.to_string().contains("Failed to write to true"));
    }

    #[test]
    fn test_file_clipboard_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.txt");
        let mut clipboard = FileClipboard::new(path.clone());

        clipboard.write_text("first").unwrap();
        clipboard.write_text("second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(clipboard.name(), path.display().to_string());
    }

    #[test]
    fn test_memory_clipboard_shares_between_clones() {
        let clipboard = MemoryClipboard::new();
        let mut writer = clipboard.clone();
        writer.write_text("hello").unwrap();
        assert_eq!(clipboard.last().as_deref(), Some("hello"));
    }
}
