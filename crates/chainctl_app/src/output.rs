use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};

/// User-facing output. In JSON mode every command prints exactly one JSON
/// document on stdout; in human mode results go to stdout and problems to
/// stderr.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    json: bool,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Prints `value` as JSON, or the text built by `human`.
    pub fn success<T, F>(&self, value: &T, human: F) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> String,
    {
        let text = if self.json {
            serde_json::to_string_pretty(value)?
        } else {
            human()
        };
        if !text.is_empty() {
            write_line(&mut io::stdout().lock(), &text)?;
        }
        Ok(())
    }

    /// Human-mode only; JSON output stays a single document.
    pub fn warn(&self, message: &str) {
        if !self.json {
            let _ = write_line(&mut io::stderr().lock(), &format!("[WARN] {message}"));
        }
    }

    pub fn error(&self, err: &anyhow::Error) {
        let message = format!("{err:#}");
        let _ = if self.json {
            write_line(&mut io::stdout().lock(), &json!({ "error": message }).to_string())
        } else {
            write_line(&mut io::stderr().lock(), &format!("[ERROR] {message}"))
        };
    }
}

/// A reader that went away (`chainctl ... | head`) is not an error.
fn write_line(out: &mut impl Write, text: &str) -> io::Result<()> {
    match writeln!(out, "{text}").and_then(|_| out.flush()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}
