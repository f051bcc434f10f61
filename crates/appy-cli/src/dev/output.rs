//! Classification of the web dev server's output.
//!
//! The dev server reports its lifecycle only as text, so lines are matched
//! against the markers webpack-dev-server prints. The rules live behind the
//! [`OutputClassifier`] trait so another build tool can be supported without
//! touching the supervisor.

use crate::dev::ReadinessSignal;
use crate::ui;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

static DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r" ([0-9]+ms)").expect("valid regex"));

/// What a single line of dev-server output means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Empty line while compiling or before any output
    Blank,
    /// The build tool's own banner lines
    ToolNoise,
    CompileStart,
    /// `duration` is the `<digits>ms` figure when the line carries one;
    /// `first` is set only for the first success of the run
    CompileSuccess {
        duration: Option<String>,
        first: bool,
    },
    CompileFailure,
    /// Anything else, forwarded verbatim
    Other(String),
}

/// Turns dev-server output lines into lifecycle signals.
pub trait OutputClassifier: Send {
    fn classify(&mut self, line: &str) -> OutputLine;
}

/// Marker rules for webpack-dev-server.
#[derive(Debug, Clone)]
pub struct WebpackClassifier {
    is_first_time: bool,
    is_compiling: bool,
}

impl Default for WebpackClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebpackClassifier {
    pub fn new() -> Self {
        Self {
            is_first_time: true,
            is_compiling: false,
        }
    }

    pub fn is_first_time(&self) -> bool {
        self.is_first_time
    }

    pub fn is_compiling(&self) -> bool {
        self.is_compiling
    }
}

impl OutputClassifier for WebpackClassifier {
    fn classify(&mut self, line: &str) -> OutputLine {
        let text = line.trim_matches(' ');

        if text.is_empty() && (self.is_compiling || self.is_first_time) {
            return OutputLine::Blank;
        }

        if text.contains("｢wdm｣")
            || text.starts_with("> ")
            || (self.is_compiling && text.contains("｢wds｣"))
        {
            return OutputLine::ToolNoise;
        }

        if text.contains("Compiling...") || text.contains("｢wds｣") {
            self.is_compiling = true;
            return OutputLine::CompileStart;
        }

        if text.contains("Compiled successfully in") {
            self.is_compiling = false;
            let duration = DURATION
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            let first = std::mem::replace(&mut self.is_first_time, false);
            return OutputLine::CompileSuccess { duration, first };
        }

        if text.starts_with("ERROR  Failed to compile") {
            return OutputLine::CompileFailure;
        }

        if text.is_empty() {
            OutputLine::Blank
        } else {
            OutputLine::Other(text.to_string())
        }
    }
}

/// Print the user-facing line for a classification.
pub fn report(line: &OutputLine) {
    match line {
        OutputLine::Blank | OutputLine::ToolNoise => {}
        OutputLine::CompileStart => ui::info("* [wds] Compiling..."),
        OutputLine::CompileSuccess { duration, .. } => match duration {
            Some(duration) => ui::info(&format!("* [wds] Compiled successfully in {}", duration)),
            None => ui::info("* [wds] Compiled successfully"),
        },
        OutputLine::CompileFailure => {
            ui::info("* [wds] Failed to compile.");
            ui::info("");
        }
        OutputLine::Other(text) => ui::info(text),
    }
}

/// Next line from `reader` without its line ending. Invalid UTF-8 is
/// replaced rather than treated as an error; `None` at end of stream.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Read the dev server's stdout to the end, reporting each line and raising
/// `readiness` on the first successful compile.
pub async fn consume_stdout<R, C>(stdout: R, classifier: &mut C, readiness: &ReadinessSignal)
where
    R: AsyncRead + Unpin,
    C: OutputClassifier + ?Sized,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                let classified = classifier.classify(&line);
                if let OutputLine::CompileSuccess { first: true, .. } = classified {
                    readiness.fire();
                }
                report(&classified);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!("web stdout read failed: {}", err);
                break;
            }
        }
    }
}

/// Read the dev server's stderr to the end and return the trimmed lines
/// joined with newlines. Empty when nothing was written.
pub async fn collect_stderr<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut collected = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => collected.push(line.trim_matches(' ').to_string()),
            Ok(None) => break,
            Err(err) => {
                tracing::debug!("web stderr read failed: {}", err);
                break;
            }
        }
    }

    let joined = collected.join("\n");
    if joined.trim().is_empty() {
        String::new()
    } else {
        joined
    }
}
