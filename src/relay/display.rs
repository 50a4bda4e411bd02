//! Operator-facing chat display.
//!
//! Remote messages that decode successfully and every local line are shown
//! here. The console sink prefixes each line with a kitchen-clock timestamp
//! and the sender's address: `[3:04PM] 10.0.0.5:51234: hello`.

use std::net::SocketAddr;
use std::sync::Mutex;

/// Sink for chat lines shown to the operator.
pub trait ChatDisplay: Send + Sync {
    fn show(&self, sender: SocketAddr, text: &str);
}

/// Writes chat lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDisplay;

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self
    }
}

impl ChatDisplay for ConsoleDisplay {
    fn show(&self, sender: SocketAddr, text: &str) {
        println!("{}", format_line(chrono::Local::now(), sender, text));
    }
}

/// Keeps every shown line in memory, oldest first.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    lines: Mutex<Vec<(SocketAddr, String)>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(SocketAddr, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, text)| text).collect()
    }
}

impl ChatDisplay for RecordingDisplay {
    fn show(&self, sender: SocketAddr, text: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push((sender, text.to_string()));
    }
}

/// Render one console line.
pub fn format_line<Tz>(at: chrono::DateTime<Tz>, sender: SocketAddr, text: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {}: {}", at.format("%-I:%M%p"), sender, text)
}

/// Decoded plaintext as displayable text.
///
/// Trailing zero padding is removed and invalid UTF-8 is replaced.
pub fn printable(plaintext: &[u8]) -> String {
    let end = plaintext
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&plaintext[..end]).into_owned()
}
