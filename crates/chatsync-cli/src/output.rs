//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chatsync_core::{ChatPresenter, ErrorReport, FeedView, Message};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the feed as the presenter sees it
    pub fn print_feed(&self, presenter: &ChatPresenter) {
        match presenter.feed() {
            FeedView::Loading => {
                if self.format == OutputFormat::Human {
                    println!("Loading messages...");
                }
            }
            FeedView::Empty => self.print_messages(&[], presenter),
            FeedView::Messages(messages) => self.print_messages(&messages, presenter),
        }
    }

    /// Print a list of messages
    pub fn print_messages(&self, messages: &[Message], presenter: &ChatPresenter) {
        match self.format {
            OutputFormat::Human => {
                if messages.is_empty() {
                    println!("No messages yet.");
                    return;
                }
                for message in messages {
                    println!("{}", format_line(message, presenter.is_own(message)));
                }
                println!("\n{} message(s)", messages.len());
            }
            OutputFormat::Json => {
                println!("{}", json_string(messages));
            }
            OutputFormat::Quiet => {
                for message in messages {
                    println!("{}", message.id);
                }
            }
        }
    }

    /// Print a failure reported by the session
    ///
    /// Goes to stderr so it never interleaves with feed output.
    pub fn print_failure(&self, report: &ErrorReport) {
        match self.format {
            OutputFormat::Human => {
                let marker = if report.soft { "·" } else { "⚠" };
                eprintln!("{} {} failed: {}", marker, report.operation, report.message);
            }
            OutputFormat::Json => {
                eprintln!("{}", json_string(report));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning that did not come from the session
    pub fn warn(&self, msg: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", msg);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One feed line: `<id> | <time> | <author> | <text>`, own messages starred
fn format_line(message: &Message, own: bool) -> String {
    let author = if own {
        format!("*{}", message.username)
    } else {
        message.username.clone()
    };
    format!(
        "{} | {} | {} | {}",
        message.id,
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        truncate(&author, 16),
        truncate_line(&message.text, 60)
    )
}

fn json_string<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
