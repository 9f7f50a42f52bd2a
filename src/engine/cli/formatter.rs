//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;

use crate::engine::observability::HealthStatus;
use crate::engine::risk::RiskStatus;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.len()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a numbered item
    pub fn numbered_item(num: usize, text: &str) {
        println!("  {}. {}", num.to_string().bright_white().bold(), text);
    }

    /// Print a table header
    pub fn table_header(columns: &[&str]) {
        let header = columns
            .iter()
            .map(|c| c.bright_white().bold().to_string())
            .collect::<Vec<_>>()
            .join(" │ ");
        println!("  {}", header);
        println!("  {}", "─".repeat(header.len()).bright_black());
    }

    /// Print a table row
    pub fn table_row(values: &[&str]) {
        println!("  {}", values.join(" │ "));
    }

    /// Print a divider
    pub fn divider() {
        println!("{}", "─".repeat(60).bright_black());
    }

    /// Print an empty line
    pub fn blank() {
        println!();
    }
}

/// Colorize a risk status word
pub fn status_label(status: RiskStatus) -> String {
    match status {
        RiskStatus::Approved => status.as_str().green().bold().to_string(),
        RiskStatus::Review => status.as_str().yellow().bold().to_string(),
        RiskStatus::Rejected => status.as_str().red().bold().to_string(),
    }
}

/// Colorize a health status word
pub fn health_label(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".green().bold().to_string(),
        HealthStatus::Warning => "warning".yellow().bold().to_string(),
        HealthStatus::Critical => "critical".red().bold().to_string(),
    }
}

/// Render an allow/deny verdict
pub fn verdict(allowed: bool) -> String {
    if allowed {
        "allowed".green().bold().to_string()
    } else {
        "denied".red().bold().to_string()
    }
}

/// Shorten a hex digest for display
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_labels_keep_status_text() {
        colored::control::set_override(false);
        assert_eq!(status_label(RiskStatus::Review), "review");
        assert_eq!(health_label(HealthStatus::Critical), "critical");
        assert_eq!(verdict(false), "denied");
    }
}
