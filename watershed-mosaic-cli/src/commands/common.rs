//! Common types and utilities shared across CLI commands.

use std::time::Duration;

/// Formats a duration as `1h 02m 03s`, `2m 03s` or `3.2s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Prints a title underlined to its width.
pub fn print_header(title: &str) {
    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    println!();
}
