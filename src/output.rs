//! Output formatting utilities for the gauntlet CLI.
//!
//! Colored output helpers for consistent user-facing messages across
//! commands. Report tables are rendered by [`crate::report`]; these helpers
//! cover the one-line status messages around them.

use colored::Colorize;

/// Print an error message in red with an X mark
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message in yellow with a warning sign
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Format a version identifier with emphasis
#[must_use]
pub fn version_name(name: &str) -> String {
    name.cyan().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_name_format() {
        let name = version_name("3.12");
        assert!(name.contains("3.12"));
    }
}
