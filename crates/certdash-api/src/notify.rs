//! Console notifier for interactive views.

use certdash_core::notify::Notifier;
use console::style;

/// Prints notifications to stderr so they never mix with table output.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn error(&self, message: &str, description: &str) {
        eprintln!(
            "  {} {}: {}",
            style("✗").red().bold(),
            style(message).red(),
            description
        );
    }
}
