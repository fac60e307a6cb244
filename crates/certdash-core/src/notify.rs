//! User-visible notifications.
//!
//! Views report request failures through a [`Notifier`] instead of failing.
//! The binary decides how notifications are shown.

use certdash_types::error::RepositoryError;

/// Title of every request failure notification.
pub const REQUEST_ERROR: &str = "Request error";

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    /// Report a failed operation. `description` carries the underlying message.
    fn error(&self, message: &str, description: &str);
}

/// Notifier that only writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str, description: &str) {
        tracing::error!(description, "{message}");
    }
}

/// Log a failed request and notify the user, unless it was aborted.
pub fn report_request_error(notifier: &dyn Notifier, err: &RepositoryError) {
    if err.is_abort() {
        tracing::debug!("request aborted");
        return;
    }
    tracing::error!(error = %err, "backend request failed");
    notifier.error(REQUEST_ERROR, &err.to_string());
}
