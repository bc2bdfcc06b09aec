//! Storage configuration.

/// Configuration for a [`crate::MapStorage`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Number of committed change events kept for polling.
    pub change_history: usize,

    /// Whether commits publish events to the change feed.
    pub emit_change_events: bool,

    /// Scans returning more entries than this log a warning (0 = never).
    pub query_warn_threshold: usize,

    /// Whether commit re-checks that every working copy still reports the
    /// key it is tracked under.
    pub verify_identity_on_commit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            change_history: 10_000,
            emit_change_events: true,
            query_warn_threshold: 50_000,
            verify_identity_on_commit: true,
        }
    }
}

impl StorageConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the change feed history size.
    #[must_use]
    pub const fn change_history(mut self, events: usize) -> Self {
        self.change_history = events;
        self
    }

    /// Sets whether commits publish change events.
    #[must_use]
    pub const fn emit_change_events(mut self, value: bool) -> Self {
        self.emit_change_events = value;
        self
    }

    /// Sets the scan size above which a warning is logged.
    #[must_use]
    pub const fn query_warn_threshold(mut self, entries: usize) -> Self {
        self.query_warn_threshold = entries;
        self
    }

    /// Sets whether commit verifies identity keys.
    #[must_use]
    pub const fn verify_identity_on_commit(mut self, value: bool) -> Self {
        self.verify_identity_on_commit = value;
        self
    }

    pub(crate) fn is_oversized_scan(&self, entries: usize) -> bool {
        self.query_warn_threshold > 0 && entries > self.query_warn_threshold
    }
}
