//! Engine configuration.

/// Configuration for a [`crate::LinkEngine`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of inverse writes in flight during one propagation.
    ///
    /// `1` propagates strictly one target document at a time.
    pub max_concurrent_writes: usize,

    /// Whether a missing target of a link write counts as a propagation
    /// failure. When disabled, such writes are skipped with a warning.
    /// Unlink writes to a missing target are always skipped.
    pub verify_targets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_writes: 16,
            verify_targets: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inverse write concurrency. Zero is treated as one.
    #[must_use]
    pub const fn max_concurrent_writes(mut self, value: usize) -> Self {
        self.max_concurrent_writes = if value == 0 { 1 } else { value };
        self
    }

    /// Sets whether missing targets fail propagation.
    #[must_use]
    pub const fn verify_targets(mut self, value: bool) -> Self {
        self.verify_targets = value;
        self
    }
}
