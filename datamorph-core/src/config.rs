//! Tunable engine limits. Every component accepts `&EngineConfig` rather than
//! hard-coding its constants, but the defaults here are the documented ones.

/// Row interval between indexer checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 1000;
/// Number of contiguous records held by the row/byte cache.
pub const DEFAULT_CACHE_SIZE: usize = 200;
/// Number of leading records used to seed the initial schema scan.
pub const DEFAULT_SCHEMA_SAMPLE_SIZE: usize = 200;
/// Maximum bytes fed to a scanner in one read window.
pub const DEFAULT_READ_WINDOW_BYTES: usize = 1024 * 1024;
/// Records processed per batch by the filter row indexer before yielding.
pub const DEFAULT_FILTER_BATCH_SIZE: usize = 1000;

/// Tunable limits shared by every engine component for one opened file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub checkpoint_interval: usize,
    pub cache_size: usize,
    pub schema_sample_size: usize,
    pub read_window_bytes: usize,
    pub filter_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            cache_size: DEFAULT_CACHE_SIZE,
            schema_sample_size: DEFAULT_SCHEMA_SAMPLE_SIZE,
            read_window_bytes: DEFAULT_READ_WINDOW_BYTES,
            filter_batch_size: DEFAULT_FILTER_BATCH_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_schema_sample_size(mut self, size: usize) -> Self {
        self.schema_sample_size = size;
        self
    }

    pub fn with_read_window_bytes(mut self, bytes: usize) -> Self {
        self.read_window_bytes = bytes;
        self
    }

    pub fn with_filter_batch_size(mut self, size: usize) -> Self {
        self.filter_batch_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.checkpoint_interval, 1000);
        assert_eq!(cfg.cache_size, 200);
        assert_eq!(cfg.schema_sample_size, 200);
        assert_eq!(cfg.read_window_bytes, 1024 * 1024);
        assert_eq!(cfg.filter_batch_size, 1000);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = EngineConfig::new().with_cache_size(50).with_checkpoint_interval(10);
        assert_eq!(cfg.cache_size, 50);
        assert_eq!(cfg.checkpoint_interval, 10);
    }
}
