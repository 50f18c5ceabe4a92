//! Compaction map configuration.

/// Configuration for generation maps and the shared compaction map root.
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Depth above which the root warns about unbounded generation growth.
    pub depth_warning: usize,

    /// Total estimated weight (bytes) above which pruning is requested.
    pub weight_budget: Option<u64>,

    /// Whether finalizing a generation converts it to the packed tier.
    pub pack_on_finalize: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            depth_warning: 8,
            weight_budget: None,
            pack_on_finalize: true,
        }
    }
}

impl MapConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the depth warning threshold.
    #[must_use]
    pub const fn depth_warning(mut self, depth: usize) -> Self {
        self.depth_warning = depth;
        self
    }

    /// Sets the memory budget in bytes.
    #[must_use]
    pub const fn weight_budget(mut self, bytes: u64) -> Self {
        self.weight_budget = Some(bytes);
        self
    }

    /// Sets whether finalize packs the generation.
    #[must_use]
    pub const fn pack_on_finalize(mut self, value: bool) -> Self {
        self.pack_on_finalize = value;
        self
    }
}
