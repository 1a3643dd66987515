//! World configuration (§A.3): perf-tuning hints only, never
//! correctness-affecting, grounded in the teacher's referenced (but
//! unimplemented in excerpt) `WorldBuilder` idiom.

/// Builder for [`crate::world::World`] construction-time hints.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    pub(crate) initial_id_capacity: usize,
    pub(crate) initial_table_capacity: usize,
    pub(crate) pool_down_cache_arenas: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            initial_id_capacity: 0,
            initial_table_capacity: 0,
            pool_down_cache_arenas: false,
        }
    }
}

impl WorldConfig {
    /// The default configuration.
    #[must_use]
    pub fn new() -> Self {
        WorldConfig::default()
    }

    /// Hints the expected number of distinct ids the id index will hold.
    #[must_use]
    pub fn initial_id_capacity(mut self, n: usize) -> Self {
        self.initial_id_capacity = n;
        self
    }

    /// Hints the expected number of tables the record store will hold.
    #[must_use]
    pub fn initial_table_capacity(mut self, n: usize) -> Self {
        self.initial_table_capacity = n;
        self
    }

    /// Whether down-cache result vectors should be pooled per stage (§5)
    /// rather than freshly allocated on each rebuild. Off by default.
    #[must_use]
    pub fn pool_down_cache_arenas(mut self, enabled: bool) -> Self {
        self.pool_down_cache_arenas = enabled;
        self
    }

    /// Builds a [`crate::world::World`] from this configuration.
    #[must_use]
    pub fn build(self) -> crate::world::World {
        crate::world::World::with_config(self)
    }
}

#[test]
fn builder_sets_fields() {
    let cfg = WorldConfig::new()
        .initial_id_capacity(64)
        .initial_table_capacity(16)
        .pool_down_cache_arenas(true);
    assert_eq!(cfg.initial_id_capacity, 64);
    assert_eq!(cfg.initial_table_capacity, 16);
    assert!(cfg.pool_down_cache_arenas);
}
