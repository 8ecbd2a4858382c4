#[derive(Debug)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: String,
    /// Number of keys passed to `Loader::load` / `Loader::load_many` (not necessarily unique).
    items_requested: u32,
    /// The number of keys that were immediately found in the loader cache.
    cache_hits: u32,
    /// Number of batch function calls made by the worker.
    loads: u32,
    /// The average number of keys passed to one batch function call.
    average_batch_size: f32,
    /// The max number of keys passed to a single batch function call.
    max_batch_size: u32,
    /// The min number of keys passed to a single batch function call.
    min_batch_size: u32,
    /// Batch function calls that failed as a whole or broke the result count contract.
    failed_loads: u32,
}

impl WorkerStats {
    pub fn new(tag: String) -> Self {
        Self {
            tag,
            items_requested: 0,
            cache_hits: 0,
            loads: 0,
            average_batch_size: 0.0,
            max_batch_size: 0,
            min_batch_size: u32::MAX,
            failed_loads: 0,
        }
    }

    pub fn record_load_request(&mut self, items_requested: u32) {
        self.items_requested += items_requested;
    }

    pub fn record_cache_hits(&mut self, hits: u32) {
        self.cache_hits += hits;
    }

    pub fn record_load_exec(&mut self, batch_size: u32) {
        let new_total_load = self.loads + 1;
        self.average_batch_size = (((self.average_batch_size as f64 * self.loads as f64)
            + batch_size as f64)
            / new_total_load as f64) as f32;
        self.loads = new_total_load;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        self.min_batch_size = self.min_batch_size.min(batch_size);
    }

    pub fn record_load_failure(&mut self) {
        self.failed_loads += 1;
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(tag = %self.tag, worker_stats = ?self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_batch_size_bounds() {
        let mut stats = WorkerStats::new("test".to_owned());
        stats.record_load_exec(3);
        stats.record_load_exec(1);
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.max_batch_size, 3);
        assert_eq!(stats.min_batch_size, 1);
        assert!((stats.average_batch_size - 2.0).abs() < f32::EPSILON);
    }
}
