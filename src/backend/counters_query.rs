//! Query-mode performance-counter backend (§4.C.1).
//!
//! Grounded on `profiler_performance_counters_intel.h/.cpp`: a fixed list of
//! metric sets is discovered once (vendor-specific FFI, out of scope here —
//! the caller supplies the discovered sets), after which
//! `set_active_set`/`parse_report` are pure host-side bookkeeping over that
//! data.

use parking_lot::RwLock;

use crate::backend::{decode_report, CounterDriver, CounterResult, MetricMetadata};
use crate::errors::CounterError;
use crate::handle::RawHandle;

/// One discovered metric set: its metrics, in driver report order.
#[derive(Debug, Clone)]
pub struct MetricSet {
    pub name: String,
    pub metrics: Vec<MetricMetadata>,
}

/// A query-mode counter backend over a fixed, pre-discovered list of metric sets.
pub struct QueryCounterBackend {
    set_names: Vec<String>,
    sets: Vec<MetricSet>,
    active: RwLock<u32>,
    /// Whether the vendor permits reusing a query pool across frames without
    /// a reset in between (§4.C "Shared contracts"); discovered alongside the
    /// metric sets, not decided by this crate.
    supports_pool_reuse: bool,
}

impl QueryCounterBackend {
    /// Selects the set named `default_name`, or the first available set if
    /// `default_name` is empty or unknown (§4.C.1 `initialize`).
    /// `supports_pool_reuse` is the vendor's own reported capability, as
    /// discovered alongside `sets`.
    pub fn new(
        sets: Vec<MetricSet>,
        default_name: &str,
        supports_pool_reuse: bool,
    ) -> Result<Self, CounterError> {
        if sets.is_empty() {
            return Err(CounterError::NoMetricSetsDiscovered);
        }
        let set_names = sets.iter().map(|set| set.name.clone()).collect();
        let initial = sets
            .iter()
            .position(|set| set.name == default_name)
            .unwrap_or(0) as u32;
        Ok(Self {
            set_names,
            sets,
            active: RwLock::new(initial),
            supports_pool_reuse,
        })
    }

    fn set(&self, index: u32) -> Result<&MetricSet, CounterError> {
        self.sets
            .get(index as usize)
            .ok_or(CounterError::InvalidSetIndex(index))
    }
}

impl CounterDriver for QueryCounterBackend {
    fn metric_sets(&self) -> &[String] {
        &self.set_names
    }

    fn metrics_in_set(&self, set_index: u32) -> &[MetricMetadata] {
        self.sets
            .get(set_index as usize)
            .map(|set| set.metrics.as_slice())
            .unwrap_or(&[])
    }

    /// Acquires a new configuration; atomically replaces the current one via
    /// the writer lock (§4.C.1).
    fn set_active_set(&mut self, set_index: u32) -> Result<(), CounterError> {
        self.set(set_index)?;
        *self.active.write() = set_index;
        Ok(())
    }

    fn active_set(&self) -> u32 {
        *self.active.read()
    }

    fn report_size(&self, set_index: u32, _queue_family: u32) -> u32 {
        self.set(set_index)
            .map(|set| set.metrics.len() as u32 * 8)
            .unwrap_or(0)
    }

    fn parse_report(
        &self,
        set_index: u32,
        _queue_family: u32,
        bytes: &[u8],
    ) -> Result<Vec<CounterResult>, CounterError> {
        let set = self.set(set_index)?;
        Ok(decode_report(&set.metrics, bytes))
    }

    fn supports_query_pool_reuse(&self) -> bool {
        self.supports_pool_reuse
    }

    /// Allocates a vendor query pool for `queue_family` (§4.C.1
    /// `create_query_pool`). Pool creation is a fallible driver call this
    /// crate does not make directly; `allocate_handle` performs it.
    fn create_query_pool(
        &self,
        _queue_family: u32,
        size: u32,
        allocate_handle: &mut dyn FnMut(u32) -> Option<RawHandle>,
    ) -> Option<RawHandle> {
        allocate_handle(size)
    }

    /// Applies the active set's configuration to `queue` (§4.C.1
    /// `queue_configure`). Bookkeeping only: the actual vendor dispatch is
    /// out of scope here, as it is for set discovery itself.
    fn queue_configure(&self, queue: RawHandle) {
        log::debug!(
            "applying metric set {} to queue {:?}",
            self.active_set(),
            queue
        );
    }
}
