//! Shared test doubles for the integration tests, standing in for the
//! interception layer's driver bindings: a clock, a counter backend, a
//! query-pool reader, and a raw-handle allocator.
#![allow(dead_code)]

use std::cell::Cell;

use gpu_profiler_core::backend::{
    ClockSource, CounterDriver, CounterResult, MetricMetadata, PipelineStage, QueryPoolReader,
    TimeDomain, Timestamps, TimestampSink,
};
use gpu_profiler_core::config::ConfigOverlay;
use gpu_profiler_core::errors::{CounterError, CreationError, SyncError};
use gpu_profiler_core::facade::Profiler;
use gpu_profiler_core::handle::RawHandle;
use gpu_profiler_core::memory::{BudgetSource, HeapSizeBudget};

/// Records nothing; the shadow command buffer only needs a sink to call into.
pub struct NullSink;

impl TimestampSink for NullSink {
    fn write_timestamp(&mut self, _pool: RawHandle, _slot: u32, _stage: PipelineStage) {}
    fn reset_query_pool(&mut self, _pool: RawHandle, _slot_count: u32) {}
}

/// A fixed host/device calibration; every `sync()` call returns the same pair.
pub struct FixedClock;

impl ClockSource for FixedClock {
    fn host_domain(&self) -> TimeDomain {
        TimeDomain::ClockMonotonic
    }
    fn sync(&self) -> Result<Timestamps, SyncError> {
        Ok(Timestamps { host_ns: 1, device_ticks: 1 })
    }
    fn wait_device(&self) {}
    fn wait_queue(&self, _queue: RawHandle) {}
    fn wait_fence(&self, _fence: RawHandle, _timeout_ns: u64) -> bool {
        true
    }
}

/// A counter backend with no discovered metric sets; used where tests don't
/// exercise the performance-counter path at all.
pub struct EmptyCounters;

impl CounterDriver for EmptyCounters {
    fn metric_sets(&self) -> &[String] {
        &[]
    }
    fn metrics_in_set(&self, _set_index: u32) -> &[MetricMetadata] {
        &[]
    }
    fn set_active_set(&mut self, set_index: u32) -> Result<(), CounterError> {
        Err(CounterError::InvalidSetIndex(set_index))
    }
    fn active_set(&self) -> u32 {
        0
    }
    fn report_size(&self, _set_index: u32, _queue_family: u32) -> u32 {
        0
    }
    fn parse_report(
        &self,
        _set_index: u32,
        _queue_family: u32,
        _bytes: &[u8],
    ) -> Result<Vec<CounterResult>, CounterError> {
        Ok(Vec::new())
    }
    fn supports_query_pool_reuse(&self) -> bool {
        false
    }
}

/// Reads back every slot as zero; useful when a test only cares about tree
/// shape, not tick values.
pub struct ZeroReader;

impl QueryPoolReader for ZeroReader {
    fn read_pool(&self, _pool: RawHandle, count: u32) -> Vec<u64> {
        vec![0; count as usize]
    }
}

/// Reads back slots as strictly increasing tick values, so intervals between
/// two distinct slots always have a positive duration (`end > begin`).
pub struct IncrementingReader;

impl QueryPoolReader for IncrementingReader {
    fn read_pool(&self, _pool: RawHandle, count: u32) -> Vec<u64> {
        (0..count).map(|i| (i as u64 + 1) * 100).collect()
    }
}

/// A `RawHandle` allocator for the `allocate_if_almost_full`/`allocate`
/// callbacks the shadow command buffer needs during `begin`/`end`.
pub fn handle_allocator(start: u64) -> impl FnMut(u32) -> Option<RawHandle> {
    let next = Cell::new(start);
    move |_size| {
        let value = next.get();
        next.set(value + 1);
        Some(RawHandle(value))
    }
}

pub fn budget(heap_size: u64) -> Box<dyn BudgetSource + Send + Sync> {
    Box::new(HeapSizeBudget { heap_sizes: vec![heap_size] })
}

/// Builds a `Profiler` wired with the test doubles above: a fixed clock, no
/// counters, ticks that increase with slot index, and implicit-pipeline
/// handles allocated starting at 5000. `overlay` applies on top of defaults,
/// the way the device-creation options struct would.
pub fn new_profiler(overlay: Option<ConfigOverlay>) -> Result<Profiler, CreationError> {
    let mut next = 5000u64;
    Profiler::new(
        None,
        overlay,
        Box::new(FixedClock),
        None,
        Box::new(EmptyCounters),
        Box::new(IncrementingReader),
        None,
        budget(1 << 20),
        1,
        1,
        move |_kind| {
            next += 1;
            RawHandle(next)
        },
        0,
    )
}
