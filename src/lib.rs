/*!

An embedded GPU profiling engine for Vulkan-class API interception layers.

`gpu-profiler-core` tracks object lifetimes, inserts timestamp queries into
recorded command buffers, reads back vendor performance counters, and
aggregates everything into a bounded stream of per-frame reports. It never
touches a concrete driver binding itself: the interception layer supplies
small trait implementations ([`backend::TimestampSink`],
[`backend::ClockSource`], [`backend::CounterDriver`], [`backend::QueryPoolReader`])
and drives the facade's callbacks from its own command-recording and
submission hooks.

# How to use

```no_run
use gpu_profiler_core::backend::{ClockSource, CounterDriver, QueryPoolReader, TimeDomain, Timestamps};
use gpu_profiler_core::errors::SyncError;
use gpu_profiler_core::facade::Profiler;
use gpu_profiler_core::handle::RawHandle;
use gpu_profiler_core::memory::{BudgetSource, HeapSizeBudget};

struct MyClock;
impl ClockSource for MyClock {
    fn host_domain(&self) -> TimeDomain { TimeDomain::ClockMonotonic }
    fn sync(&self) -> Result<Timestamps, SyncError> {
        Ok(Timestamps { host_ns: 0, device_ticks: 0 })
    }
    fn wait_device(&self) {}
    fn wait_queue(&self, _queue: RawHandle) {}
    fn wait_fence(&self, _fence: RawHandle, _timeout_ns: u64) -> bool { true }
}

# struct MyCounters;
# impl CounterDriver for MyCounters {
#     fn metric_sets(&self) -> &[String] { &[] }
#     fn metrics_in_set(&self, _set_index: u32) -> &[gpu_profiler_core::backend::MetricMetadata] { &[] }
#     fn set_active_set(&mut self, set_index: u32) -> Result<(), gpu_profiler_core::errors::CounterError> {
#         Err(gpu_profiler_core::errors::CounterError::InvalidSetIndex(set_index))
#     }
#     fn active_set(&self) -> u32 { 0 }
#     fn report_size(&self, _set_index: u32, _queue_family: u32) -> u32 { 0 }
#     fn parse_report(&self, _set_index: u32, _queue_family: u32, _bytes: &[u8]) -> Result<Vec<gpu_profiler_core::backend::CounterResult>, gpu_profiler_core::errors::CounterError> { Ok(Vec::new()) }
#     fn supports_query_pool_reuse(&self) -> bool { false }
# }
# struct MyReader;
# impl QueryPoolReader for MyReader {
#     fn read_pool(&self, _pool: RawHandle, count: u32) -> Vec<u64> { vec![0; count as usize] }
# }

let mut next_internal_handle = 1u64;
let profiler = Profiler::new(
    None,
    None,
    Box::new(MyClock),
    None,
    Box::new(MyCounters),
    Box::new(MyReader),
    None,
    Box::new(HeapSizeBudget { heap_sizes: vec![256 << 20] }),
    1,
    1,
    move |_kind| {
        next_internal_handle += 1;
        RawHandle(next_internal_handle)
    },
    0,
)
.unwrap();

// The interception layer calls register_*/pre_command/post_command/pre_submit/
// post_submit/finish_frame from its own hooks, then drains resolved frames:
while let Some(frame) = profiler.poll_frame() {
    println!("frame {} took {} device ticks", frame.index, frame.submit_batches.len());
}
```

*/

pub mod aggregator;
pub mod backend;
pub mod catalog;
pub mod command;
pub mod command_buffer;
pub mod config;
pub mod errors;
pub mod facade;
pub mod frame;
pub mod handle;
pub mod memory;
pub mod query_pool;
pub mod submit;
pub mod timeline;

pub use errors::{ConfigError, CounterError, CreationError, EndFrameError, SyncError};
pub use facade::Profiler;
pub use frame::FrameRecord;
pub use handle::{HandleKind, Identity, RawHandle};
