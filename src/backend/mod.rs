//! The driver boundary.
//!
//! Generalizes a command-recorder trait over `write_timestamp`/
//! `push_debug_group`/`pop_debug_group`-style calls to an API-agnostic set of
//! traits. The interception layer supplies the concrete implementations
//! bound to whatever real Vulkan-class binding it uses; this crate only
//! calls through the trait.

pub mod counters_query;
pub mod counters_stream;

use crate::errors::SyncError;
use crate::handle::RawHandle;

/// A GPU pipeline stage at which a timestamp write is ordered (§4.B `write(stage)`).
///
/// Mirrors `VkPipelineStageFlagBits`'s two extremes, which is all the engine
/// itself ever chooses between (`profiler_config.h`'s
/// `m_BeginTimestampStage`/`m_EndTimestampStage`, always top-of-pipe /
/// bottom-of-pipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    TopOfPipe,
    BottomOfPipe,
}

/// Implemented by the interception layer's command-buffer/encoder wrapper so
/// the shadow command buffer (§4.F) can ask it to record a timestamp write at
/// a query-pool slot the engine assigned, without this crate depending on a
/// concrete graphics API.
pub trait TimestampSink {
    /// Emits a timestamp write into `pool` at `slot`, ordered at `stage`.
    fn write_timestamp(&mut self, pool: RawHandle, slot: u32, stage: PipelineStage);

    /// Resets all query slots in `pool` via a GPU command (§4.B `reset()`).
    fn reset_query_pool(&mut self, pool: RawHandle, slot_count: u32);
}

/// A calibratable host/device time domain (§4.D `host_domain()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeDomain {
    QueryPerformanceCounter,
    ClockMonotonic,
    ClockMonotonicRaw,
}

/// A calibrated `(host_ns, device_ticks)` timestamp pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamps {
    pub host_ns: u64,
    pub device_ticks: u64,
}

/// Implemented by the interception layer to provide host/device calibration
/// and blocking waits (§4.D). Generalizes `profiler_sync.cpp`'s direct
/// `vkGetCalibratedTimestampsEXT`/`vkWaitForFences`/`vkQueueWaitIdle`/
/// `vkDeviceWaitIdle` calls.
pub trait ClockSource {
    /// The host time domain this source calibrates against, chosen from the
    /// set the driver reports as calibrateable.
    fn host_domain(&self) -> TimeDomain;

    /// Queries `(host, device)` in one calibrated call.
    fn sync(&self) -> Result<Timestamps, SyncError>;

    fn wait_device(&self);
    fn wait_queue(&self, queue: RawHandle);

    /// Returns `true` if the fence signaled before `timeout_ns` elapsed.
    fn wait_fence(&self, fence: RawHandle, timeout_ns: u64) -> bool;
}

impl ClockSource for Box<dyn ClockSource + Send + Sync> {
    fn host_domain(&self) -> TimeDomain {
        (**self).host_domain()
    }

    fn sync(&self) -> Result<Timestamps, SyncError> {
        (**self).sync()
    }

    fn wait_device(&self) {
        (**self).wait_device()
    }

    fn wait_queue(&self, queue: RawHandle) {
        (**self).wait_queue(queue)
    }

    fn wait_fence(&self, fence: RawHandle, timeout_ns: u64) -> bool {
        (**self).wait_fence(fence, timeout_ns)
    }
}

/// Implemented by the interception layer to read back a timestamp query
/// pool's device tick values after the submitted work completes (§4.B
/// `read_all()`'s `read_pool` callback, lifted to a stored trait object
/// since resolving happens off the recording thread, possibly in the
/// background aggregation worker).
pub trait QueryPoolReader: Send + Sync {
    fn read_pool(&self, pool: RawHandle, count: u32) -> Vec<u64>;
}

/// Implemented by the interception layer to read back a performance-counter
/// query pool's raw report bytes after the submitted work completes (§4.C.1
/// `create_query_pool`'s pool, read back for `parse_report`), the counter
/// analogue of [`QueryPoolReader`].
pub trait CounterReportReader: Send + Sync {
    fn read_report(&self, pool: RawHandle, size: u32) -> Vec<u8>;
}

/// Storage representation a counter result is read back as (§4.C "Shared contracts").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterValue {
    U32(u32),
    U64(u64),
    F32(f32),
}

/// The physical unit a counter is expressed in, with the scaling factor
/// needed to convert the driver's raw value into that unit's base quantity
/// (e.g. MHz → Hz ×1e6). Unknown units fall back to `Generic` ×1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterUnit {
    Generic,
    Percentage,
    Nanoseconds,
    Hertz,
    Cycles,
}

impl CounterUnit {
    /// Parses a driver-reported unit string into a unit and scaling factor.
    pub fn from_driver_string(unit: &str) -> (CounterUnit, f64) {
        match unit {
            "percent" | "%" => (CounterUnit::Percentage, 1.0),
            "ns" => (CounterUnit::Nanoseconds, 1.0),
            "us" => (CounterUnit::Nanoseconds, 1_000.0),
            "Hz" => (CounterUnit::Hertz, 1.0),
            "kHz" => (CounterUnit::Hertz, 1_000.0),
            "MHz" => (CounterUnit::Hertz, 1_000_000.0),
            "GHz" => (CounterUnit::Hertz, 1_000_000_000.0),
            "cycles" => (CounterUnit::Cycles, 1.0),
            _ => (CounterUnit::Generic, 1.0),
        }
    }
}

/// Metadata describing a single hardware counter (§4.C "Shared contracts").
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMetadata {
    pub name: String,
    pub category: String,
    pub description: String,
    pub storage: CounterStorageKind,
    pub unit: CounterUnit,
    pub result_factor: f64,
    pub uuid: [u8; 16],
}

/// The storage type a metric's result is promoted to. Bools promote to
/// `U32`; strings are rejected at discovery time (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStorageKind {
    U32,
    U64,
    F32,
}

/// One resolved counter sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterResult {
    pub metric_index: u32,
    pub value: CounterValue,
}

/// A single streaming-mode sample, calibrated to both timelines (§4.C.2).
#[derive(Debug, Clone)]
pub struct StreamSample {
    pub device_ts_ns: u64,
    pub host_ts_ns: u64,
    pub set_index: u32,
    pub results: Vec<CounterResult>,
}

/// Decodes a sequence of fixed-width (8 byte) little-endian values out of a
/// driver report buffer and applies each metric's result factor, promoting
/// bools/ints/floats to the metric's declared storage type. Shared by the
/// query-mode and streaming backends so the factor/unit handling in §4.C
/// "Shared contracts" lives in one place.
pub(crate) fn decode_report(metrics: &[MetricMetadata], bytes: &[u8]) -> Vec<CounterResult> {
    let mut results = Vec::with_capacity(metrics.len());
    let mut offset = 0usize;
    for (metric_index, metric) in metrics.iter().enumerate() {
        let width = 8;
        let slice = bytes.get(offset..offset + width).unwrap_or(&[0u8; 8][..]);
        let mut buf = [0u8; 8];
        buf[..slice.len()].copy_from_slice(slice);
        offset += width;

        let raw = match metric.storage {
            CounterStorageKind::U32 | CounterStorageKind::U64 => u64::from_le_bytes(buf) as f64,
            CounterStorageKind::F32 => f32::from_le_bytes(buf[..4].try_into().unwrap()) as f64,
        };
        let scaled = raw * metric.result_factor;
        let value = match metric.storage {
            CounterStorageKind::U32 => CounterValue::U32(scaled as u32),
            CounterStorageKind::U64 => CounterValue::U64(scaled as u64),
            CounterStorageKind::F32 => CounterValue::F32(scaled as f32),
        };
        results.push(CounterResult {
            metric_index: metric_index as u32,
            value,
        });
    }
    results
}

/// Implemented by a vendor's performance-counter driver (Intel metrics
/// discovery, a KHR query-pool path, ...). The facade dispatches through this
/// trait rather than a class hierarchy, matching design note "dynamic
/// dispatch over counter backends" → "tagged variants chosen at
/// initialization; never virtual inheritance chains".
pub trait CounterDriver {
    fn metric_sets(&self) -> &[String];
    fn metrics_in_set(&self, set_index: u32) -> &[MetricMetadata];

    fn set_active_set(&mut self, set_index: u32) -> Result<(), crate::errors::CounterError>;
    fn active_set(&self) -> u32;

    fn report_size(&self, set_index: u32, queue_family: u32) -> u32;

    /// Converts driver-reported bytes into typed results (§4.C.1 `parse_report`).
    fn parse_report(
        &self,
        set_index: u32,
        queue_family: u32,
        bytes: &[u8],
    ) -> Result<Vec<CounterResult>, crate::errors::CounterError>;

    /// `true` for streaming backends, and for query backends when the vendor
    /// permits query-pool reuse (§4.C "Shared contracts").
    fn supports_query_pool_reuse(&self) -> bool;

    /// Creates a vendor query pool sized for `size` reports on `queue_family`
    /// (§4.C.1 `create_query_pool`). The pool handle itself is a fallible
    /// driver allocation the caller supplies via `allocate_handle`, the same
    /// convention [`crate::query_pool::TimestampQueryPool::allocate`] uses for
    /// timestamp pools. Present only on query-mode backends; streaming
    /// backends never create query pools, hence the no-op default.
    fn create_query_pool(
        &self,
        _queue_family: u32,
        _size: u32,
        _allocate_handle: &mut dyn FnMut(u32) -> Option<RawHandle>,
    ) -> Option<RawHandle> {
        None
    }

    /// Applies the active metric-set configuration to `queue`; a no-op if no
    /// set has been activated yet (§4.C.1 `queue_configure`). Present only on
    /// query-mode backends.
    fn queue_configure(&self, _queue: RawHandle) {}

    /// Present only on streaming backends (§4.C.2); `None` for query-mode
    /// backends (§4.C.1).
    fn read_stream_data(&mut self, _begin_device_ts: u64, _end_device_ts: u64) -> Option<(Vec<StreamSample>, bool)> {
        None
    }
}
