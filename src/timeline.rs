//! Timeline synchronizer (§4.D).
//!
//! Grounded on `profiler_sync.h`'s `DeviceProfilerSynchronization`: chooses a
//! calibrateable host time domain once at initialization, captures a
//! `(host_t0, device_t0)` snapshot, and exposes the blocking waits the
//! aggregator needs before it can trust a frame's queries are resolved.

use crate::backend::{ClockSource, TimeDomain, Timestamps};
use crate::errors::SyncError;
use crate::handle::RawHandle;

/// Host/device calibration anchored at initialization time, plus (if a
/// streaming counter backend is active) a second anchor on the counter
/// timeline (§4.D `initialize`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateTimestamps {
    pub device: Timestamps,
    pub counter: Option<Timestamps>,
}

/// Synchronizes the host and device clocks and exposes the blocking waits
/// frame aggregation needs to know a submission has fully retired.
pub struct TimelineSynchronizer<C: ClockSource> {
    clock: C,
    host_domain: TimeDomain,
    create_timestamps: CreateTimestamps,
}

impl<C: ClockSource> TimelineSynchronizer<C> {
    /// Captures `(host_t0, device_t0)` and, if `counter_clock` is supplied
    /// (a streaming counter backend exposes its own timeline), a second
    /// anchor on that timeline (§4.D `initialize`).
    pub fn initialize(clock: C, counter_clock: Option<&impl ClockSource>) -> Self {
        let host_domain = clock.host_domain();
        let device = clock.sync().unwrap_or_default();
        let counter = counter_clock.and_then(|counter_clock| counter_clock.sync().ok());
        Self {
            clock,
            host_domain,
            create_timestamps: CreateTimestamps { device, counter },
        }
    }

    /// Queries `(host, device)` in one calibrated call. Failure leaves the
    /// returned timestamps zero-initialized (§4.D `sync()`).
    pub fn sync(&self) -> Timestamps {
        self.clock.sync().unwrap_or_default()
    }

    /// Propagates calibration failures rather than silently zeroing them,
    /// for callers that need to distinguish "uncalibrated" from "at t=0".
    pub fn try_sync(&self) -> Result<Timestamps, SyncError> {
        self.clock.sync()
    }

    pub fn wait_device(&self) {
        self.clock.wait_device();
    }

    pub fn wait_queue(&self, queue: RawHandle) {
        self.clock.wait_queue(queue);
    }

    pub fn wait_fence(&self, fence: RawHandle, timeout_ns: u64) -> bool {
        self.clock.wait_fence(fence, timeout_ns)
    }

    /// Returns the `t0` snapshot captured at initialization (§4.D `create_timestamps()`).
    pub fn create_timestamps(&self) -> CreateTimestamps {
        self.create_timestamps
    }

    pub fn host_domain(&self) -> TimeDomain {
        self.host_domain
    }
}
