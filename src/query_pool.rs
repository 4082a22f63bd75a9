//! Timestamp query pool (§4.B).
//!
//! Grounded on `profiler_command_buffer.h`'s `TimestampQueryPool` (a
//! dynamically-resizable sequence of `VkQueryPool`s owned by one command
//! buffer), with the doubling-capacity growth strategy of a query-pair pool
//! shared across a frame's scopes. Unlike a pool shared across an entire
//! frame's scopes, this pool belongs to a single shadow command buffer: it
//! is not thread-safe, matching the Vulkan contract that one command buffer
//! is recorded by one thread at a time.

use crate::backend::{PipelineStage, TimestampSink};
use crate::handle::RawHandle;

/// Slots per internal pool, matching the original's query-pool chunk size.
const DEFAULT_INTERNAL_POOL_SIZE: u32 = 4096;

/// Default fill-ratio threshold for `allocate_if_almost_full` (§4.B).
pub const DEFAULT_PREALLOCATE_THRESHOLD: f32 = 0.85;

/// A monotonically increasing slot id within one command buffer's recording.
/// [`INVALID_SLOT`] is returned when the driver rejects a new internal pool.
pub type Slot = u32;

pub const INVALID_SLOT: Slot = u32::MAX;

struct InternalPool {
    handle: RawHandle,
    size: u32,
}

/// A dynamically grown, append-only sequence of GPU query slots, segmented
/// into fixed-size internal pools (§4.B, §4.A "Timestamp query pool").
pub struct TimestampQueryPool {
    internal_pool_size: u32,
    pools: Vec<InternalPool>,
    current_pool: usize,
    current_index: u32,
    /// True once a pool allocation has failed; every subsequent `write`
    /// returns [`INVALID_SLOT`] until the next `reset`.
    degraded: bool,
}

impl TimestampQueryPool {
    pub fn new() -> Self {
        Self::with_internal_pool_size(DEFAULT_INTERNAL_POOL_SIZE)
    }

    pub fn with_internal_pool_size(internal_pool_size: u32) -> Self {
        Self {
            internal_pool_size,
            pools: Vec::new(),
            current_pool: 0,
            current_index: 0,
            degraded: false,
        }
    }

    /// Total slots written across all internal pools so far.
    pub fn len(&self) -> u32 {
        if self.pools.is_empty() {
            return 0;
        }
        self.pools[..self.current_pool]
            .iter()
            .map(|pool| pool.size)
            .sum::<u32>()
            + self.current_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current_pool_handle(&self) -> Option<RawHandle> {
        self.pools.get(self.current_pool).map(|pool| pool.handle)
    }

    fn current_pool_has_capacity(&self) -> bool {
        self.pools
            .get(self.current_pool)
            .is_some_and(|pool| self.current_index < pool.size)
    }

    /// Resets all internal pools via a GPU command and clears indices (§4.B `reset()`).
    pub fn reset(&mut self, sink: &mut impl TimestampSink) {
        for pool in &self.pools {
            sink.reset_query_pool(pool.handle, pool.size);
        }
        self.current_pool = 0;
        self.current_index = 0;
        self.degraded = false;
    }

    /// Marks start of a new recording: slot index resets to zero without
    /// touching previously allocated internal pools (§4.B `begin()`).
    pub fn begin(&mut self) {
        self.current_pool = 0;
        self.current_index = 0;
    }

    /// Appends an internal pool if the current one has no capacity left
    /// (§4.B `allocate()`). `allocate_handle` is supplied by the caller
    /// (the interception layer) since creating a new query pool is a
    /// fallible driver call this crate does not make directly.
    pub fn allocate(&mut self, allocate_handle: impl FnOnce(u32) -> Option<RawHandle>) {
        if !self.pools.is_empty() && self.current_pool_has_capacity() {
            return;
        }
        if !self.pools.is_empty() && self.current_pool + 1 < self.pools.len() {
            self.current_pool += 1;
            self.current_index = 0;
            return;
        }
        match allocate_handle(self.internal_pool_size) {
            Some(handle) => {
                self.pools.push(InternalPool {
                    handle,
                    size: self.internal_pool_size,
                });
                self.current_pool = self.pools.len() - 1;
                self.current_index = 0;
            }
            None => self.degraded = true,
        }
    }

    /// Pre-allocates a fresh internal pool once fill ratio reaches
    /// `threshold`, so a later `write` inside a hot loop doesn't stall on
    /// pool creation (§4.B `allocate_if_almost_full`).
    pub fn allocate_if_almost_full(
        &mut self,
        threshold: f32,
        allocate_handle: impl FnOnce(u32) -> Option<RawHandle>,
    ) {
        let Some(pool) = self.pools.get(self.current_pool) else {
            self.allocate(allocate_handle);
            return;
        };
        let fill_ratio = self.current_index as f32 / pool.size as f32;
        if fill_ratio >= threshold && self.current_pool + 1 >= self.pools.len() {
            self.allocate(allocate_handle);
        }
    }

    /// Emits a timestamp write at `stage`, returning a monotonically
    /// increasing slot id; advances the current pool/index and allocates a
    /// new internal pool if full (§4.B `write(stage)`).
    ///
    /// Returns [`INVALID_SLOT`] if the driver has already rejected a pool
    /// allocation this recording; the caller still attributes the command
    /// structurally but marks its interval unmeasured (§4.B "Failure").
    pub fn write(
        &mut self,
        sink: &mut impl TimestampSink,
        stage: PipelineStage,
        allocate_handle: impl FnOnce(u32) -> Option<RawHandle>,
    ) -> Slot {
        if self.degraded {
            return INVALID_SLOT;
        }
        if !self.current_pool_has_capacity() {
            self.allocate(allocate_handle);
            if self.degraded {
                return INVALID_SLOT;
            }
        }

        let slot = self.len();
        let Some(handle) = self.current_pool_handle() else {
            self.degraded = true;
            return INVALID_SLOT;
        };
        sink.write_timestamp(handle, self.current_index, stage);
        self.current_index += 1;
        slot
    }

    /// After command-buffer execution, reads all written slots in order
    /// (§4.B `read_all()`). `read_pool` is supplied by the caller, returning
    /// the raw device tick values for one internal pool's used slots.
    pub fn read_all(
        &self,
        mut read_pool: impl FnMut(RawHandle, u32) -> Vec<u64>,
    ) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.len() as usize);
        for (index, pool) in self.pools.iter().enumerate() {
            let used = if index < self.current_pool {
                pool.size
            } else if index == self.current_pool {
                self.current_index
            } else {
                0
            };
            if used == 0 {
                continue;
            }
            out.extend(read_pool(pool.handle, used));
        }
        out
    }
}

impl Default for TimestampQueryPool {
    fn default() -> Self {
        Self::new()
    }
}
