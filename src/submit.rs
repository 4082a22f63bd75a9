//! Submit batch recorder (§4.H).
//!
//! Snapshots what the application passed to one queue submission: resolved
//! command-buffer and semaphore identities plus host-side timing, under a
//! shared (reader) lock on the command-buffer registry so recording threads
//! never block each other. Grounded on the submission-time bookkeeping in
//! `profiler_command_buffer.h`'s `Submit()` and the registry-lock discipline
//! used throughout `profiler_memory_tracker.cpp`.

use crate::handle::{HandleKind, Identity, ObjectRegistry, RawHandle};

/// Distinguishes the legacy `vkQueueSubmit` shape from the richer
/// `vkQueueSubmit2` info-per-array shape; both map into the same internal
/// structure (§4.H "The layer may pass either legacy single-submit or the
/// richer info-per-array submit").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitKind {
    Legacy,
    Submit2,
}

/// One `VkSubmitInfo`/`VkSubmitInfo2`-equivalent entry within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubmit {
    pub command_buffers: Vec<Identity>,
    pub wait_semaphores: Vec<Identity>,
    pub signal_semaphores: Vec<Identity>,
}

/// One `record()` call: everything the application passed to one queue submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitBatch {
    pub queue: Identity,
    pub host_ts: u64,
    pub thread_id: u64,
    pub kind: SubmitKind,
    pub submits: Vec<ResolvedSubmit>,
}

/// One `VkSubmitInfo`-equivalent as observed by the interception layer,
/// before identity resolution.
pub struct SubmitInfo {
    pub command_buffers: Vec<RawHandle>,
    pub wait_semaphores: Vec<RawHandle>,
    pub signal_semaphores: Vec<RawHandle>,
}

/// Marks a shadow command buffer's dirty flag false once it has been
/// snapshotted into a submit batch (§3 "dirty flag... cleared on submit").
/// Implemented by whatever owns the live `ShadowCommandBuffer` instances
/// (the facade's command-buffer table); kept as a trait so this module
/// doesn't need to know that table's storage shape.
pub trait CommandBufferDirtyMarker {
    fn mark_submitted(&self, command_buffer: RawHandle);
}

/// Records submit batches, resolving every referenced handle through the
/// object registry under its reader lock (§4.H, §5 "Registries... reader
/// operation").
pub struct SubmitRecorder<'a> {
    registry: &'a ObjectRegistry,
}

impl<'a> SubmitRecorder<'a> {
    pub fn new(registry: &'a ObjectRegistry) -> Self {
        Self { registry }
    }

    /// Snapshots each submit's command-buffer and semaphore references,
    /// resolved to identities, plus `{host_ts, thread_id}` (§4.H `record`).
    pub fn record(
        &self,
        queue: RawHandle,
        infos: &[SubmitInfo],
        kind: SubmitKind,
        host_ts: u64,
        thread_id: u64,
        dirty_marker: &impl CommandBufferDirtyMarker,
    ) -> SubmitBatch {
        let submits = infos
            .iter()
            .map(|info| {
                for &command_buffer in &info.command_buffers {
                    dirty_marker.mark_submitted(command_buffer);
                }
                ResolvedSubmit {
                    command_buffers: info
                        .command_buffers
                        .iter()
                        .map(|&handle| self.registry.resolve(HandleKind::CommandBuffer, handle))
                        .collect(),
                    wait_semaphores: info
                        .wait_semaphores
                        .iter()
                        .map(|&handle| self.registry.resolve(HandleKind::Queryable, handle))
                        .collect(),
                    signal_semaphores: info
                        .signal_semaphores
                        .iter()
                        .map(|&handle| self.registry.resolve(HandleKind::Queryable, handle))
                        .collect(),
                }
            })
            .collect();

        SubmitBatch {
            queue: self.registry.resolve(HandleKind::Queue, queue),
            host_ts,
            thread_id,
            kind,
            submits,
        }
    }
}
