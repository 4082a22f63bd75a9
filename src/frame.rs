//! Frame record data model (§3 "Frame record").
//!
//! A frame record is the fully resolved, self-contained tree handed to
//! consumers: no driver handles, only opaque identities and device-tick
//! intervals. Grounded on the aggregate-then-expose shape of
//! `profiler.cpp`'s per-frame data collection, reworked into a plain,
//! serialization-ready struct.

use crate::backend::CounterResult;
use crate::catalog::{PipelineKind, RenderPassKind};
use crate::command::Command;
use crate::command_buffer::{CommandBufferSnapshot, CommandEntry, NO_GROUP};
use crate::config::FrameDelimiter;
use crate::handle::{Identity, RawHandle};
use crate::memory::MemoryData;
use crate::query_pool::{Slot, INVALID_SLOT};

/// A begin/end device-tick pair, or `None` on either side if the slot was
/// never resolved (§7 "Resource exhaustion": the command still appears in
/// the tree, just unmeasured).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedInterval {
    pub begin_ticks: Option<u64>,
    pub end_ticks: Option<u64>,
}

impl ResolvedInterval {
    pub fn is_measured(&self) -> bool {
        self.begin_ticks.is_some() && self.end_ticks.is_some()
    }

    pub fn duration_ticks(&self) -> Option<u64> {
        match (self.begin_ticks, self.end_ticks) {
            (Some(begin), Some(end)) => Some(end.saturating_sub(begin)),
            _ => None,
        }
    }
}

/// Resolves one raw slot id against the tick values read back from a query
/// pool (`INVALID_SLOT` or an out-of-range slot resolves to unmeasured).
pub fn resolve_slot(slot: Slot, ticks: &[u64]) -> Option<u64> {
    if slot == INVALID_SLOT {
        return None;
    }
    ticks.get(slot as usize).copied()
}

/// One pipeline-attributed interval within a command buffer's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub pipeline: RawHandle,
    pub interval: ResolvedInterval,
}

/// A resolved subpass interval and the half-open range of `groups` nested
/// inside it (§3 "pipelines into subpasses", §8 invariant I2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubpass {
    pub index: u32,
    pub interval: ResolvedInterval,
    pub group_start: usize,
    pub group_end: usize,
}

/// A resolved render-pass interval and its nested subpasses (§3 "subpasses
/// into render passes", §8 invariant I2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRenderPass {
    pub render_pass: RawHandle,
    pub interval: ResolvedInterval,
    pub subpasses: Vec<ResolvedSubpass>,
}

/// A resolved command buffer's structural tree (§3 "structural nesting").
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommandBuffer {
    pub identity: Identity,
    pub total_interval: ResolvedInterval,
    pub groups: Vec<ResolvedGroup>,
    pub render_passes: Vec<ResolvedRenderPass>,
    pub commands: Vec<CommandEntry>,
}

impl ResolvedCommandBuffer {
    /// `total_ticks == 0` for an empty command buffer or one with only
    /// debug labels (§8 "Boundary behaviors").
    pub fn total_ticks(&self) -> u64 {
        self.total_interval.duration_ticks().unwrap_or(0)
    }

    /// Sum of measured command intervals; must not exceed `total_ticks`
    /// (§8 invariant I1).
    pub fn measured_ticks(&self) -> u64 {
        self.groups
            .iter()
            .filter(|group| group.interval.is_measured())
            .map(|group| group.interval.duration_ticks().unwrap_or(0))
            .sum()
    }

    pub fn commands_without_interval(&self) -> impl Iterator<Item = &Command> {
        self.commands
            .iter()
            .filter(|entry| entry.group_index == NO_GROUP)
            .map(|entry| &entry.command)
    }
}

/// Resolves a command buffer's lazily-materialized structural snapshot
/// against the device ticks read back from its query pool
/// (`ticks[slot]`, indexed the same way [`crate::query_pool::TimestampQueryPool::read_all`]
/// produces them) into the tree handed to consumers.
pub fn resolve_command_buffer(snapshot: &CommandBufferSnapshot, ticks: &[u64]) -> ResolvedCommandBuffer {
    ResolvedCommandBuffer {
        identity: snapshot.identity,
        total_interval: ResolvedInterval {
            begin_ticks: resolve_slot(snapshot.buffer_begin_slot, ticks),
            end_ticks: resolve_slot(snapshot.buffer_end_slot, ticks),
        },
        groups: snapshot
            .groups
            .iter()
            .map(|group| ResolvedGroup {
                pipeline: group.pipeline,
                interval: ResolvedInterval {
                    begin_ticks: resolve_slot(group.begin_slot, ticks),
                    end_ticks: resolve_slot(group.end_slot, ticks),
                },
            })
            .collect(),
        render_passes: snapshot
            .render_passes
            .iter()
            .map(|render_pass| ResolvedRenderPass {
                render_pass: render_pass.render_pass,
                interval: ResolvedInterval {
                    begin_ticks: resolve_slot(render_pass.begin_slot, ticks),
                    end_ticks: resolve_slot(render_pass.end_slot, ticks),
                },
                subpasses: render_pass
                    .subpasses
                    .iter()
                    .map(|subpass| ResolvedSubpass {
                        index: subpass.index,
                        interval: ResolvedInterval {
                            begin_ticks: resolve_slot(subpass.begin_slot, ticks),
                            end_ticks: resolve_slot(subpass.end_slot, ticks),
                        },
                        group_start: subpass.group_start,
                        group_end: subpass.group_end,
                    })
                    .collect(),
            })
            .collect(),
        commands: snapshot.commands.clone(),
    }
}

/// One resolved entry in a submit batch: the batch's own timing plus every
/// command buffer it referenced, resolved to device ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSubmitBatch {
    pub queue: Identity,
    pub host_ts: u64,
    pub thread_id: u64,
    pub command_buffers: Vec<ResolvedCommandBuffer>,
}

/// Aggregated per-pipeline GPU time across a frame (§4.I "computes top-N pipelines").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopPipelineEntry {
    pub pipeline: RawHandle,
    pub kind: PipelineKind,
    pub total_ticks: u64,
    pub invocation_count: u64,
}

/// A resolved render-pass's clear/resolve statistics, surfaced alongside
/// pipeline attribution (§4.G, §3 "Render-pass record").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassSummary {
    pub render_pass: RawHandle,
    pub kind: RenderPassKind,
    pub subpass_count: u32,
    pub color_clear_count: u32,
    pub depth_stencil_clear_count: u32,
}

/// One fully resolved frame (§3 "Frame record").
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub index: u64,
    pub created_at_host_ns: u64,
    pub fps: f64,
    pub delimiter: FrameDelimiter,
    pub boundary_host_ns: u64,
    pub boundary_device_ticks: u64,
    pub submit_batches: Vec<ResolvedSubmitBatch>,
    pub top_pipelines: Vec<TopPipelineEntry>,
    pub render_passes: Vec<RenderPassSummary>,
    pub memory: MemoryData,
    pub counters: Vec<CounterResult>,
}

impl FrameRecord {
    /// True once no command buffer in the frame has an unmeasured interval
    /// it was expected to resolve; degraded frames still set this to `false`
    /// rather than omitting the interval (§7 "Device lost / fence timeout").
    pub fn fully_measured(&self) -> bool {
        self.submit_batches.iter().all(|batch| {
            batch
                .command_buffers
                .iter()
                .all(|cmd_buffer| cmd_buffer.total_interval.is_measured())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_slot_maps_invalid_to_none() {
        assert_eq!(resolve_slot(INVALID_SLOT, &[1, 2, 3]), None);
    }

    #[test]
    fn resolve_slot_reads_tick_value() {
        assert_eq!(resolve_slot(1, &[10, 20, 30]), Some(20));
    }

    #[test]
    fn empty_command_buffer_has_zero_total_ticks() {
        let cmd_buffer = ResolvedCommandBuffer {
            identity: Identity::new(RawHandle(1), 1),
            total_interval: ResolvedInterval::default(),
            groups: Vec::new(),
            render_passes: Vec::new(),
            commands: Vec::new(),
        };
        assert_eq!(cmd_buffer.total_ticks(), 0);
    }

    #[test]
    fn resolve_command_buffer_maps_slots_to_ticks() {
        use crate::command_buffer::PipelineGroup;

        let snapshot = CommandBufferSnapshot {
            identity: Identity::new(RawHandle(1), 1),
            buffer_begin_slot: 0,
            buffer_end_slot: 3,
            groups: vec![PipelineGroup {
                pipeline: RawHandle(9),
                bind_point: None,
                begin_slot: 1,
                end_slot: 2,
            }],
            render_passes: Vec::new(),
            commands: Vec::new(),
        };
        let ticks = vec![100, 110, 140, 200];

        let resolved = resolve_command_buffer(&snapshot, &ticks);
        assert_eq!(resolved.total_interval.begin_ticks, Some(100));
        assert_eq!(resolved.total_interval.end_ticks, Some(200));
        assert_eq!(resolved.groups[0].interval.duration_ticks(), Some(30));
    }

    #[test]
    fn resolve_command_buffer_maps_render_pass_and_subpass_slots() {
        use crate::command_buffer::{RenderPassGroup, SubpassGroup};

        let snapshot = CommandBufferSnapshot {
            identity: Identity::new(RawHandle(1), 1),
            buffer_begin_slot: 0,
            buffer_end_slot: 5,
            groups: Vec::new(),
            render_passes: vec![RenderPassGroup {
                render_pass: RawHandle(42),
                begin_slot: 1,
                end_slot: 4,
                subpasses: vec![SubpassGroup {
                    index: 0,
                    begin_slot: 2,
                    end_slot: 3,
                    group_start: 0,
                    group_end: 1,
                }],
            }],
            commands: Vec::new(),
        };
        let ticks = vec![100, 110, 120, 150, 180, 200];

        let resolved = resolve_command_buffer(&snapshot, &ticks);
        assert_eq!(resolved.render_passes.len(), 1);
        let render_pass = &resolved.render_passes[0];
        assert_eq!(render_pass.render_pass, RawHandle(42));
        assert_eq!(render_pass.interval.begin_ticks, Some(110));
        assert_eq!(render_pass.interval.end_ticks, Some(180));
        assert_eq!(render_pass.subpasses.len(), 1);
        assert_eq!(render_pass.subpasses[0].interval.begin_ticks, Some(120));
        assert_eq!(render_pass.subpasses[0].interval.end_ticks, Some(150));
        assert_eq!(render_pass.subpasses[0].group_start, 0);
        assert_eq!(render_pass.subpasses[0].group_end, 1);
    }

    #[test]
    fn measured_ticks_sums_only_measured_groups() {
        let cmd_buffer = ResolvedCommandBuffer {
            identity: Identity::new(RawHandle(1), 1),
            total_interval: ResolvedInterval {
                begin_ticks: Some(0),
                end_ticks: Some(100),
            },
            groups: vec![
                ResolvedGroup {
                    pipeline: RawHandle(2),
                    interval: ResolvedInterval {
                        begin_ticks: Some(0),
                        end_ticks: Some(30),
                    },
                },
                ResolvedGroup {
                    pipeline: RawHandle(3),
                    interval: ResolvedInterval::default(),
                },
            ],
            render_passes: Vec::new(),
            commands: Vec::new(),
        };
        assert_eq!(cmd_buffer.measured_ticks(), 30);
        assert!(cmd_buffer.measured_ticks() <= cmd_buffer.total_ticks());
    }
}
