//! Shadow command buffer (§4.F).
//!
//! A parallel, host-side representation of one recorded command buffer: the
//! structural nesting of commands into pipeline groups and its own owning
//! timestamp-query pool. Grounded on `profiler_command_buffer.h`'s
//! `ProfilerCommandBuffer` (`Begin`/`End`/`Reset`/`PreCommand`/`PostCommand`),
//! generalized from Vulkan-specific arguments to the [`Command`] tagged
//! variant.
//!
//! Group-boundary policy for `per_pipeline` and `per_render_pass` sampling is
//! implemented as one mechanism: a "current open group" that `pre_command`
//! closes and reopens when the attributed pipeline (or render-pass nesting)
//! changes, and that `post_command` closes immediately for modes where the
//! boundary is known synchronously (`per_drawcall`, and `end_render_pass` in
//! every mode coarser than `per_drawcall`). This covers all four sampling
//! modes' per-mode behavior without four separate state machines.
//!
//! `BeginRenderPass`/`BeginSubpass`/`EndSubpass`/`EndRenderPass` additionally
//! drive a second, independent tier of intervals (render pass → subpass)
//! tracked alongside the pipeline-group tier, every pipeline group falling
//! inside the subpass (and render pass) open when it was recorded (§3
//! "structural nesting").

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::TimestampSink;
use crate::command::{BindPoint, Command, ImplicitPipelineKind};
use crate::config::SamplingMode;
use crate::handle::{Identity, RawHandle};
use crate::query_pool::{Slot, TimestampQueryPool, INVALID_SLOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

/// Stable synthetic pipeline handles for GPU work with no application-bound
/// pipeline, pre-registered at engine initialization (§4.F "Implicit pipeline
/// attribution").
pub struct ImplicitPipelines {
    handles: HashMap<ImplicitPipelineKind, RawHandle>,
}

impl ImplicitPipelines {
    pub fn new(mut assign: impl FnMut(ImplicitPipelineKind) -> RawHandle) -> Self {
        use ImplicitPipelineKind::*;
        let kinds = [
            Copy,
            Blit,
            Resolve,
            Fill,
            Update,
            Clear,
            AccelerationStructureBuild,
            AccelerationStructureCopy,
            MicromapBuild,
            MicromapCopy,
            RenderPassBoundary,
        ];
        let handles = kinds.into_iter().map(|kind| (kind, assign(kind))).collect();
        Self { handles }
    }

    pub fn handle(&self, kind: ImplicitPipelineKind) -> RawHandle {
        self.handles.get(&kind).copied().unwrap_or(RawHandle(0))
    }
}

/// A contiguous interval attributed to one pipeline (§4.F, §3 "structural nesting").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineGroup {
    pub pipeline: RawHandle,
    pub bind_point: Option<BindPoint>,
    pub begin_slot: Slot,
    pub end_slot: Slot,
}

/// A contiguous interval covering one subpass, and the half-open range of
/// `groups` nested inside it (§3 "pipelines into subpasses", §8 invariant
/// I2: "every subpass interval contains its pipelines' intervals").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassGroup {
    pub index: u32,
    pub begin_slot: Slot,
    pub end_slot: Slot,
    pub group_start: usize,
    pub group_end: usize,
}

/// A contiguous interval covering one render pass and its subpasses (§3
/// "subpasses into render passes", §8 invariant I2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassGroup {
    pub render_pass: RawHandle,
    pub begin_slot: Slot,
    pub end_slot: Slot,
    pub subpasses: Vec<SubpassGroup>,
}

/// One recorded command, referencing the group its interval belongs to.
/// `group_index` is [`NO_GROUP`] for commands that never open an interval
/// (e.g. `bind_pipeline` itself, debug labels).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEntry {
    pub command: Command,
    pub group_index: usize,
}

pub const NO_GROUP: usize = usize::MAX;

/// Immutable snapshot of one command buffer's structure, as materialized by
/// the lazy structural-tree visitor (§3 "the tree is materialized lazily").
/// Slots are unresolved query indices; the aggregator resolves them to device
/// ticks via [`TimestampQueryPool::read_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBufferSnapshot {
    pub identity: Identity,
    pub buffer_begin_slot: Slot,
    pub buffer_end_slot: Slot,
    pub groups: Vec<PipelineGroup>,
    pub render_passes: Vec<RenderPassGroup>,
    pub commands: Vec<CommandEntry>,
}

pub struct ShadowCommandBuffer {
    identity: Identity,
    pool: RawHandle,
    level: CommandBufferLevel,
    sampling_mode: SamplingMode,
    query_pool: TimestampQueryPool,
    perf_query_pool: Option<RawHandle>,

    buffer_begin_slot: Slot,
    buffer_end_slot: Slot,
    groups: Vec<PipelineGroup>,
    commands: Vec<CommandEntry>,
    current_group: Option<usize>,
    current_pipeline: HashMap<BindPoint, RawHandle>,

    render_passes: Vec<RenderPassGroup>,
    current_render_pass: Option<usize>,
    current_subpass: Option<usize>,

    dirty: bool,
    cached_snapshot: Option<Arc<CommandBufferSnapshot>>,
}

impl ShadowCommandBuffer {
    pub fn new(
        identity: Identity,
        pool: RawHandle,
        level: CommandBufferLevel,
        sampling_mode: SamplingMode,
    ) -> Self {
        Self {
            identity,
            pool,
            level,
            sampling_mode,
            query_pool: TimestampQueryPool::new(),
            perf_query_pool: None,
            buffer_begin_slot: INVALID_SLOT,
            buffer_end_slot: INVALID_SLOT,
            groups: Vec::new(),
            commands: Vec::new(),
            current_group: None,
            current_pipeline: HashMap::new(),
            render_passes: Vec::new(),
            current_render_pass: None,
            current_subpass: None,
            dirty: true,
            cached_snapshot: None,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn pool(&self) -> RawHandle {
        self.pool
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    pub fn set_performance_query_pool(&mut self, pool: RawHandle) {
        self.perf_query_pool = Some(pool);
    }

    pub fn performance_query_pool(&self) -> Option<RawHandle> {
        self.perf_query_pool
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Resets shadow state, clears the command sequence, and acquires a
    /// fresh timestamp-query pool beginning (§4.F `begin(info)`).
    pub fn begin(
        &mut self,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        self.query_pool.begin();
        self.groups.clear();
        self.commands.clear();
        self.current_group = None;
        self.current_pipeline.clear();
        self.render_passes.clear();
        self.current_render_pass = None;
        self.current_subpass = None;
        self.dirty = true;
        self.cached_snapshot = None;
        self.buffer_begin_slot = self.query_pool.write(
            sink,
            crate::backend::PipelineStage::TopOfPipe,
            &mut *allocate,
        );
        self.buffer_end_slot = INVALID_SLOT;
    }

    /// Finalizes recording; marks the buffer ready for submission (§4.F `end()`).
    pub fn end(
        &mut self,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        self.close_current_group(sink, allocate);
        self.buffer_end_slot = self.query_pool.write(
            sink,
            crate::backend::PipelineStage::BottomOfPipe,
            &mut *allocate,
        );
    }

    /// Clears the command sequence and queries (§4.F `reset(flags)`).
    pub fn reset(&mut self, sink: &mut impl TimestampSink) {
        self.query_pool.reset(sink);
        self.groups.clear();
        self.commands.clear();
        self.current_group = None;
        self.current_pipeline.clear();
        self.render_passes.clear();
        self.current_render_pass = None;
        self.current_subpass = None;
        self.buffer_begin_slot = INVALID_SLOT;
        self.buffer_end_slot = INVALID_SLOT;
        self.dirty = true;
        self.cached_snapshot = None;
    }

    fn attribute_pipeline(&mut self, command: &Command, implicit: &ImplicitPipelines) -> RawHandle {
        if let Command::BindPipeline { bind_point, pipeline } = command {
            self.current_pipeline.insert(*bind_point, *pipeline);
            return *pipeline;
        }
        if let Some(bind_point) = command.bind_point() {
            return self
                .current_pipeline
                .get(&bind_point)
                .copied()
                .unwrap_or(RawHandle(0));
        }
        if let Some(kind) = command.implicit_pipeline_kind() {
            return implicit.handle(kind);
        }
        RawHandle(0)
    }

    fn opens_new_group(&self, pipeline: RawHandle, command: &Command) -> bool {
        match self.sampling_mode {
            SamplingMode::PerDrawcall => {
                command.is_drawcall() || command.implicit_pipeline_kind().is_some()
            }
            SamplingMode::PerPipeline => {
                self.current_group.map(|idx| self.groups[idx].pipeline) != Some(pipeline)
            }
            SamplingMode::PerRenderPass => {
                matches!(command, Command::BeginRenderPass { .. }) || self.current_group.is_none()
            }
            SamplingMode::PerFrame => false,
        }
    }

    fn closes_immediately(&self, command: &Command) -> bool {
        match self.sampling_mode {
            SamplingMode::PerDrawcall => {
                command.is_drawcall() || command.implicit_pipeline_kind().is_some()
            }
            SamplingMode::PerPipeline | SamplingMode::PerRenderPass => {
                matches!(command, Command::EndRenderPass)
            }
            SamplingMode::PerFrame => false,
        }
    }

    fn close_current_group(
        &mut self,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        if let Some(idx) = self.current_group.take() {
            if self.groups[idx].end_slot == INVALID_SLOT {
                self.groups[idx].end_slot = match self.sampling_mode {
                    SamplingMode::PerFrame => INVALID_SLOT,
                    _ => self.query_pool.write(
                        sink,
                        crate::backend::PipelineStage::BottomOfPipe,
                        &mut *allocate,
                    ),
                };
            }
        }
    }

    /// Closes the open subpass, if any, writing its end timestamp and fixing
    /// up the half-open range of pipeline groups nested inside it (§3
    /// "pipelines into subpasses").
    fn close_current_subpass(
        &mut self,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        if let (Some(rp_idx), Some(sp_idx)) = (self.current_render_pass, self.current_subpass.take()) {
            let group_end = self.groups.len();
            let subpass = &mut self.render_passes[rp_idx].subpasses[sp_idx];
            if subpass.end_slot == INVALID_SLOT {
                subpass.end_slot = match self.sampling_mode {
                    SamplingMode::PerFrame => INVALID_SLOT,
                    _ => self.query_pool.write(
                        sink,
                        crate::backend::PipelineStage::BottomOfPipe,
                        &mut *allocate,
                    ),
                };
            }
            subpass.group_end = group_end;
        }
    }

    /// Closes the open render pass, if any, closing its open subpass first
    /// (§3 "subpasses into render passes", §8 invariant I2).
    fn close_current_render_pass(
        &mut self,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        self.close_current_subpass(sink, allocate);
        if let Some(rp_idx) = self.current_render_pass.take() {
            let render_pass = &mut self.render_passes[rp_idx];
            if render_pass.end_slot == INVALID_SLOT {
                render_pass.end_slot = match self.sampling_mode {
                    SamplingMode::PerFrame => INVALID_SLOT,
                    _ => self.query_pool.write(
                        sink,
                        crate::backend::PipelineStage::BottomOfPipe,
                        &mut *allocate,
                    ),
                };
            }
        }
    }

    /// Pre-visitor: decides whether a begin timestamp is needed under the
    /// active sampling mode and emits it (§4.F `pre_command(cmd)`).
    pub fn pre_command(
        &mut self,
        command: &Command,
        implicit: &ImplicitPipelines,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        match command {
            Command::BeginRenderPass { render_pass } => {
                self.close_current_render_pass(sink, allocate);
                let begin_slot = match self.sampling_mode {
                    SamplingMode::PerFrame => INVALID_SLOT,
                    _ => self.query_pool.write(
                        sink,
                        crate::backend::PipelineStage::TopOfPipe,
                        &mut *allocate,
                    ),
                };
                self.render_passes.push(RenderPassGroup {
                    render_pass: *render_pass,
                    begin_slot,
                    end_slot: INVALID_SLOT,
                    subpasses: Vec::new(),
                });
                self.current_render_pass = Some(self.render_passes.len() - 1);
            }
            Command::BeginSubpass { index } => {
                self.close_current_subpass(sink, allocate);
                if let Some(rp_idx) = self.current_render_pass {
                    let begin_slot = match self.sampling_mode {
                        SamplingMode::PerFrame => INVALID_SLOT,
                        _ => self.query_pool.write(
                            sink,
                            crate::backend::PipelineStage::TopOfPipe,
                            &mut *allocate,
                        ),
                    };
                    let group_start = self.groups.len();
                    self.render_passes[rp_idx].subpasses.push(SubpassGroup {
                        index: *index,
                        begin_slot,
                        end_slot: INVALID_SLOT,
                        group_start,
                        group_end: group_start,
                    });
                    self.current_subpass = Some(self.render_passes[rp_idx].subpasses.len() - 1);
                }
            }
            _ => {}
        }

        let pipeline = self.attribute_pipeline(command, implicit);

        if self.opens_new_group(pipeline, command) {
            self.close_current_group(sink, allocate);
            let begin_slot = match self.sampling_mode {
                SamplingMode::PerFrame => INVALID_SLOT,
                _ => self.query_pool.write(
                    sink,
                    crate::backend::PipelineStage::TopOfPipe,
                    &mut *allocate,
                ),
            };
            self.groups.push(PipelineGroup {
                pipeline,
                bind_point: command.bind_point(),
                begin_slot,
                end_slot: INVALID_SLOT,
            });
            self.current_group = Some(self.groups.len() - 1);
        }
    }

    /// Post-visitor: decides whether an end timestamp is needed now, and
    /// records the command against its group (§4.F `post_command(cmd)`).
    pub fn post_command(
        &mut self,
        command: Command,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        let group_index = self.current_group.unwrap_or(NO_GROUP);
        let closes_now = self.closes_immediately(&command);
        let is_end_subpass = matches!(command, Command::EndSubpass);
        let is_end_render_pass = matches!(command, Command::EndRenderPass);
        self.commands.push(CommandEntry { command, group_index });

        if closes_now {
            self.close_current_group(sink, allocate);
        }
        if is_end_subpass {
            self.close_current_subpass(sink, allocate);
        }
        if is_end_render_pass {
            self.close_current_render_pass(sink, allocate);
        }
        self.cached_snapshot = None;
    }

    /// Invalidates the last resolved dataset so it will be re-built from
    /// queries, and clears the dirty flag (§4.F `submit()`, §3 "dirty flag").
    pub fn submit(&mut self) {
        self.dirty = false;
        self.cached_snapshot = None;
    }

    /// Returns an immutable shared snapshot of the structural tree and
    /// per-node slot indices (§4.F `data()`).
    pub fn data(&mut self) -> Arc<CommandBufferSnapshot> {
        if let Some(snapshot) = &self.cached_snapshot {
            return snapshot.clone();
        }
        let snapshot = Arc::new(CommandBufferSnapshot {
            identity: self.identity,
            buffer_begin_slot: self.buffer_begin_slot,
            buffer_end_slot: self.buffer_end_slot,
            groups: self.groups.clone(),
            render_passes: self.render_passes.clone(),
            commands: self.commands.clone(),
        });
        self.cached_snapshot = Some(snapshot.clone());
        snapshot
    }

    pub fn read_all(&self, read_pool: impl FnMut(RawHandle, u32) -> Vec<u64>) -> Vec<u64> {
        self.query_pool.read_all(read_pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PipelineStage;
    use crate::handle::Identity;

    struct RecordingSink {
        writes: usize,
    }

    impl TimestampSink for RecordingSink {
        fn write_timestamp(&mut self, _pool: RawHandle, _slot: u32, _stage: PipelineStage) {
            self.writes += 1;
        }

        fn reset_query_pool(&mut self, _pool: RawHandle, _slot_count: u32) {}
    }

    fn allocator() -> impl FnMut(u32) -> Option<RawHandle> {
        let mut next = 1u64;
        move |_size| {
            let value = next;
            next += 1;
            Some(RawHandle(value))
        }
    }

    fn implicit_pipelines() -> ImplicitPipelines {
        let mut next = 1000u64;
        ImplicitPipelines::new(move |_kind| {
            next += 1;
            RawHandle(next)
        })
    }

    fn new_buffer(mode: SamplingMode) -> ShadowCommandBuffer {
        ShadowCommandBuffer::new(
            Identity::new(RawHandle(1), 1),
            RawHandle(2),
            CommandBufferLevel::Primary,
            mode,
        )
    }

    #[test]
    fn per_drawcall_brackets_each_drawcall_individually() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerDrawcall);
        let mut sink = RecordingSink { writes: 0 };
        let implicit = implicit_pipelines();
        let mut allocate = allocator();

        cmd_buffer.begin(&mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::Draw, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Draw, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::Dispatch, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Dispatch, &mut sink, &mut allocate);
        cmd_buffer.end(&mut sink, &mut allocate);

        let snapshot = cmd_buffer.data();
        assert_eq!(snapshot.groups.len(), 2);
        for group in &snapshot.groups {
            assert_ne!(group.begin_slot, INVALID_SLOT);
            assert_ne!(group.end_slot, INVALID_SLOT);
        }
    }

    #[test]
    fn per_pipeline_shares_one_group_until_next_bind() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerPipeline);
        let mut sink = RecordingSink { writes: 0 };
        let implicit = implicit_pipelines();
        let mut allocate = allocator();

        cmd_buffer.begin(&mut sink, &mut allocate);
        let bind_a = Command::BindPipeline {
            bind_point: BindPoint::Graphics,
            pipeline: RawHandle(11),
        };
        cmd_buffer.pre_command(&bind_a, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(bind_a, &mut sink, &mut allocate);

        cmd_buffer.pre_command(&Command::Draw, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Draw, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::DrawIndexed, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::DrawIndexed, &mut sink, &mut allocate);

        let bind_b = Command::BindPipeline {
            bind_point: BindPoint::Graphics,
            pipeline: RawHandle(12),
        };
        cmd_buffer.pre_command(&bind_b, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(bind_b, &mut sink, &mut allocate);
        cmd_buffer.end(&mut sink, &mut allocate);

        let snapshot = cmd_buffer.data();
        assert_eq!(snapshot.groups.len(), 2);
        assert_eq!(snapshot.groups[0].pipeline, RawHandle(11));
        assert_ne!(snapshot.groups[0].end_slot, INVALID_SLOT);
    }

    #[test]
    fn per_frame_records_no_groups() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerFrame);
        let mut sink = RecordingSink { writes: 0 };
        let implicit = implicit_pipelines();
        let mut allocate = allocator();

        cmd_buffer.begin(&mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::Draw, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Draw, &mut sink, &mut allocate);
        cmd_buffer.end(&mut sink, &mut allocate);

        let snapshot = cmd_buffer.data();
        assert!(snapshot.groups.is_empty());
        assert_ne!(snapshot.buffer_begin_slot, INVALID_SLOT);
        assert_ne!(snapshot.buffer_end_slot, INVALID_SLOT);
    }

    #[test]
    fn implicit_commands_attribute_to_synthetic_pipeline() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerDrawcall);
        let mut sink = RecordingSink { writes: 0 };
        let implicit = implicit_pipelines();
        let mut allocate = allocator();

        cmd_buffer.begin(&mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::CopyBuffer, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::CopyBuffer, &mut sink, &mut allocate);
        cmd_buffer.end(&mut sink, &mut allocate);

        let snapshot = cmd_buffer.data();
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(
            snapshot.groups[0].pipeline,
            implicit.handle(ImplicitPipelineKind::Copy)
        );
    }

    #[test]
    fn submit_clears_dirty_and_invalidates_cache() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerFrame);
        let mut sink = RecordingSink { writes: 0 };
        let mut allocate = allocator();
        cmd_buffer.begin(&mut sink, &mut allocate);
        assert!(cmd_buffer.is_dirty());
        cmd_buffer.submit();
        assert!(!cmd_buffer.is_dirty());
    }

    #[test]
    fn reset_clears_structure_and_queries() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerDrawcall);
        let mut sink = RecordingSink { writes: 0 };
        let implicit = implicit_pipelines();
        let mut allocate = allocator();

        cmd_buffer.begin(&mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::Draw, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Draw, &mut sink, &mut allocate);
        cmd_buffer.end(&mut sink, &mut allocate);

        cmd_buffer.reset(&mut sink);
        let snapshot = cmd_buffer.data();
        assert!(snapshot.groups.is_empty());
        assert!(snapshot.commands.is_empty());
        assert_eq!(snapshot.buffer_begin_slot, INVALID_SLOT);
    }

    #[test]
    fn render_pass_with_two_subpasses_nests_pipeline_groups() {
        let mut cmd_buffer = new_buffer(SamplingMode::PerDrawcall);
        let mut sink = RecordingSink { writes: 0 };
        let implicit = implicit_pipelines();
        let mut allocate = allocator();

        cmd_buffer.begin(&mut sink, &mut allocate);

        let begin_rp = Command::BeginRenderPass { render_pass: RawHandle(42) };
        cmd_buffer.pre_command(&begin_rp, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(begin_rp, &mut sink, &mut allocate);

        let begin_sp0 = Command::BeginSubpass { index: 0 };
        cmd_buffer.pre_command(&begin_sp0, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(begin_sp0, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::Draw, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Draw, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::EndSubpass, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::EndSubpass, &mut sink, &mut allocate);

        let begin_sp1 = Command::BeginSubpass { index: 1 };
        cmd_buffer.pre_command(&begin_sp1, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(begin_sp1, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::Draw, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::Draw, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::DrawIndexed, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::DrawIndexed, &mut sink, &mut allocate);
        cmd_buffer.pre_command(&Command::EndSubpass, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::EndSubpass, &mut sink, &mut allocate);

        cmd_buffer.pre_command(&Command::EndRenderPass, &implicit, &mut sink, &mut allocate);
        cmd_buffer.post_command(Command::EndRenderPass, &mut sink, &mut allocate);
        cmd_buffer.end(&mut sink, &mut allocate);

        let snapshot = cmd_buffer.data();
        assert_eq!(snapshot.render_passes.len(), 1);
        let render_pass = &snapshot.render_passes[0];
        assert_eq!(render_pass.render_pass, RawHandle(42));
        assert_ne!(render_pass.begin_slot, INVALID_SLOT);
        assert_ne!(render_pass.end_slot, INVALID_SLOT);
        assert_eq!(render_pass.subpasses.len(), 2);

        // Begin/end-render-pass themselves attribute to the synthetic
        // render-pass-boundary pipeline, so the nested drawcall groups sit
        // at indices 1..4 of the flat `groups` vector.
        let subpass0 = &render_pass.subpasses[0];
        assert_eq!(subpass0.index, 0);
        assert_eq!(subpass0.group_start, 1);
        assert_eq!(subpass0.group_end, 2);

        let subpass1 = &render_pass.subpasses[1];
        assert_eq!(subpass1.index, 1);
        assert_eq!(subpass1.group_start, 2);
        assert_eq!(subpass1.group_end, 4);

        // Every group nested inside a subpass's range falls within the
        // render pass's own timed interval (§8 invariant I2).
        for subpass in &render_pass.subpasses {
            for group in &snapshot.groups[subpass.group_start..subpass.group_end] {
                assert_ne!(group.begin_slot, INVALID_SLOT);
                assert_ne!(group.end_slot, INVALID_SLOT);
            }
        }

        assert_eq!(snapshot.groups.len(), 5);
    }
}
