//! The profiler facade (§4.J).
//!
//! `Profiler` owns every other component and is the only type the
//! interception layer constructs directly: object registry, catalog, memory
//! tracker, timeline synchronizer, counter backend, the shadow command
//! buffers, the submit recorder, and the frame aggregator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{ClockSource, CounterDriver, CounterReportReader, CounterResult, QueryPoolReader, TimestampSink};
use crate::catalog::{
    Catalog, PipelineBindPoint, PipelineExecutable, PipelineRecord, RayTracingStackSizes,
    RenderPassKind, RenderPassRecord, ShaderStage, SubpassRecord,
};
use crate::command::{Command, ImplicitPipelineKind};
use crate::command_buffer::{CommandBufferLevel, ImplicitPipelines, ShadowCommandBuffer};
use crate::config::{ConfigOverlay, FrameDelimiter, ProfilerConfig};
use crate::errors::{ConfigError, CreationError, EndFrameError};
use crate::frame::{resolve_command_buffer, FrameRecord, RenderPassSummary, ResolvedSubmitBatch, TopPipelineEntry};
use crate::handle::{HandleKind, Identity, ObjectRegistry, RawHandle};
use crate::memory::{AllocationInfo, BudgetSource, ImageBlockBinding, MemoryTracker};
use crate::submit::{CommandBufferDirtyMarker, SubmitBatch, SubmitInfo, SubmitKind, SubmitRecorder};
use crate::timeline::TimelineSynchronizer;

use crate::aggregator::{FrameAggregator, FrameResolver, PendingFrame};

/// Everything the frame resolver and the facade's event callbacks share.
/// Split out from [`Profiler`] so the resolver (which runs on the background
/// aggregation thread) can hold its own `Arc` without the facade itself
/// needing to be `Clone`.
struct Inner {
    config: Mutex<ProfilerConfig>,
    registry: ObjectRegistry,
    catalog: Catalog,
    memory: MemoryTracker,
    clock: TimelineSynchronizer<Box<dyn ClockSource + Send + Sync>>,
    counters: Mutex<Box<dyn CounterDriver + Send + Sync>>,
    query_reader: Box<dyn QueryPoolReader + Send + Sync>,
    counter_report_reader: Option<Box<dyn CounterReportReader + Send + Sync>>,
    budget_source: Box<dyn BudgetSource + Send + Sync>,
    implicit_pipelines: ImplicitPipelines,
    command_buffers: Mutex<HashMap<RawHandle, ShadowCommandBuffer>>,
}

impl CommandBufferDirtyMarker for Inner {
    fn mark_submitted(&self, command_buffer: RawHandle) {
        if let Some(cmd_buffer) = self.command_buffers.lock().get_mut(&command_buffer) {
            cmd_buffer.submit();
        }
    }
}

struct ProfilerResolver {
    inner: Arc<Inner>,
    /// The device-tick boundary of the last frame this resolver drained
    /// streaming counter samples up to; the next `read_stream_data` call
    /// picks up where the previous one left off (§4.C.2).
    last_counter_device_ts: Mutex<u64>,
}

impl FrameResolver for ProfilerResolver {
    /// Resolves every command buffer referenced by the frame's submit
    /// batches against its own query pool, aggregates per-pipeline GPU time,
    /// and snapshots memory and counters (§4.I "Resolving").
    fn resolve(&self, pending: PendingFrame, delimiter: FrameDelimiter, fps: f64) -> FrameRecord {
        let mut command_buffers = self.inner.command_buffers.lock();
        let mut submit_batches = Vec::with_capacity(pending.submits.len());
        let mut pipeline_totals: HashMap<RawHandle, (u64, u64)> = HashMap::new();
        let mut render_pass_handles: Vec<RawHandle> = Vec::new();
        let mut perf_query_pools: Vec<RawHandle> = Vec::new();

        for submit in &pending.submits {
            let mut resolved_cmd_buffers = Vec::new();
            for resolved_submit in &submit.submits {
                for identity in &resolved_submit.command_buffers {
                    let Some(cmd_buffer) = command_buffers.get_mut(&identity.raw_handle) else {
                        continue;
                    };
                    if let Some(pool) = cmd_buffer.performance_query_pool() {
                        if !perf_query_pools.contains(&pool) {
                            perf_query_pools.push(pool);
                        }
                    }
                    let snapshot = cmd_buffer.data();
                    let ticks = cmd_buffer.read_all(|pool, count| self.inner.query_reader.read_pool(pool, count));
                    let resolved = resolve_command_buffer(&snapshot, &ticks);

                    for group in &resolved.groups {
                        if let Some(ticks) = group.interval.duration_ticks() {
                            let entry = pipeline_totals.entry(group.pipeline).or_insert((0, 0));
                            entry.0 += ticks;
                            entry.1 += 1;
                        }
                    }
                    for render_pass in &resolved.render_passes {
                        if !render_pass_handles.contains(&render_pass.render_pass) {
                            render_pass_handles.push(render_pass.render_pass);
                        }
                    }
                    resolved_cmd_buffers.push(resolved);
                }
            }
            submit_batches.push(ResolvedSubmitBatch {
                queue: submit.queue,
                host_ts: submit.host_ts,
                thread_id: submit.thread_id,
                command_buffers: resolved_cmd_buffers,
            });
        }
        drop(command_buffers);

        let mut top_pipelines: Vec<TopPipelineEntry> = pipeline_totals
            .into_iter()
            .filter_map(|(pipeline, (total_ticks, invocation_count))| {
                self.inner.catalog.pipeline(pipeline).map(|record| TopPipelineEntry {
                    pipeline,
                    kind: record.kind,
                    total_ticks,
                    invocation_count,
                })
            })
            .collect();
        top_pipelines.sort_by(|a, b| b.total_ticks.cmp(&a.total_ticks));
        top_pipelines.truncate(10);

        let render_passes: Vec<RenderPassSummary> = render_pass_handles
            .into_iter()
            .filter_map(|handle| {
                self.inner.catalog.render_pass(handle).map(|record| RenderPassSummary {
                    render_pass: handle,
                    kind: record.kind,
                    subpass_count: record.subpasses.len() as u32,
                    color_clear_count: record.color_clear_count,
                    depth_stencil_clear_count: record.depth_stencil_clear_count,
                })
            })
            .collect();

        let memory = self.inner.memory.memory_data(self.inner.budget_source.as_ref());
        let boundary = self.inner.clock.sync();

        let counters = {
            let mut counters = self.inner.counters.lock();
            let set_index = counters.active_set();
            let queue_family = 0;

            let mut last_ts = self.last_counter_device_ts.lock();
            let resolved = if let Some((samples, _complete)) =
                counters.read_stream_data(*last_ts, boundary.device_ticks)
            {
                *last_ts = boundary.device_ticks;
                samples.last().map(|sample| sample.results.clone())
            } else {
                let report_size = counters.report_size(set_index, queue_family);
                perf_query_pools
                    .first()
                    .zip(self.inner.counter_report_reader.as_ref())
                    .map(|(pool, reader)| reader.read_report(*pool, report_size))
                    .and_then(|bytes| counters.parse_report(set_index, queue_family, &bytes).ok())
            };

            resolved.unwrap_or_else(|| {
                counters
                    .metrics_in_set(set_index)
                    .iter()
                    .enumerate()
                    .map(|(index, _)| CounterResult {
                        metric_index: index as u32,
                        value: crate::backend::CounterValue::U64(0),
                    })
                    .collect::<Vec<_>>()
            })
        };

        FrameRecord {
            index: pending.index,
            created_at_host_ns: pending.created_at_host_ns,
            fps,
            delimiter,
            boundary_host_ns: boundary.host_ns,
            boundary_device_ticks: boundary.device_ticks,
            submit_batches,
            top_pipelines,
            render_passes,
            memory,
            counters,
        }
    }
}

/// Owns the whole engine (§4.J). One instance per logical device.
pub struct Profiler {
    inner: Arc<Inner>,
    aggregator: FrameAggregator,
}

impl Profiler {
    /// Resolves configuration (file → create-info → environment, §6), wires
    /// the driver-boundary objects supplied by the interception layer, and
    /// opens frame #0.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config_file_path: Option<&std::path::Path>,
        config_overlay: Option<ConfigOverlay>,
        clock: Box<dyn ClockSource + Send + Sync>,
        counter_clock: Option<&dyn ClockSource>,
        counters: Box<dyn CounterDriver + Send + Sync>,
        query_reader: Box<dyn QueryPoolReader + Send + Sync>,
        counter_report_reader: Option<Box<dyn CounterReportReader + Send + Sync>>,
        budget_source: Box<dyn BudgetSource + Send + Sync>,
        heap_count: usize,
        type_count: usize,
        assign_implicit_pipeline: impl FnMut(ImplicitPipelineKind) -> RawHandle,
        initial_host_ns: u64,
    ) -> Result<Self, CreationError> {
        let config = ProfilerConfig::resolve(config_file_path, config_overlay).map_err(|err| match err {
            ConfigError::DataBufferSizeBelowMinimum { .. } => CreationError::DataBufferSizeBelowMinimum,
            ConfigError::InvalidMinDataBufferSize => CreationError::InvalidMinDataBufferSize,
            other => CreationError::ConfigInvalid(other.to_string()),
        })?;

        let registry = ObjectRegistry::new();
        let memory = MemoryTracker::new(config.enable_memory_profiling, heap_count, type_count);
        let timeline = TimelineSynchronizer::initialize(clock, counter_clock);
        let implicit_pipelines = ImplicitPipelines::new(assign_implicit_pipeline);
        let catalog = Catalog::new();
        for kind in implicit_pipeline_kinds() {
            let handle = implicit_pipelines.handle(kind);
            let identity = registry.register(HandleKind::Pipeline, handle);
            catalog.create_internal_pipeline(identity, PipelineBindPoint::Compute);
        }

        let data_buffer_size = config.data_buffer_size;
        let min_data_buffer_size = config.min_data_buffer_size;
        let enable_threading = config.enable_threading;

        let inner = Arc::new(Inner {
            config: Mutex::new(config),
            registry,
            catalog,
            memory,
            clock: timeline,
            counters: Mutex::new(counters),
            query_reader,
            counter_report_reader,
            budget_source,
            implicit_pipelines,
            command_buffers: Mutex::new(HashMap::new()),
        });

        let resolver: Arc<dyn FrameResolver> = Arc::new(ProfilerResolver {
            inner: inner.clone(),
            last_counter_device_ts: Mutex::new(0),
        });
        let aggregator = FrameAggregator::new(
            resolver,
            data_buffer_size,
            min_data_buffer_size,
            enable_threading,
            initial_host_ns,
        );

        Ok(Self { inner, aggregator })
    }

    // ---- Object lifetime callbacks (§4.A, §4.E, §4.G) ----

    pub fn register_buffer(&self, buffer: RawHandle, size: u64) -> Identity {
        let identity = self.inner.registry.register(HandleKind::Buffer, buffer);
        self.inner.memory.register_buffer(buffer, size);
        identity
    }

    pub fn unregister_buffer(&self, buffer: RawHandle) {
        self.inner.memory.unregister_buffer(buffer);
        self.inner.registry.unregister(HandleKind::Buffer, buffer);
    }

    pub fn register_image(&self, image: RawHandle, size: u64) -> Identity {
        let identity = self.inner.registry.register(HandleKind::Image, image);
        self.inner.memory.register_image(image, size);
        identity
    }

    pub fn unregister_image(&self, image: RawHandle) {
        self.inner.memory.unregister_image(image);
        self.inner.registry.unregister(HandleKind::Image, image);
    }

    pub fn register_allocation(&self, memory: RawHandle, info: AllocationInfo) -> Identity {
        let identity = self.inner.registry.register(HandleKind::DeviceMemory, memory);
        self.inner.memory.register_allocation(memory, info);
        identity
    }

    pub fn unregister_allocation(&self, memory: RawHandle) {
        self.inner.memory.unregister_allocation(memory);
        self.inner.registry.unregister(HandleKind::DeviceMemory, memory);
    }

    pub fn bind_buffer_memory(&self, buffer: RawHandle, memory: RawHandle, offset: u64) {
        self.inner.memory.bind_buffer_memory(buffer, memory, offset);
    }

    pub fn bind_sparse_buffer_memory(
        &self,
        buffer: RawHandle,
        resource_offset: u64,
        size: u64,
        memory: Option<(RawHandle, u64)>,
    ) {
        self.inner
            .memory
            .bind_sparse_buffer_memory(buffer, resource_offset, size, memory);
    }

    pub fn bind_image_memory(&self, image: RawHandle, memory: RawHandle, offset: u64) {
        self.inner.memory.bind_image_memory(image, memory, offset);
    }

    pub fn bind_sparse_image_opaque_memory(
        &self,
        image: RawHandle,
        resource_offset: u64,
        size: u64,
        memory: Option<(RawHandle, u64)>,
    ) {
        self.inner
            .memory
            .bind_sparse_image_opaque_memory(image, resource_offset, size, memory);
    }

    pub fn bind_sparse_image_block_memory(&self, image: RawHandle, binding: ImageBlockBinding) {
        self.inner.memory.bind_sparse_image_block_memory(image, binding);
    }

    pub fn register_pipeline(
        &self,
        pipeline: RawHandle,
        bind_point: PipelineBindPoint,
        stages: Vec<ShaderStage>,
        ray_tracing: Option<RayTracingStackSizes>,
    ) -> Identity {
        let identity = self.inner.registry.register(HandleKind::Pipeline, pipeline);
        self.inner.catalog.create_pipeline(identity, bind_point, stages, ray_tracing);
        identity
    }

    pub fn unregister_pipeline(&self, pipeline: RawHandle) {
        self.inner.catalog.destroy_pipeline(pipeline);
        self.inner.registry.unregister(HandleKind::Pipeline, pipeline);
    }

    pub fn set_pipeline_executables(&self, pipeline: RawHandle, executables: Vec<PipelineExecutable>) {
        self.inner.catalog.set_pipeline_executables(pipeline, executables);
    }

    pub fn pipeline(&self, pipeline: RawHandle) -> Option<PipelineRecord> {
        self.inner.catalog.pipeline(pipeline)
    }

    pub fn register_render_pass(
        &self,
        render_pass: RawHandle,
        kind: RenderPassKind,
        subpasses: Vec<SubpassRecord>,
        color_clear_count: u32,
        depth_stencil_clear_count: u32,
    ) -> Identity {
        let identity = self.inner.registry.register(HandleKind::RenderPass, render_pass);
        self.inner
            .catalog
            .create_render_pass(identity, kind, subpasses, color_clear_count, depth_stencil_clear_count);
        identity
    }

    pub fn unregister_render_pass(&self, render_pass: RawHandle) {
        self.inner.catalog.destroy_render_pass(render_pass);
        self.inner.registry.unregister(HandleKind::RenderPass, render_pass);
    }

    pub fn render_pass(&self, render_pass: RawHandle) -> Option<RenderPassRecord> {
        self.inner.catalog.render_pass(render_pass)
    }

    // ---- Command buffer lifecycle (§4.F) ----

    pub fn register_command_buffer(&self, pool: RawHandle, cmd_buffer: RawHandle, level: CommandBufferLevel) -> Identity {
        let identity = self.inner.registry.register(HandleKind::CommandBuffer, cmd_buffer);
        let sampling_mode = self.inner.config.lock().sampling_mode;
        self.inner
            .command_buffers
            .lock()
            .insert(cmd_buffer, ShadowCommandBuffer::new(identity, pool, level, sampling_mode));
        identity
    }

    pub fn unregister_command_buffer(&self, cmd_buffer: RawHandle) {
        self.inner.command_buffers.lock().remove(&cmd_buffer);
        self.inner.registry.unregister(HandleKind::CommandBuffer, cmd_buffer);
    }

    pub fn begin_command_buffer(
        &self,
        cmd_buffer: RawHandle,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        if let Some(shadow) = self.inner.command_buffers.lock().get_mut(&cmd_buffer) {
            shadow.begin(sink, allocate);
        }
    }

    pub fn end_command_buffer(
        &self,
        cmd_buffer: RawHandle,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        if let Some(shadow) = self.inner.command_buffers.lock().get_mut(&cmd_buffer) {
            shadow.end(sink, allocate);
        }
    }

    pub fn reset_command_buffer(&self, cmd_buffer: RawHandle, sink: &mut impl TimestampSink) {
        if let Some(shadow) = self.inner.command_buffers.lock().get_mut(&cmd_buffer) {
            shadow.reset(sink);
        }
    }

    pub fn pre_command(
        &self,
        cmd_buffer: RawHandle,
        command: &Command,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        if let Some(shadow) = self.inner.command_buffers.lock().get_mut(&cmd_buffer) {
            shadow.pre_command(command, &self.inner.implicit_pipelines, sink, allocate);
        }
    }

    pub fn post_command(
        &self,
        cmd_buffer: RawHandle,
        command: Command,
        sink: &mut impl TimestampSink,
        allocate: &mut impl FnMut(u32) -> Option<RawHandle>,
    ) {
        if let Some(shadow) = self.inner.command_buffers.lock().get_mut(&cmd_buffer) {
            shadow.post_command(command, sink, allocate);
        }
    }

    // ---- Submission and frame events (§4.H, §4.I) ----

    pub fn pre_submit(
        &self,
        queue: RawHandle,
        infos: &[SubmitInfo],
        kind: SubmitKind,
        host_ts: u64,
        thread_id: u64,
    ) -> SubmitBatch {
        let recorder = SubmitRecorder::new(&self.inner.registry);
        recorder.record(queue, infos, kind, host_ts, thread_id, self.inner.as_ref())
    }

    pub fn post_submit(&self, batch: SubmitBatch) {
        self.aggregator.append_submit(batch);
    }

    /// Called on every potential frame-delimiter event (`vkQueuePresentKHR`
    /// when configured for `present`, every `vkQueueSubmit`/`vkQueueSubmit2`
    /// when configured for `submit`). The facade itself filters by the
    /// configured delimiter kind so a `submit`-configured engine flushes on
    /// every submission regardless of which queue it targeted — a global,
    /// per-process boundary rather than one scoped to an individual queue.
    pub fn finish_frame(&self, event: FrameDelimiter, host_ns: u64, fps: f64) -> Result<(), EndFrameError> {
        let configured = self.inner.config.lock().frame_delimiter;
        if configured != event {
            return Ok(());
        }
        if self
            .inner
            .command_buffers
            .lock()
            .values()
            .any(ShadowCommandBuffer::is_dirty)
        {
            return Err(EndFrameError::UnclosedCommandBuffer);
        }
        self.aggregator.delimiter(configured, host_ns, fps);
        Ok(())
    }

    pub fn poll_frame(&self) -> Option<FrameRecord> {
        self.aggregator.poll_frame()
    }

    pub fn get_frame(&self, index: u64) -> Option<FrameRecord> {
        self.aggregator.peek(index)
    }

    // ---- Configuration setters (§4.J "every configuration setter takes a mutex") ----

    pub fn set_sampling_mode(&self, mode: crate::config::SamplingMode) {
        self.inner.config.lock().sampling_mode = mode;
    }

    pub fn set_data_buffer_size(&self, size: u32) -> Result<(), ConfigError> {
        self.aggregator.set_data_buffer_size(size)
    }

    pub fn set_active_metrics_set(&self, set_index: u32) -> Result<(), crate::errors::CounterError> {
        self.inner.counters.lock().set_active_set(set_index)
    }

    pub fn metric_sets(&self) -> Vec<String> {
        self.inner.counters.lock().metric_sets().to_vec()
    }

    pub fn frame_delimiter(&self) -> FrameDelimiter {
        self.inner.config.lock().frame_delimiter
    }
}

fn implicit_pipeline_kinds() -> [ImplicitPipelineKind; 11] {
    use ImplicitPipelineKind::*;
    [
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
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CounterValue, MetricMetadata, PipelineStage, TimeDomain, Timestamps};
    use crate::catalog::PipelineBindPoint;
    use crate::errors::{CounterError, SyncError};
    use crate::memory::HeapSizeBudget;

    struct NullSink;
    impl TimestampSink for NullSink {
        fn write_timestamp(&mut self, _pool: RawHandle, _slot: u32, _stage: PipelineStage) {}
        fn reset_query_pool(&mut self, _pool: RawHandle, _slot_count: u32) {}
    }

    struct FixedClock;
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

    struct EmptyCounters;
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
        fn parse_report(&self, _set_index: u32, _queue_family: u32, _bytes: &[u8]) -> Result<Vec<CounterResult>, CounterError> {
            Ok(Vec::new())
        }
        fn supports_query_pool_reuse(&self) -> bool {
            false
        }
    }

    struct ZeroReader;
    impl QueryPoolReader for ZeroReader {
        fn read_pool(&self, _pool: RawHandle, count: u32) -> Vec<u64> {
            vec![0; count as usize]
        }
    }

    fn new_profiler() -> Profiler {
        let mut next = 5000u64;
        Profiler::new(
            None,
            None,
            Box::new(FixedClock),
            None,
            Box::new(EmptyCounters),
            Box::new(ZeroReader),
            None,
            Box::new(HeapSizeBudget { heap_sizes: vec![1 << 20] }),
            1,
            1,
            move |_kind| {
                next += 1;
                RawHandle(next)
            },
            0,
        )
        .unwrap()
    }

    #[test]
    fn construction_registers_implicit_pipelines() {
        let profiler = new_profiler();
        assert!(profiler
            .inner
            .catalog
            .pipeline(profiler.inner.implicit_pipelines.handle(ImplicitPipelineKind::Copy))
            .is_some());
    }

    #[test]
    fn finish_frame_rejects_unclosed_command_buffer() {
        let profiler = new_profiler();
        let pool = RawHandle(1);
        let cmd_buffer = RawHandle(2);
        profiler.register_command_buffer(pool, cmd_buffer, CommandBufferLevel::Primary);
        let mut sink = NullSink;
        let mut allocate = |_size| Some(RawHandle(99));
        profiler.begin_command_buffer(cmd_buffer, &mut sink, &mut allocate);

        let result = profiler.finish_frame(FrameDelimiter::Present, 10, 60.0);
        assert_eq!(result, Err(EndFrameError::UnclosedCommandBuffer));
    }

    #[test]
    fn finish_frame_ignores_events_not_matching_configured_delimiter() {
        let profiler = new_profiler();
        assert_eq!(profiler.frame_delimiter(), FrameDelimiter::Present);
        profiler.finish_frame(FrameDelimiter::Submit, 10, 60.0).unwrap();
        assert!(profiler.poll_frame().is_none());
    }

    #[test]
    fn end_to_end_single_draw_produces_a_resolved_frame() {
        let profiler = new_profiler();
        let pool = RawHandle(1);
        let cmd_buffer = RawHandle(2);
        profiler.register_command_buffer(pool, cmd_buffer, CommandBufferLevel::Primary);
        profiler.register_pipeline(RawHandle(3), PipelineBindPoint::Graphics, Vec::new(), None);

        let mut sink = NullSink;
        let mut next_handle = 100u64;
        let mut allocate = move |_size| {
            next_handle += 1;
            Some(RawHandle(next_handle))
        };

        profiler.begin_command_buffer(cmd_buffer, &mut sink, &mut allocate);
        let bind = Command::BindPipeline {
            bind_point: crate::command::BindPoint::Graphics,
            pipeline: RawHandle(3),
        };
        profiler.pre_command(cmd_buffer, &bind, &mut sink, &mut allocate);
        profiler.post_command(cmd_buffer, bind, &mut sink, &mut allocate);
        profiler.pre_command(cmd_buffer, &Command::Draw, &mut sink, &mut allocate);
        profiler.post_command(cmd_buffer, Command::Draw, &mut sink, &mut allocate);
        profiler.end_command_buffer(cmd_buffer, &mut sink, &mut allocate);

        let batch = profiler.pre_submit(
            RawHandle(10),
            &[SubmitInfo {
                command_buffers: vec![cmd_buffer],
                wait_semaphores: vec![],
                signal_semaphores: vec![],
            }],
            SubmitKind::Legacy,
            0,
            0,
        );
        profiler.post_submit(batch);

        profiler.finish_frame(FrameDelimiter::Present, 16, 60.0).unwrap();
        let frame = profiler.poll_frame().unwrap();
        assert_eq!(frame.index, 0);
        assert_eq!(frame.submit_batches.len(), 1);
        assert_eq!(frame.submit_batches[0].command_buffers.len(), 1);
    }

    #[test]
    fn frame_record_populates_render_passes_from_recorded_render_pass() {
        use crate::catalog::{RenderPassKind, SubpassRecord};

        let profiler = new_profiler();
        let pool = RawHandle(1);
        let cmd_buffer = RawHandle(2);
        let render_pass = RawHandle(7);
        profiler.register_command_buffer(pool, cmd_buffer, CommandBufferLevel::Primary);
        profiler.register_render_pass(
            render_pass,
            RenderPassKind::Graphics,
            vec![SubpassRecord { resolve_attachment_count: 0 }, SubpassRecord { resolve_attachment_count: 1 }],
            2,
            1,
        );

        let mut sink = NullSink;
        let mut next_handle = 200u64;
        let mut allocate = move |_size| {
            next_handle += 1;
            Some(RawHandle(next_handle))
        };

        profiler.begin_command_buffer(cmd_buffer, &mut sink, &mut allocate);
        let begin_rp = Command::BeginRenderPass { render_pass };
        profiler.pre_command(cmd_buffer, &begin_rp, &mut sink, &mut allocate);
        profiler.post_command(cmd_buffer, begin_rp, &mut sink, &mut allocate);
        profiler.pre_command(cmd_buffer, &Command::Draw, &mut sink, &mut allocate);
        profiler.post_command(cmd_buffer, Command::Draw, &mut sink, &mut allocate);
        profiler.pre_command(cmd_buffer, &Command::EndRenderPass, &mut sink, &mut allocate);
        profiler.post_command(cmd_buffer, Command::EndRenderPass, &mut sink, &mut allocate);
        profiler.end_command_buffer(cmd_buffer, &mut sink, &mut allocate);

        let batch = profiler.pre_submit(
            RawHandle(10),
            &[SubmitInfo {
                command_buffers: vec![cmd_buffer],
                wait_semaphores: vec![],
                signal_semaphores: vec![],
            }],
            SubmitKind::Legacy,
            0,
            0,
        );
        profiler.post_submit(batch);

        profiler.finish_frame(FrameDelimiter::Present, 16, 60.0).unwrap();
        let frame = profiler.poll_frame().unwrap();
        assert_eq!(frame.render_passes.len(), 1);
        assert_eq!(frame.render_passes[0].render_pass, render_pass);
        assert_eq!(frame.render_passes[0].kind, RenderPassKind::Graphics);
        assert_eq!(frame.render_passes[0].subpass_count, 2);
        assert_eq!(frame.render_passes[0].color_clear_count, 2);
        assert_eq!(frame.render_passes[0].depth_stencil_clear_count, 1);
    }

    #[test]
    fn frame_counters_come_from_streaming_backend_samples() {
        use crate::backend::counters_query::MetricSet;
        use crate::backend::counters_stream::{RawReport, RawReportSource, StreamingCounterBackend};
        use std::sync::mpsc;

        struct ChannelSource(mpsc::Receiver<RawReport>);
        impl RawReportSource for ChannelSource {
            fn drain(&mut self, _drop_oldest: bool) -> Vec<RawReport> {
                self.0.try_iter().collect()
            }
        }

        let (tx, rx) = mpsc::channel();
        let sets = vec![MetricSet {
            name: "default".into(),
            metrics: vec![MetricMetadata {
                name: "m".into(),
                category: "c".into(),
                description: String::new(),
                storage: crate::backend::CounterStorageKind::U64,
                unit: crate::backend::CounterUnit::Generic,
                result_factor: 1.0,
                uuid: [0; 16],
            }],
        }];
        let backend = StreamingCounterBackend::new(sets, "default", ChannelSource(rx)).unwrap();

        // `FixedClock::sync()` always reports device_ticks = 1, so a report
        // timestamped at 0 lands inside the resolver's (0, 1) read window.
        tx.send(RawReport {
            device_ts_ns: 0,
            host_ts_ns: 0,
            bytes: 7u64.to_le_bytes().to_vec(),
        })
        .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut next = 5000u64;
        let profiler = Profiler::new(
            None,
            None,
            Box::new(FixedClock),
            None,
            Box::new(backend),
            Box::new(ZeroReader),
            None,
            Box::new(HeapSizeBudget { heap_sizes: vec![1 << 20] }),
            1,
            1,
            move |_kind| {
                next += 1;
                RawHandle(next)
            },
            0,
        )
        .unwrap();

        profiler.finish_frame(FrameDelimiter::Present, 16, 60.0).unwrap();
        let frame = profiler.poll_frame().unwrap();
        assert_eq!(frame.counters.len(), 1);
        assert_eq!(frame.counters[0].value, CounterValue::U64(7));
    }

    #[test]
    fn frame_counters_come_from_query_mode_report_bytes() {
        use crate::backend::counters_query::{MetricSet, QueryCounterBackend};

        struct FixedReport;
        impl CounterReportReader for FixedReport {
            fn read_report(&self, _pool: RawHandle, _size: u32) -> Vec<u8> {
                9u64.to_le_bytes().to_vec()
            }
        }

        let sets = vec![MetricSet {
            name: "default".into(),
            metrics: vec![MetricMetadata {
                name: "m".into(),
                category: "c".into(),
                description: String::new(),
                storage: crate::backend::CounterStorageKind::U64,
                unit: crate::backend::CounterUnit::Generic,
                result_factor: 1.0,
                uuid: [0; 16],
            }],
        }];
        let backend = QueryCounterBackend::new(sets, "default", true).unwrap();

        let mut next = 5000u64;
        let profiler = Profiler::new(
            None,
            None,
            Box::new(FixedClock),
            None,
            Box::new(backend),
            Box::new(ZeroReader),
            Some(Box::new(FixedReport)),
            Box::new(HeapSizeBudget { heap_sizes: vec![1 << 20] }),
            1,
            1,
            move |_kind| {
                next += 1;
                RawHandle(next)
            },
            0,
        )
        .unwrap();

        let pool = RawHandle(1);
        let cmd_buffer = RawHandle(2);
        profiler.register_command_buffer(pool, cmd_buffer, CommandBufferLevel::Primary);
        {
            let mut command_buffers = profiler.inner.command_buffers.lock();
            command_buffers
                .get_mut(&cmd_buffer)
                .unwrap()
                .set_performance_query_pool(RawHandle(77));
        }

        let mut sink = NullSink;
        let mut allocate = |_size| Some(RawHandle(99));
        profiler.begin_command_buffer(cmd_buffer, &mut sink, &mut allocate);
        profiler.end_command_buffer(cmd_buffer, &mut sink, &mut allocate);

        let batch = profiler.pre_submit(
            RawHandle(10),
            &[SubmitInfo {
                command_buffers: vec![cmd_buffer],
                wait_semaphores: vec![],
                signal_semaphores: vec![],
            }],
            SubmitKind::Legacy,
            0,
            0,
        );
        profiler.post_submit(batch);

        profiler.finish_frame(FrameDelimiter::Present, 16, 60.0).unwrap();
        let frame = profiler.poll_frame().unwrap();
        assert_eq!(frame.counters.len(), 1);
        assert_eq!(frame.counters[0].value, CounterValue::U64(9));
    }
}
