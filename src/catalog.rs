//! Pipeline / render-pass / shader catalogs (§4.G).
//!
//! Grounded on `profiler.cpp`'s shader-hash combination (`shader.m_Hash ^=
//! Fingerprint32(entrypoint)`) and on `profiler_memory_tracker.h`'s
//! registry-over-`ConcurrentMap` pattern, reused here as a plain
//! reader/writer-locked map matching [`crate::handle::ObjectRegistry`].

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::handle::{Identity, RawHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Graphics,
    Compute,
    RayTracing,
    /// A synthetic pipeline standing in for GPU work with no application
    /// pipeline bound (§4.F "Implicit pipeline attribution").
    InternalEmulated,
}

/// One `(stage, entrypoint, module)` shader reference within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    pub stage: u32,
    pub entry_point: String,
    pub module_hash: u32,
}

/// Ray-tracing shader-group maximum stack sizes feeding the default stack
/// size formula (§4.G).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayTracingStackSizes {
    pub raygen_max: u32,
    pub closest_hit_max: u32,
    pub miss_max: u32,
    pub intersection_max: u32,
    pub any_hit_max: u32,
    pub callable_max: u32,
    pub max_ray_recursion_depth: u32,
}

/// Computes the conservative default stack size for a ray-tracing pipeline
/// (§4.G "Ray-tracing pipelines additionally compute a default stack size").
pub fn ray_tracing_default_stack_size(sizes: RayTracingStackSizes) -> u64 {
    let depth = sizes.max_ray_recursion_depth.max(1) as u64;
    let chit_or_miss = sizes.closest_hit_max.max(sizes.miss_max) as u64;
    let intersection_branch = sizes.intersection_max as u64 + sizes.any_hit_max as u64;

    sizes.raygen_max as u64
        + depth * chit_or_miss.max(intersection_branch)
        + (depth - 1) * chit_or_miss
        + 2 * sizes.callable_max as u64
}

/// Captured pipeline-executable statistics for one executable index,
/// recorded only when `enable_pipeline_executable_properties_ext` is set
/// (§4.G "Optional capture").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineExecutable {
    pub name: String,
    pub description: String,
    pub subgroup_size: u32,
    pub statistics: Vec<(String, f64)>,
    pub internal_representations: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub identity: Identity,
    pub bind_point: PipelineBindPoint,
    pub kind: PipelineKind,
    pub stages: Vec<ShaderStage>,
    pub combined_hash: u32,
    pub ray_tracing_default_stack_size: Option<u64>,
    pub executables: Vec<PipelineExecutable>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubpassRecord {
    pub resolve_attachment_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPassKind {
    Graphics,
    Dynamic,
    Secondary,
}

#[derive(Debug, Clone)]
pub struct RenderPassRecord {
    pub identity: Identity,
    pub kind: RenderPassKind,
    pub subpasses: Vec<SubpassRecord>,
    pub color_clear_count: u32,
    pub depth_stencil_clear_count: u32,
}

/// A 32-bit fingerprint over arbitrary bytes (shader bytecode, entry point
/// names). FNV-1a; small and dependency-free, matching what the original
/// combines with `^=` across stages (§4.G).
pub fn fingerprint32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// One shader module's bytecode fingerprint, merged with a driver-exposed
/// identifier if present (§4.G "Shader modules").
pub fn shader_module_hash(bytecode: &[u8], driver_identifier: Option<&[u8]>) -> u32 {
    let mut hash = fingerprint32(bytecode);
    if let Some(identifier) = driver_identifier {
        hash ^= fingerprint32(identifier);
    }
    hash
}

/// Combined hash for one `(stage, entrypoint, module)` triple
/// (§4.G "compute the combined hash as `fingerprint32(entrypoint) XOR module_hash`").
pub fn stage_hash(entry_point: &str, module_hash: u32) -> u32 {
    fingerprint32(entry_point.as_bytes()) ^ module_hash
}

/// Combines per-stage hashes into one pipeline hash.
pub fn combine_stage_hashes(stage_hashes: &[u32]) -> u32 {
    stage_hashes.iter().fold(0u32, |acc, &hash| acc ^ hash)
}

/// Registries for pipelines, render passes, and shader modules, each backed
/// by a reader/writer lock over a hash map (§4.A, §5 "Shared resources").
pub struct Catalog {
    pipelines: RwLock<HashMap<RawHandle, PipelineRecord>>,
    render_passes: RwLock<HashMap<RawHandle, RenderPassRecord>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            render_passes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a pipeline, classifying it and computing its combined hash
    /// (§4.G `create_pipeline`).
    pub fn create_pipeline(
        &self,
        identity: Identity,
        bind_point: PipelineBindPoint,
        stages: Vec<ShaderStage>,
        ray_tracing: Option<RayTracingStackSizes>,
    ) -> u32 {
        let kind = match bind_point {
            PipelineBindPoint::Graphics => PipelineKind::Graphics,
            PipelineBindPoint::Compute => PipelineKind::Compute,
            PipelineBindPoint::RayTracing => PipelineKind::RayTracing,
        };
        let stage_hashes: Vec<u32> = stages
            .iter()
            .map(|stage| stage_hash(&stage.entry_point, stage.module_hash))
            .collect();
        let combined_hash = combine_stage_hashes(&stage_hashes);
        let ray_tracing_default_stack_size = ray_tracing.map(ray_tracing_default_stack_size);

        self.pipelines.write().insert(
            identity.raw_handle,
            PipelineRecord {
                identity,
                bind_point,
                kind,
                stages,
                combined_hash,
                ray_tracing_default_stack_size,
                executables: Vec::new(),
            },
        );
        combined_hash
    }

    pub fn destroy_pipeline(&self, handle: RawHandle) {
        self.pipelines.write().remove(&handle);
    }

    /// Registers a synthetic pipeline for implicit attribution, with no shader stages.
    pub fn create_internal_pipeline(&self, identity: Identity, bind_point: PipelineBindPoint) {
        self.pipelines.write().insert(
            identity.raw_handle,
            PipelineRecord {
                identity,
                bind_point,
                kind: PipelineKind::InternalEmulated,
                stages: Vec::new(),
                combined_hash: 0,
                ray_tracing_default_stack_size: None,
                executables: Vec::new(),
            },
        );
    }

    pub fn set_pipeline_executables(&self, handle: RawHandle, executables: Vec<PipelineExecutable>) {
        if let Some(record) = self.pipelines.write().get_mut(&handle) {
            record.executables = executables;
        }
    }

    pub fn pipeline(&self, handle: RawHandle) -> Option<PipelineRecord> {
        self.pipelines.read().get(&handle).cloned()
    }

    /// Registers a render pass, aggregating resolve-attachment and clear
    /// counts per §4.G "Render passes" (counting each independent
    /// depth/stencil resolve as two, and sharing one clear count per
    /// attachment even when both aspects clear).
    pub fn create_render_pass(
        &self,
        identity: Identity,
        kind: RenderPassKind,
        subpasses: Vec<SubpassRecord>,
        color_clear_count: u32,
        depth_stencil_clear_count: u32,
    ) {
        self.render_passes.write().insert(
            identity.raw_handle,
            RenderPassRecord {
                identity,
                kind,
                subpasses,
                color_clear_count,
                depth_stencil_clear_count,
            },
        );
    }

    pub fn destroy_render_pass(&self, handle: RawHandle) {
        self.render_passes.write().remove(&handle);
    }

    pub fn render_pass(&self, handle: RawHandle) -> Option<RenderPassRecord> {
        self.render_passes.read().get(&handle).cloned()
    }
}
