//! The recorded-command data model (§3 "Command-buffer record").
//!
//! A tagged variant covering every command the shadow command buffer can see
//! during recording. Grounded on the command catalog implied by
//! `profiler_command_buffer.h`'s `PreCommand`/`PostCommand` hooks and the
//! original's `profiler_data.h` command structures, condensed to the fields
//! the engine itself consults (attribution, implicit-pipeline classification)
//! rather than the full argument list Vulkan passes.

use crate::handle::RawHandle;

/// The pipeline bind point a drawcall executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
    RayTracing,
}

/// A stable synthetic pipeline kind used to attribute GPU work that has no
/// application-bound pipeline (§4.F "Implicit pipeline attribution").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImplicitPipelineKind {
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
}

/// One recorded command, as observed by the interception layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Draw,
    DrawIndexed,
    DrawIndirect { draw_count: u32 },
    DrawIndexedIndirect { draw_count: u32 },
    DrawIndirectCount,
    DrawIndexedIndirectCount,
    DrawMeshTasks,
    DrawMeshTasksIndirect { draw_count: u32 },
    Dispatch,
    DispatchIndirect,
    TraceRays,
    TraceRaysIndirect,
    CopyBuffer,
    CopyImage,
    CopyBufferToImage,
    CopyImageToBuffer,
    Blit,
    ResolveImage,
    FillBuffer,
    UpdateBuffer,
    ClearColorImage,
    ClearDepthStencilImage,
    ClearAttachments { attachment_count: u32 },
    BuildAccelerationStructures { count: u32 },
    CopyAccelerationStructure,
    BuildMicromaps { count: u32 },
    CopyMicromap,
    BindPipeline { bind_point: BindPoint, pipeline: RawHandle },
    BeginRenderPass { render_pass: RawHandle },
    EndRenderPass,
    BeginSubpass { index: u32 },
    EndSubpass,
    ExecuteCommands { count: u32 },
    PushDebugLabel { name: String },
    PopDebugLabel,
    InsertDebugLabel { name: String },
}

impl Command {
    /// Commands that emit GPU work and so get their own begin/end interval
    /// under `per_drawcall` sampling (§4.F "Sampling modes").
    pub fn is_drawcall(&self) -> bool {
        matches!(
            self,
            Command::Draw
                | Command::DrawIndexed
                | Command::DrawIndirect { .. }
                | Command::DrawIndexedIndirect { .. }
                | Command::DrawIndirectCount
                | Command::DrawIndexedIndirectCount
                | Command::DrawMeshTasks
                | Command::DrawMeshTasksIndirect { .. }
                | Command::Dispatch
                | Command::DispatchIndirect
                | Command::TraceRays
                | Command::TraceRaysIndirect
                | Command::CopyBuffer
                | Command::CopyImage
                | Command::CopyBufferToImage
                | Command::CopyImageToBuffer
                | Command::Blit
                | Command::ResolveImage
                | Command::FillBuffer
                | Command::UpdateBuffer
                | Command::ClearColorImage
                | Command::ClearDepthStencilImage
                | Command::ClearAttachments { .. }
                | Command::BuildAccelerationStructures { .. }
                | Command::CopyAccelerationStructure
                | Command::BuildMicromaps { .. }
                | Command::CopyMicromap
        )
    }

    /// The synthetic pipeline kind this command attributes to when no
    /// application pipeline is bound (§4.F "Implicit pipeline attribution").
    /// `None` for commands that always run under an application-bound pipeline.
    pub fn implicit_pipeline_kind(&self) -> Option<ImplicitPipelineKind> {
        match self {
            Command::CopyBuffer | Command::CopyImage | Command::CopyBufferToImage | Command::CopyImageToBuffer => {
                Some(ImplicitPipelineKind::Copy)
            }
            Command::Blit => Some(ImplicitPipelineKind::Blit),
            Command::ResolveImage => Some(ImplicitPipelineKind::Resolve),
            Command::FillBuffer => Some(ImplicitPipelineKind::Fill),
            Command::UpdateBuffer => Some(ImplicitPipelineKind::Update),
            Command::ClearColorImage | Command::ClearDepthStencilImage | Command::ClearAttachments { .. } => {
                Some(ImplicitPipelineKind::Clear)
            }
            Command::BuildAccelerationStructures { .. } => Some(ImplicitPipelineKind::AccelerationStructureBuild),
            Command::CopyAccelerationStructure => Some(ImplicitPipelineKind::AccelerationStructureCopy),
            Command::BuildMicromaps { .. } => Some(ImplicitPipelineKind::MicromapBuild),
            Command::CopyMicromap => Some(ImplicitPipelineKind::MicromapCopy),
            Command::BeginRenderPass { .. } | Command::EndRenderPass => {
                Some(ImplicitPipelineKind::RenderPassBoundary)
            }
            _ => None,
        }
    }

    pub fn bind_point(&self) -> Option<BindPoint> {
        match self {
            Command::Draw
            | Command::DrawIndexed
            | Command::DrawIndirect { .. }
            | Command::DrawIndexedIndirect { .. }
            | Command::DrawIndirectCount
            | Command::DrawIndexedIndirectCount
            | Command::DrawMeshTasks
            | Command::DrawMeshTasksIndirect { .. } => Some(BindPoint::Graphics),
            Command::Dispatch | Command::DispatchIndirect => Some(BindPoint::Compute),
            Command::TraceRays | Command::TraceRaysIndirect => Some(BindPoint::RayTracing),
            _ => None,
        }
    }
}
