//! Memory tracker (§4.E).
//!
//! Grounded on `profiler_memory_tracker.h/.cpp`'s `DeviceProfilerMemoryTracker`:
//! a per-resource binding map (single opaque binding, or a vector of sparse
//! segments once the resource receives its first sparse bind) plus an
//! aggregated per-heap/per-type rollup kept under a separate lock so readers
//! of the rollup never contend with the hot binding path.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::handle::RawHandle;

/// A memory allocation registered via `vkAllocateMemory` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationInfo {
    pub size: u64,
    pub memory_type_index: u32,
    pub heap_index: u32,
}

/// One opaque (non-sparse) memory binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueBinding {
    pub memory: RawHandle,
    pub memory_offset: u64,
    pub resource_offset: u64,
    pub size: u64,
}

/// One sparse binding segment for a buffer or opaque image region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseSegment {
    pub memory: RawHandle,
    pub memory_offset: u64,
    pub resource_offset: u64,
    pub size: u64,
}

/// A 3-D subresource block binding for a sparse image (§4.E "sparse image bindings").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBlockBinding {
    pub memory: RawHandle,
    pub memory_offset: u64,
    pub aspect_mask: u32,
    pub array_layer: u32,
    pub mip_level: u32,
    pub offset: [i32; 3],
    pub extent: [u32; 3],
}

/// The current binding state of one resource.
#[derive(Debug, Clone, Default)]
pub enum Bindings {
    #[default]
    Unbound,
    Opaque(OpaqueBinding),
    Sparse(Vec<SparseSegment>),
    SparseImage(Vec<ImageBlockBinding>),
}

struct ResourceEntry {
    size: u64,
    bindings: Bindings,
}

/// Aggregated size/count rollup for one memory heap or memory type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRollup {
    pub allocation_count: u64,
    pub allocation_size: u64,
}

/// A consistent snapshot returned by [`MemoryTracker::memory_data`] (§4.E `memory_data()`).
#[derive(Debug, Clone, Default)]
pub struct MemoryData {
    pub total_allocation_count: u64,
    pub total_allocation_size: u64,
    pub heaps: Vec<MemoryRollup>,
    pub types: Vec<MemoryRollup>,
    pub budget: Vec<u64>,
}

/// Supplies the per-heap budget (§4.E "a budget source"): a vendor budget
/// extension if available, or total heap size as a fallback.
pub trait BudgetSource {
    fn heap_budgets(&self) -> Vec<u64>;
}

/// Falls back to the heap's total size when no vendor budget query is available.
pub struct HeapSizeBudget {
    pub heap_sizes: Vec<u64>,
}

impl BudgetSource for HeapSizeBudget {
    fn heap_budgets(&self) -> Vec<u64> {
        self.heap_sizes.clone()
    }
}

#[derive(Default)]
struct Aggregated {
    total_allocation_count: u64,
    total_allocation_size: u64,
    heaps: Vec<MemoryRollup>,
    types: Vec<MemoryRollup>,
}

/// Tracks device memory allocations and resource bindings (§4.E).
///
/// Every register/unregister/bind operation is gated by
/// `enable_memory_profiling`; when disabled they return immediately.
pub struct MemoryTracker {
    enabled: bool,
    allocations: RwLock<HashMap<RawHandle, AllocationInfo>>,
    buffers: RwLock<HashMap<RawHandle, ResourceEntry>>,
    images: RwLock<HashMap<RawHandle, ResourceEntry>>,
    aggregated: RwLock<Aggregated>,
    heap_count: usize,
    type_count: usize,
}

impl MemoryTracker {
    pub fn new(enabled: bool, heap_count: usize, type_count: usize) -> Self {
        Self {
            enabled,
            allocations: RwLock::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
            images: RwLock::new(HashMap::new()),
            aggregated: RwLock::new(Aggregated {
                heaps: vec![MemoryRollup::default(); heap_count],
                types: vec![MemoryRollup::default(); type_count],
                ..Default::default()
            }),
            heap_count,
            type_count,
        }
    }

    pub fn register_allocation(&self, memory: RawHandle, info: AllocationInfo) {
        if !self.enabled {
            return;
        }
        self.allocations.write().insert(memory, info);

        let mut aggregated = self.aggregated.write();
        aggregated.total_allocation_count += 1;
        aggregated.total_allocation_size += info.size;
        if let Some(heap) = aggregated.heaps.get_mut(info.heap_index as usize) {
            heap.allocation_count += 1;
            heap.allocation_size += info.size;
        }
        if let Some(ty) = aggregated.types.get_mut(info.memory_type_index as usize) {
            ty.allocation_count += 1;
            ty.allocation_size += info.size;
        }
    }

    pub fn unregister_allocation(&self, memory: RawHandle) {
        if !self.enabled {
            return;
        }
        let Some(info) = self.allocations.write().remove(&memory) else {
            return;
        };

        let mut aggregated = self.aggregated.write();
        aggregated.total_allocation_count = aggregated.total_allocation_count.saturating_sub(1);
        aggregated.total_allocation_size = aggregated.total_allocation_size.saturating_sub(info.size);
        if let Some(heap) = aggregated.heaps.get_mut(info.heap_index as usize) {
            heap.allocation_count = heap.allocation_count.saturating_sub(1);
            heap.allocation_size = heap.allocation_size.saturating_sub(info.size);
        }
        if let Some(ty) = aggregated.types.get_mut(info.memory_type_index as usize) {
            ty.allocation_count = ty.allocation_count.saturating_sub(1);
            ty.allocation_size = ty.allocation_size.saturating_sub(info.size);
        }
    }

    pub fn register_buffer(&self, buffer: RawHandle, size: u64) {
        if !self.enabled {
            return;
        }
        self.buffers.write().insert(
            buffer,
            ResourceEntry {
                size,
                bindings: Bindings::Unbound,
            },
        );
    }

    pub fn unregister_buffer(&self, buffer: RawHandle) {
        if !self.enabled {
            return;
        }
        self.buffers.write().remove(&buffer);
    }

    /// Non-sparse rebind: replaces the opaque binding outright (§4.E "Non-sparse rebind").
    pub fn bind_buffer_memory(&self, buffer: RawHandle, memory: RawHandle, offset: u64) {
        if !self.enabled {
            return;
        }
        let mut buffers = self.buffers.write();
        if let Some(entry) = buffers.get_mut(&buffer) {
            entry.bindings = Bindings::Opaque(OpaqueBinding {
                memory,
                memory_offset: offset,
                resource_offset: 0,
                size: entry.size,
            });
        }
    }

    /// Applies one sparse bind (§4.E "Sparse binding rules").
    pub fn bind_sparse_buffer_memory(
        &self,
        buffer: RawHandle,
        resource_offset: u64,
        size: u64,
        memory: Option<(RawHandle, u64)>,
    ) {
        if !self.enabled {
            return;
        }
        let mut buffers = self.buffers.write();
        let Some(entry) = buffers.get_mut(&buffer) else {
            return;
        };

        let segments = match &mut entry.bindings {
            Bindings::Sparse(segments) => segments,
            other => {
                *other = Bindings::Sparse(Vec::new());
                let Bindings::Sparse(segments) = other else {
                    unreachable!()
                };
                segments
            }
        };

        apply_sparse_bind(segments, resource_offset, size, memory);
    }

    pub fn register_image(&self, image: RawHandle, size: u64) {
        if !self.enabled {
            return;
        }
        self.images.write().insert(
            image,
            ResourceEntry {
                size,
                bindings: Bindings::Unbound,
            },
        );
    }

    pub fn unregister_image(&self, image: RawHandle) {
        if !self.enabled {
            return;
        }
        self.images.write().remove(&image);
    }

    pub fn bind_image_memory(&self, image: RawHandle, memory: RawHandle, offset: u64) {
        if !self.enabled {
            return;
        }
        let mut images = self.images.write();
        if let Some(entry) = images.get_mut(&image) {
            entry.bindings = Bindings::Opaque(OpaqueBinding {
                memory,
                memory_offset: offset,
                resource_offset: 0,
                size: entry.size,
            });
        }
    }

    /// Opaque sparse bind for an image region (shares the buffer segment
    /// model for the bind-new-memory case). Unlike buffers, a `None` memory
    /// (unbind) is a no-op here: the source leaves partial sparse image
    /// unbinds unimplemented, and that limitation is kept on the image path
    /// deliberately rather than generalized to match the buffer path.
    pub fn bind_sparse_image_opaque_memory(
        &self,
        image: RawHandle,
        resource_offset: u64,
        size: u64,
        memory: Option<(RawHandle, u64)>,
    ) {
        if !self.enabled {
            return;
        }
        let Some((memory, memory_offset)) = memory else {
            return;
        };
        let mut images = self.images.write();
        let Some(entry) = images.get_mut(&image) else {
            return;
        };

        let segments = match &mut entry.bindings {
            Bindings::Sparse(segments) => segments,
            other => {
                *other = Bindings::Sparse(Vec::new());
                let Bindings::Sparse(segments) = other else {
                    unreachable!()
                };
                segments
            }
        };

        apply_sparse_bind(segments, resource_offset, size, Some((memory, memory_offset)));
    }

    /// Subresource block sparse bind for an image (§4.E "For sparse image
    /// bindings"): an existing block wholly contained in the new block is
    /// replaced; unbind (null memory) is not representable for block bindings
    /// and is a no-op.
    pub fn bind_sparse_image_block_memory(&self, image: RawHandle, binding: ImageBlockBinding) {
        if !self.enabled {
            return;
        }
        let mut images = self.images.write();
        let Some(entry) = images.get_mut(&image) else {
            return;
        };

        let blocks = match &mut entry.bindings {
            Bindings::SparseImage(blocks) => blocks,
            other => {
                *other = Bindings::SparseImage(Vec::new());
                let Bindings::SparseImage(blocks) = other else {
                    unreachable!()
                };
                blocks
            }
        };

        blocks.retain(|existing| !block_contained(existing, &binding));
        blocks.push(binding);
    }

    /// Takes a consistent snapshot: resources under the binding lock, rollups
    /// under the aggregated lock, and the heap budget from `budget_source`
    /// (§4.E `memory_data()`).
    pub fn memory_data(&self, budget_source: &impl BudgetSource) -> MemoryData {
        let aggregated = self.aggregated.read();
        MemoryData {
            total_allocation_count: aggregated.total_allocation_count,
            total_allocation_size: aggregated.total_allocation_size,
            heaps: aggregated.heaps.clone(),
            types: aggregated.types.clone(),
            budget: budget_source.heap_budgets(),
        }
    }

    pub fn heap_count(&self) -> usize {
        self.heap_count
    }

    pub fn type_count(&self) -> usize {
        self.type_count
    }
}

fn block_contained(existing: &ImageBlockBinding, new: &ImageBlockBinding) -> bool {
    existing.aspect_mask == new.aspect_mask
        && existing.array_layer == new.array_layer
        && existing.mip_level == new.mip_level
        && existing.offset[0] >= new.offset[0]
        && existing.offset[1] >= new.offset[1]
        && existing.offset[2] >= new.offset[2]
        && existing.offset[0] + existing.extent[0] as i32 <= new.offset[0] + new.extent[0] as i32
        && existing.offset[1] + existing.extent[1] as i32 <= new.offset[1] + new.extent[1] as i32
        && existing.offset[2] + existing.extent[2] as i32 <= new.offset[2] + new.extent[2] as i32
}

/// Inserts, removes, splits or trims sparse segments for one bind call
/// (§4.E "Sparse binding rules"). `memory = None` unbinds `[resource_offset,
/// resource_offset + size)`.
fn apply_sparse_bind(
    segments: &mut Vec<SparseSegment>,
    resource_offset: u64,
    size: u64,
    memory: Option<(RawHandle, u64)>,
) {
    match memory {
        Some((memory, memory_offset)) => {
            segments.push(SparseSegment {
                memory,
                memory_offset,
                resource_offset,
                size,
            });
        }
        None => {
            let unbind_start = resource_offset;
            let unbind_end = resource_offset + size;
            let mut result = Vec::with_capacity(segments.len());

            for segment in segments.drain(..) {
                let seg_start = segment.resource_offset;
                let seg_end = segment.resource_offset + segment.size;

                if unbind_start <= seg_start && unbind_end >= seg_end {
                    // Fully contained: drop it.
                    continue;
                }
                if unbind_start > seg_start && unbind_end < seg_end {
                    // Split in two around the unbound middle.
                    let left_size = unbind_start - seg_start;
                    result.push(SparseSegment {
                        memory: segment.memory,
                        memory_offset: segment.memory_offset,
                        resource_offset: seg_start,
                        size: left_size,
                    });
                    result.push(SparseSegment {
                        memory: segment.memory,
                        memory_offset: segment.memory_offset + left_size + size,
                        resource_offset: unbind_end,
                        size: seg_end - unbind_end,
                    });
                } else if unbind_start <= seg_start && unbind_end > seg_start {
                    // Trimmed at the start.
                    let trimmed = unbind_end - seg_start;
                    result.push(SparseSegment {
                        memory: segment.memory,
                        memory_offset: segment.memory_offset + trimmed,
                        resource_offset: unbind_end,
                        size: segment.size - trimmed,
                    });
                } else if unbind_start < seg_end && unbind_end >= seg_end {
                    // Trimmed at the end.
                    result.push(SparseSegment {
                        memory: segment.memory,
                        memory_offset: segment.memory_offset,
                        resource_offset: seg_start,
                        size: unbind_start - seg_start,
                    });
                } else {
                    // Not affected.
                    result.push(segment);
                }
            }
            *segments = result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBudget(Vec<u64>);
    impl BudgetSource for FixedBudget {
        fn heap_budgets(&self) -> Vec<u64> {
            self.0.clone()
        }
    }

    #[test]
    fn disabled_tracker_ignores_all_operations() {
        let tracker = MemoryTracker::new(false, 1, 1);
        tracker.register_allocation(
            RawHandle(1),
            AllocationInfo {
                size: 100,
                memory_type_index: 0,
                heap_index: 0,
            },
        );
        let data = tracker.memory_data(&FixedBudget(vec![1024]));
        assert_eq!(data.total_allocation_count, 0);
    }

    #[test]
    fn allocation_rollups_update_heap_and_type() {
        let tracker = MemoryTracker::new(true, 2, 2);
        tracker.register_allocation(
            RawHandle(1),
            AllocationInfo {
                size: 4096,
                memory_type_index: 1,
                heap_index: 0,
            },
        );
        let data = tracker.memory_data(&FixedBudget(vec![1 << 20, 1 << 20]));
        assert_eq!(data.total_allocation_count, 1);
        assert_eq!(data.heaps[0].allocation_size, 4096);
        assert_eq!(data.types[1].allocation_size, 4096);

        tracker.unregister_allocation(RawHandle(1));
        let data = tracker.memory_data(&FixedBudget(vec![1 << 20, 1 << 20]));
        assert_eq!(data.total_allocation_count, 0);
        assert_eq!(data.heaps[0].allocation_size, 0);
    }

    #[test]
    fn first_sparse_bind_converts_opaque_slot_to_vector() {
        let tracker = MemoryTracker::new(true, 1, 1);
        tracker.register_buffer(RawHandle(10), 1000);
        tracker.bind_sparse_buffer_memory(RawHandle(10), 0, 100, Some((RawHandle(20), 0)));

        let buffers = tracker.buffers.read();
        let entry = buffers.get(&RawHandle(10)).unwrap();
        assert!(matches!(entry.bindings, Bindings::Sparse(ref segments) if segments.len() == 1));
    }

    #[test]
    fn unbind_fully_contained_segment_is_removed() {
        let mut segments = vec![SparseSegment {
            memory: RawHandle(1),
            memory_offset: 0,
            resource_offset: 100,
            size: 50,
        }];
        apply_sparse_bind(&mut segments, 100, 50, None);
        assert!(segments.is_empty());
    }

    #[test]
    fn unbind_splits_segment_overlapping_both_ends() {
        let mut segments = vec![SparseSegment {
            memory: RawHandle(1),
            memory_offset: 0,
            resource_offset: 0,
            size: 100,
        }];
        apply_sparse_bind(&mut segments, 30, 20, None);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].resource_offset, 0);
        assert_eq!(segments[0].size, 30);
        assert_eq!(segments[1].resource_offset, 50);
        assert_eq!(segments[1].size, 50);
    }

    #[test]
    fn unbind_trims_segment_overlapping_single_end() {
        let mut segments = vec![SparseSegment {
            memory: RawHandle(1),
            memory_offset: 0,
            resource_offset: 0,
            size: 100,
        }];
        apply_sparse_bind(&mut segments, 80, 40, None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].resource_offset, 0);
        assert_eq!(segments[0].size, 80);
    }

    #[test]
    fn sparse_buffer_unbind_middle_leaves_two_segments_with_correct_offsets() {
        let tracker = MemoryTracker::new(true, 1, 1);
        tracker.register_buffer(RawHandle(10), 100);
        tracker.bind_sparse_buffer_memory(RawHandle(10), 0, 100, Some((RawHandle(1), 0)));
        tracker.bind_sparse_buffer_memory(RawHandle(10), 20, 40, None);

        let buffers = tracker.buffers.read();
        let entry = buffers.get(&RawHandle(10)).unwrap();
        let Bindings::Sparse(segments) = &entry.bindings else {
            panic!("expected sparse bindings");
        };
        assert_eq!(segments.len(), 2);

        assert_eq!(segments[0].resource_offset, 0);
        assert_eq!(segments[0].size, 20);
        assert_eq!(segments[0].memory, RawHandle(1));
        assert_eq!(segments[0].memory_offset, 0);

        assert_eq!(segments[1].resource_offset, 60);
        assert_eq!(segments[1].size, 40);
        assert_eq!(segments[1].memory, RawHandle(1));
        assert_eq!(segments[1].memory_offset, 60);
    }

    #[test]
    fn sparse_image_opaque_unbind_is_a_no_op() {
        let tracker = MemoryTracker::new(true, 1, 1);
        tracker.register_image(RawHandle(10), 1000);
        tracker.bind_sparse_image_opaque_memory(RawHandle(10), 0, 100, Some((RawHandle(20), 0)));
        tracker.bind_sparse_image_opaque_memory(RawHandle(10), 0, 100, None);

        let images = tracker.images.read();
        let entry = images.get(&RawHandle(10)).unwrap();
        assert!(matches!(entry.bindings, Bindings::Sparse(ref segments) if segments.len() == 1));
    }

    #[test]
    fn sparse_image_block_wholly_contained_is_replaced() {
        let tracker = MemoryTracker::new(true, 1, 1);
        tracker.register_image(RawHandle(5), 2048);
        let first = ImageBlockBinding {
            memory: RawHandle(7),
            memory_offset: 0,
            aspect_mask: 1,
            array_layer: 0,
            mip_level: 0,
            offset: [0, 0, 0],
            extent: [64, 64, 1],
        };
        tracker.bind_sparse_image_block_memory(RawHandle(5), first);

        let second = ImageBlockBinding {
            memory: RawHandle(8),
            memory_offset: 0,
            aspect_mask: 1,
            array_layer: 0,
            mip_level: 0,
            offset: [0, 0, 0],
            extent: [128, 128, 1],
        };
        tracker.bind_sparse_image_block_memory(RawHandle(5), second);

        let images = tracker.images.read();
        let entry = images.get(&RawHandle(5)).unwrap();
        match &entry.bindings {
            Bindings::SparseImage(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert_eq!(blocks[0].memory, RawHandle(8));
            }
            _ => panic!("expected sparse image bindings"),
        }
    }
}
