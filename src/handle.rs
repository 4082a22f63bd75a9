//! Object identity model (§3 "Object identity", §4.A Object Registry).
//!
//! Every tracked resource is referenced by a pair `(raw_handle, creation_time)`.
//! Raw handles may be reused by the driver; the monotonic creation counter
//! disambiguates reuse across a frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// An opaque, driver-owned non-dispatchable handle value.
///
/// Vulkan-class APIs represent every object (buffer, image, pipeline, ...)
/// as a `u64`-sized opaque value; the engine never interprets the bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub u64);

impl From<u64> for RawHandle {
    fn from(value: u64) -> Self {
        RawHandle(value)
    }
}

/// The kind of object a [`RawHandle`] refers to.
///
/// Handle values are only unique within a kind: a buffer and an image may
/// share the same raw bit pattern on some drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    CommandBuffer,
    CommandPool,
    Pipeline,
    ShaderModule,
    RenderPass,
    DeviceMemory,
    Buffer,
    Image,
    AccelerationStructure,
    Micromap,
    Queue,
    Queryable,
}

/// A monotonic creation timestamp, assigned by [`ObjectRegistry::register`].
pub type CreationTime = u64;

/// A handle disambiguated by the creation time of the object it currently refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub raw_handle: RawHandle,
    pub creation_time: CreationTime,
}

impl Identity {
    pub fn new(raw_handle: RawHandle, creation_time: CreationTime) -> Self {
        Self {
            raw_handle,
            creation_time,
        }
    }
}

#[derive(Default)]
struct RegistryEntry {
    creation_time: CreationTime,
    name: Option<String>,
}

/// Maps raw handles to their current creation time and debug name.
///
/// Backed by a reader/writer lock: registration/unregistration are writer
/// operations, lookups are reader operations (§4.A, §5 "Shared resources").
pub struct ObjectRegistry {
    next_creation_time: AtomicU64,
    entries: RwLock<HashMap<(HandleKind, RawHandle), RegistryEntry>>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            // 0 is reserved for "unknown creation time" (see `resolve`).
            next_creation_time: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Assigns the current monotonic counter as `creation_time` and stores the mapping.
    pub fn register(&self, kind: HandleKind, raw_handle: RawHandle) -> Identity {
        let creation_time = self.next_creation_time.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(
            (kind, raw_handle),
            RegistryEntry {
                creation_time,
                name: None,
            },
        );
        Identity::new(raw_handle, creation_time)
    }

    pub fn unregister(&self, kind: HandleKind, raw_handle: RawHandle) {
        self.entries.write().remove(&(kind, raw_handle));
    }

    /// Augments `raw_handle` with its stored creation time; `0` if unknown.
    pub fn resolve(&self, kind: HandleKind, raw_handle: RawHandle) -> Identity {
        let creation_time = self
            .entries
            .read()
            .get(&(kind, raw_handle))
            .map(|entry| entry.creation_time)
            .unwrap_or(0);
        Identity::new(raw_handle, creation_time)
    }

    /// Stores (or clears, if `name` is empty) the debug name for the raw handle's
    /// *current* identity, regardless of which identity was passed in.
    pub fn set_name(&self, kind: HandleKind, raw_handle: RawHandle, name: &str) {
        if let Some(entry) = self.entries.write().get_mut(&(kind, raw_handle)) {
            entry.name = if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
        }
    }

    /// Looks up the debug name, always using the latest creation time for the raw handle.
    pub fn name(&self, kind: HandleKind, raw_handle: RawHandle) -> Option<String> {
        self.entries
            .read()
            .get(&(kind, raw_handle))
            .and_then(|entry| entry.name.clone())
    }
}
