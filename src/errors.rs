//! Error types for every fallible surface of the engine.
//!
//! Split by call site rather than one flat enum: construction, configuration,
//! frame-end, counters, and timeline synchronization each fail in distinct,
//! non-overlapping ways.

/// Errors that can occur while constructing a [`crate::facade::Profiler`] or a backend.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CreationError {
    #[error("ProfilerConfig::data_buffer_size must be >= min_data_buffer_size")]
    DataBufferSizeBelowMinimum,

    #[error("ProfilerConfig::min_data_buffer_size must be at least 1")]
    InvalidMinDataBufferSize,

    #[error("requested counter backend is not available on this device")]
    CounterBackendUnavailable,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

/// Errors surfaced synchronously by configuration setters (§7 "Configuration error").
///
/// A `ConfigError` never mutates engine state: the setter either fully
/// applies or fully rejects the new value.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("data_buffer_size ({requested}) must be >= min_data_buffer_size ({minimum})")]
    DataBufferSizeBelowMinimum { requested: u32, minimum: u32 },

    #[error("min_data_buffer_size must be at least 1")]
    InvalidMinDataBufferSize,

    #[error("unknown metrics set name {0:?}")]
    UnknownMetricsSet(String),

    #[error("invalid config file at {path}: {reason}")]
    InvalidConfigFile { path: String, reason: String },
}

/// Errors that can occur while ending a frame delimiter event.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EndFrameError {
    #[error("a command buffer was begun but never ended before the frame delimiter")]
    UnclosedCommandBuffer,
}

/// Errors from the vendor performance-counter backend (§4.C, §7 "Extension unavailable").
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CounterError {
    #[error("no metric sets were discovered on this device")]
    NoMetricSetsDiscovered,

    #[error("metrics set index {0} is out of range")]
    InvalidSetIndex(u32),

    #[error("metric {0:?} reports a string result, which is not representable")]
    UnsupportedStringMetric(String),

    #[error("counter backend does not support streaming capture")]
    StreamingUnsupported,
}

/// Errors from the timeline synchronizer (§4.D, §7 "Extension unavailable").
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("host/device timestamp calibration is not available")]
    CalibrationUnavailable,

    #[error("fence wait timed out after {0} ns")]
    FenceTimeout(u64),
}
