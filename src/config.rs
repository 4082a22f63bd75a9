//! Engine configuration (§6 "Configuration options (recognized)").
//!
//! Layered: defaults → optional config file in the application directory →
//! an options struct supplied via device creation → environment variables
//! (last wins). Grounded on `profiler_config.h`/`.cpp`'s
//! `LoadFromFile`/`LoadFromCreateInfo`/`LoadFromEnvironment`, using `serde` +
//! `ron` for the on-disk config format.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Granularity at which the profiler emits begin/end timestamp pairs (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    PerDrawcall,
    PerPipeline,
    PerRenderPass,
    PerFrame,
}

/// The event that closes one frame and opens the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameDelimiter {
    Present,
    Submit,
}

/// Which vendor performance-query extension path, if any, is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceQueryExt {
    Off,
    Intel,
    Khr,
}

/// Full, resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    pub sampling_mode: SamplingMode,
    pub frame_delimiter: FrameDelimiter,
    pub enable_performance_query_ext: PerformanceQueryExt,
    pub enable_pipeline_executable_properties_ext: bool,
    pub enable_memory_profiling: bool,
    pub enable_render_pass_begin_end_profiling: bool,
    pub set_stable_power_state: bool,
    pub enable_threading: bool,
    pub data_buffer_size: u32,
    pub min_data_buffer_size: u32,
    pub default_metrics_set: String,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sampling_mode: SamplingMode::PerDrawcall,
            frame_delimiter: FrameDelimiter::Present,
            enable_performance_query_ext: PerformanceQueryExt::Off,
            enable_pipeline_executable_properties_ext: false,
            enable_memory_profiling: true,
            enable_render_pass_begin_end_profiling: false,
            set_stable_power_state: false,
            enable_threading: true,
            data_buffer_size: 1,
            min_data_buffer_size: 1,
            default_metrics_set: String::new(),
        }
    }
}

impl ProfilerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_data_buffer_size == 0 {
            return Err(ConfigError::InvalidMinDataBufferSize);
        }
        if self.data_buffer_size < self.min_data_buffer_size {
            return Err(ConfigError::DataBufferSizeBelowMinimum {
                requested: self.data_buffer_size,
                minimum: self.min_data_buffer_size,
            });
        }
        Ok(())
    }

    /// Overlays every `Some` field of `file` onto `self`.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        macro_rules! overlay_field {
            ($field:ident) => {
                if let Some(value) = overlay.$field {
                    self.$field = value;
                }
            };
        }
        overlay_field!(sampling_mode);
        overlay_field!(frame_delimiter);
        overlay_field!(enable_performance_query_ext);
        overlay_field!(enable_pipeline_executable_properties_ext);
        overlay_field!(enable_memory_profiling);
        overlay_field!(enable_render_pass_begin_end_profiling);
        overlay_field!(set_stable_power_state);
        overlay_field!(enable_threading);
        overlay_field!(data_buffer_size);
        overlay_field!(min_data_buffer_size);
        overlay_field!(default_metrics_set);
    }

    /// Reads a RON config file from the application directory. Missing file
    /// is not an error (§6 "optional config file"); malformed file is.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Ok(()),
        };
        let overlay: ConfigOverlay =
            ron::from_str(&contents).map_err(|err| ConfigError::InvalidConfigFile {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        self.apply_overlay(overlay);
        Ok(())
    }

    /// Applies the options struct passed through the device-creation chain.
    pub fn merge_create_info(&mut self, overlay: ConfigOverlay) {
        self.apply_overlay(overlay);
    }

    /// Applies environment variable overrides; these win over every other layer.
    ///
    /// Recognized variables: `GPU_PROFILER_SAMPLING_MODE`,
    /// `GPU_PROFILER_FRAME_DELIMITER`, `GPU_PROFILER_DATA_BUFFER_SIZE`,
    /// `GPU_PROFILER_ENABLE_MEMORY_PROFILING`, `GPU_PROFILER_DEFAULT_METRICS_SET`.
    pub fn merge_env(&mut self) {
        if let Ok(value) = std::env::var("GPU_PROFILER_SAMPLING_MODE") {
            if let Some(mode) = parse_sampling_mode(&value) {
                self.sampling_mode = mode;
            }
        }
        if let Ok(value) = std::env::var("GPU_PROFILER_FRAME_DELIMITER") {
            if let Some(delimiter) = parse_frame_delimiter(&value) {
                self.frame_delimiter = delimiter;
            }
        }
        if let Ok(value) = std::env::var("GPU_PROFILER_DATA_BUFFER_SIZE") {
            if let Ok(size) = value.parse() {
                self.data_buffer_size = size;
            }
        }
        if let Ok(value) = std::env::var("GPU_PROFILER_ENABLE_MEMORY_PROFILING") {
            if let Ok(flag) = value.parse() {
                self.enable_memory_profiling = flag;
            }
        }
        if let Ok(value) = std::env::var("GPU_PROFILER_DEFAULT_METRICS_SET") {
            self.default_metrics_set = value;
        }
    }

    /// Resolves the layered configuration, in the order defined by §6.
    pub fn resolve(
        file_path: Option<&Path>,
        create_info: Option<ConfigOverlay>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file_path {
            config.merge_file(path)?;
        }
        if let Some(overlay) = create_info {
            config.merge_create_info(overlay);
        }
        config.merge_env();
        config.validate()?;
        Ok(config)
    }
}

fn parse_sampling_mode(value: &str) -> Option<SamplingMode> {
    match value {
        "per_drawcall" => Some(SamplingMode::PerDrawcall),
        "per_pipeline" => Some(SamplingMode::PerPipeline),
        "per_render_pass" => Some(SamplingMode::PerRenderPass),
        "per_frame" => Some(SamplingMode::PerFrame),
        _ => None,
    }
}

fn parse_frame_delimiter(value: &str) -> Option<FrameDelimiter> {
    match value {
        "present" => Some(FrameDelimiter::Present),
        "submit" => Some(FrameDelimiter::Submit),
        _ => None,
    }
}

/// A partially-specified configuration, as supplied via a config file or the
/// device-creation options struct: every field is optional so a layer only
/// overrides what it explicitly sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverlay {
    pub sampling_mode: Option<SamplingMode>,
    pub frame_delimiter: Option<FrameDelimiter>,
    pub enable_performance_query_ext: Option<PerformanceQueryExt>,
    pub enable_pipeline_executable_properties_ext: Option<bool>,
    pub enable_memory_profiling: Option<bool>,
    pub enable_render_pass_begin_end_profiling: Option<bool>,
    pub set_stable_power_state: Option<bool>,
    pub enable_threading: Option<bool>,
    pub data_buffer_size: Option<u32>,
    pub min_data_buffer_size: Option<u32>,
    pub default_metrics_set: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ProfilerConfig::default().validate().is_ok());
    }

    #[test]
    fn data_buffer_below_minimum_rejected() {
        let mut config = ProfilerConfig::default();
        config.min_data_buffer_size = 4;
        config.data_buffer_size = 2;
        assert_eq!(
            config.validate(),
            Err(ConfigError::DataBufferSizeBelowMinimum {
                requested: 2,
                minimum: 4
            })
        );
    }

    #[test]
    fn create_info_overlay_wins_over_default() {
        let mut config = ProfilerConfig::default();
        config.merge_create_info(ConfigOverlay {
            sampling_mode: Some(SamplingMode::PerFrame),
            ..Default::default()
        });
        assert_eq!(config.sampling_mode, SamplingMode::PerFrame);
    }

    #[test]
    fn env_wins_over_create_info() {
        std::env::set_var("GPU_PROFILER_SAMPLING_MODE", "per_pipeline");
        let mut config = ProfilerConfig::default();
        config.merge_create_info(ConfigOverlay {
            sampling_mode: Some(SamplingMode::PerFrame),
            ..Default::default()
        });
        config.merge_env();
        assert_eq!(config.sampling_mode, SamplingMode::PerPipeline);
        std::env::remove_var("GPU_PROFILER_SAMPLING_MODE");
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let mut config = ProfilerConfig::default();
        assert!(config
            .merge_file(Path::new("/nonexistent/gpu-profiler.ron"))
            .is_ok());
    }
}
