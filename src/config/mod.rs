//! Configuration loading for `modelgate`.
//!
//! Settings are read from a TOML file and then overridden by a fixed set of
//! environment variables, matching the teacher's `toml`-based config layer
//! (`RuntimeConfig` in the original `lib.rs`) but flattened into one tree
//! since this proxy has no per-component config structs to nest.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub device_id: u32,
    pub reserved_buffer_mb: u64,
    pub nvml: bool,
    /// Fraction of a backend's usable VRAM budget it's told to target,
    /// forwarded to the backend invocation as `--gpu-memory-utilization`.
    pub memory_utilization: f64,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            device_id: 0,
            reserved_buffer_mb: 2048,
            nvml: true,
            memory_utilization: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub base_port: u16,
    pub port_range_size: u16,
    pub idle_timeout_seconds: u64,
    pub readiness_interval_ms: u64,
    pub start_timeout_seconds: u64,
    pub stop_timeout_seconds: u64,
    pub bearer_token: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_port: 38000,
            port_range_size: 2000,
            idle_timeout_seconds: 900,
            readiness_interval_ms: 500,
            start_timeout_seconds: 300,
            stop_timeout_seconds: 30,
            bearer_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Precision of a declared backend's weights, used for memory estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
    Bf16,
    Int8,
    Int4,
}

impl Precision {
    pub fn bytes_per_param(self) -> f64 {
        match self {
            Precision::Fp32 => 4.0,
            Precision::Fp16 | Precision::Bf16 => 2.0,
            Precision::Int8 => 1.0,
            Precision::Int4 => 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub backend_path: String,
    pub args: Vec<String>,
    pub parameter_count_billions: f64,
    pub precision: Precision,
    pub max_sequence_length: u32,
    pub max_concurrent_sequences: u32,
    pub tensor_parallel_degree: u32,
    pub layers: u32,
    pub hidden_size: u32,
    pub heads: u32,
    pub kv_heads: u32,
    pub memory_estimate_override_mb: u64,
    pub credential: String,
    pub label: Option<String>,
    pub tags: Vec<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend_path: String::new(),
            args: Vec::new(),
            parameter_count_billions: 7.0,
            precision: Precision::Fp16,
            max_sequence_length: 4096,
            max_concurrent_sequences: 32,
            tensor_parallel_degree: 1,
            layers: 32,
            hidden_size: 4096,
            heads: 32,
            kv_heads: 32,
            memory_estimate_override_mb: 0,
            credential: String::new(),
            label: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gpu: GpuSettings,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub models: HashMap<String, ModelSettings>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Settings = toml::from_str(&text)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Build settings from defaults plus the fixed set of env-var overrides,
    /// for running without a config file on disk.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply the fixed set of env-var overrides named in the config surface.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROXY_LISTEN_PORT") {
            if let Ok(port) = v.parse() {
                self.proxy.port = port;
            }
        }
        if let Ok(v) = std::env::var("PROXY_IDLE_TIMEOUT_SECONDS") {
            if let Ok(secs) = v.parse() {
                self.proxy.idle_timeout_seconds = secs;
            }
        }
        if let Ok(v) = std::env::var("PROXY_BASE_PORT") {
            if let Ok(port) = v.parse() {
                self.proxy.base_port = port;
            }
        }
        if let Ok(v) = std::env::var("GPU_DEVICE_ID") {
            if let Ok(id) = v.parse() {
                self.gpu.device_id = id;
            }
        }
        if let Ok(v) = std::env::var("GPU_RESERVED_MB") {
            if let Ok(mb) = v.parse() {
                self.gpu.reserved_buffer_mb = mb;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.port == 0 {
            return Err(ConfigError::Invalid("proxy.port must be nonzero".into()));
        }
        if self.proxy.base_port == 0 {
            return Err(ConfigError::Invalid(
                "proxy.base_port must be nonzero".into(),
            ));
        }
        for (id, model) in &self.models {
            if model.backend_path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "model \"{id}\" is missing backend_path"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_port_is_invalid() {
        let mut settings = Settings::default();
        settings.proxy.port = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn model_without_backend_path_is_invalid() {
        let mut settings = Settings::default();
        settings
            .models
            .insert("a".to_string(), ModelSettings::default());
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn parses_declared_toml_shape() {
        let toml_text = r#"
            [gpu]
            reserved_buffer_mb = 1024

            [proxy]
            port = 9000

            [models.llama]
            backend_path = "/opt/bin/serve"
            parameter_count_billions = 8.0
            precision = "fp16"
        "#;
        let settings: Settings = toml::from_str(toml_text).unwrap();
        assert_eq!(settings.gpu.reserved_buffer_mb, 1024);
        assert_eq!(settings.proxy.port, 9000);
        assert_eq!(settings.models["llama"].parameter_count_billions, 8.0);
    }
}
