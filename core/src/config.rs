//! Configuration types

use crate::error::{ConfigError, RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};

/// Embedding/similarity service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimension. Changing this invalidates the index.
    pub dim: usize,
    pub cache_ttl_seconds: u64,
    pub cache_capacity: usize,
    /// Base URL of the external embedding backend; `None` runs
    /// degraded-only (every embedding is the hash-based fallback).
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            cache_ttl_seconds: 3600,
            cache_capacity: 10_000,
            endpoint: None,
        }
    }
}

/// Memory admission and consolidation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub admission_novelty_min: f32,
    pub admission_domain_saturation: f32,
    pub admission_score_floor: f32,
    pub consolidate_interval_hours: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            admission_novelty_min: 0.15,
            admission_domain_saturation: 0.80,
            admission_score_floor: 0.05,
            consolidate_interval_hours: 24,
        }
    }
}

/// Kernel/evaluator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    pub cognition_timeout_ms: u64,
    pub cognition_timeout_max_ms: u64,
    pub max_concurrent_per_agent: usize,
    pub max_concurrent_total: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            cognition_timeout_ms: 60_000,
            cognition_timeout_max_ms: 600_000,
            max_concurrent_per_agent: 10,
            max_concurrent_total: 500,
        }
    }
}

/// Sandbox resource defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub default_cpu_seconds: u64,
    pub default_memory_mb: u64,
    pub default_wall_clock_seconds: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_cpu_seconds: 5,
            default_memory_mb: 256,
            default_wall_clock_seconds: 10,
        }
    }
}

/// Persistence adapter pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub pool_min: u32,
    pub pool_max: u32,
    pub idle_timeout_seconds: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            pool_min: 5,
            pool_max: 25,
            idle_timeout_seconds: 1800,
        }
    }
}

/// Agent/message bus configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    pub inbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1000,
        }
    }
}

/// Master configuration for the mnemo runtime. Loaded from TOML
/// and/or environment variables at startup; `validate()` runs before the
/// server begins accepting requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub embedding: EmbeddingConfig,
    pub memory: MemoryConfig,
    pub kernel: KernelConfig,
    pub sandbox: SandboxConfig,
    pub persistence: PersistenceConfig,
    pub bus: BusConfig,
}

impl RuntimeConfig {
    /// Validate the configuration. Exit code 2 is produced by the
    /// binary when this returns an error.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.embedding.dim == 0 {
            return Err(config_err("embedding.dim", self.embedding.dim, "must be greater than 0"));
        }
        if self.embedding.cache_ttl_seconds == 0 {
            return Err(config_err(
                "embedding.cache_ttl_seconds",
                self.embedding.cache_ttl_seconds,
                "must be positive",
            ));
        }
        for (field, value) in [
            ("memory.admission.novelty_min", self.memory.admission_novelty_min),
            (
                "memory.admission.domain_saturation",
                self.memory.admission_domain_saturation,
            ),
            ("memory.admission.score_floor", self.memory.admission_score_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(config_err(field, value, "must be in [0.0, 1.0]"));
            }
        }
        if self.memory.consolidate_interval_hours == 0 {
            return Err(config_err(
                "memory.consolidate.interval_hours",
                self.memory.consolidate_interval_hours,
                "must be positive",
            ));
        }
        if self.kernel.cognition_timeout_ms == 0
            || self.kernel.cognition_timeout_ms > self.kernel.cognition_timeout_max_ms
        {
            return Err(config_err(
                "kernel.cognition_timeout_ms",
                self.kernel.cognition_timeout_ms,
                "must be positive and not exceed the configured maximum",
            ));
        }
        if self.kernel.max_concurrent_per_agent == 0 {
            return Err(config_err(
                "kernel.max_concurrent_per_agent",
                self.kernel.max_concurrent_per_agent,
                "must be positive",
            ));
        }
        if self.kernel.max_concurrent_total < self.kernel.max_concurrent_per_agent {
            return Err(config_err(
                "kernel.max_concurrent_total",
                self.kernel.max_concurrent_total,
                "must be at least max_concurrent_per_agent",
            ));
        }
        if self.persistence.pool_min == 0 || self.persistence.pool_min > self.persistence.pool_max
        {
            return Err(config_err(
                "persistence.pool_min",
                self.persistence.pool_min,
                "must be positive and not exceed pool_max",
            ));
        }
        if self.bus.inbox_capacity == 0 {
            return Err(config_err(
                "bus.inbox_capacity",
                self.bus.inbox_capacity,
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Load configuration, applying `MNEMO_*` environment overrides on top
    /// of the struct defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            embedding: EmbeddingConfig {
                dim: env_parse("MNEMO_EMBEDDING_DIM", defaults.embedding.dim),
                cache_ttl_seconds: env_parse(
                    "MNEMO_EMBEDDING_CACHE_TTL_SECONDS",
                    defaults.embedding.cache_ttl_seconds,
                ),
                cache_capacity: env_parse(
                    "MNEMO_EMBEDDING_CACHE_CAPACITY",
                    defaults.embedding.cache_capacity,
                ),
                endpoint: std::env::var("MNEMO_EMBEDDING_ENDPOINT")
                    .ok()
                    .or(defaults.embedding.endpoint),
            },
            memory: MemoryConfig {
                admission_novelty_min: env_parse(
                    "MNEMO_MEMORY_ADMISSION_NOVELTY_MIN",
                    defaults.memory.admission_novelty_min,
                ),
                admission_domain_saturation: env_parse(
                    "MNEMO_MEMORY_ADMISSION_DOMAIN_SATURATION",
                    defaults.memory.admission_domain_saturation,
                ),
                admission_score_floor: defaults.memory.admission_score_floor,
                consolidate_interval_hours: env_parse(
                    "MNEMO_MEMORY_CONSOLIDATE_INTERVAL_HOURS",
                    defaults.memory.consolidate_interval_hours,
                ),
            },
            kernel: KernelConfig {
                cognition_timeout_ms: env_parse(
                    "MNEMO_KERNEL_COGNITION_TIMEOUT_MS",
                    defaults.kernel.cognition_timeout_ms,
                ),
                cognition_timeout_max_ms: defaults.kernel.cognition_timeout_max_ms,
                max_concurrent_per_agent: env_parse(
                    "MNEMO_KERNEL_MAX_CONCURRENT_PER_AGENT",
                    defaults.kernel.max_concurrent_per_agent,
                ),
                max_concurrent_total: env_parse(
                    "MNEMO_KERNEL_MAX_CONCURRENT_TOTAL",
                    defaults.kernel.max_concurrent_total,
                ),
            },
            sandbox: SandboxConfig {
                default_cpu_seconds: env_parse(
                    "MNEMO_SANDBOX_DEFAULT_CPU_SECONDS",
                    defaults.sandbox.default_cpu_seconds,
                ),
                default_memory_mb: env_parse(
                    "MNEMO_SANDBOX_DEFAULT_MEMORY_MB",
                    defaults.sandbox.default_memory_mb,
                ),
                default_wall_clock_seconds: defaults.sandbox.default_wall_clock_seconds,
            },
            persistence: PersistenceConfig {
                pool_min: env_parse("MNEMO_PERSISTENCE_POOL_MIN", defaults.persistence.pool_min),
                pool_max: env_parse("MNEMO_PERSISTENCE_POOL_MAX", defaults.persistence.pool_max),
                idle_timeout_seconds: defaults.persistence.idle_timeout_seconds,
            },
            bus: BusConfig {
                inbox_capacity: env_parse(
                    "MNEMO_BUS_INBOX_CAPACITY",
                    defaults.bus.inbox_capacity,
                ),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn config_err(field: &str, value: impl std::fmt::Display, reason: &str) -> RuntimeError {
    RuntimeError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_embedding_dim_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.embedding.dim = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn novelty_min_out_of_range_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.memory.admission_novelty_min = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cognition_timeout_above_max_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.kernel.cognition_timeout_ms = cfg.kernel.cognition_timeout_max_ms + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn pool_min_greater_than_max_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.persistence.pool_min = cfg.persistence.pool_max + 1;
        assert!(cfg.validate().is_err());
    }
}
