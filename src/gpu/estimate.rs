//! Memory estimation for a declared backend.
//!
//! These constants are approximations, not measurements — they exist so the
//! admission planner has *a* number to reason about before a backend has
//! ever reported its real footprint. Operators who know a model's actual
//! footprint should set `memory_estimate_override_mb` in its declaration
//! rather than rely on this formula.

use crate::config::ModelSettings;

/// KV-cache entries store one key and one value vector per layer per token,
/// hence the factor of 2 on top of the per-token head dimension.
const KV_CACHE_FACTOR: f64 = 2.0;

/// Coefficient on the activation-memory term (batch × sequence × hidden):
/// an approximation of peak intermediate-tensor memory held during a
/// forward pass, not derived from measurement.
const ACTIVATION_COEFFICIENT: f64 = 2.0;

/// Fixed per-process runtime overhead: CUDA context, allocator arenas,
/// framework bookkeeping. Independent of model size.
const RUNTIME_OVERHEAD_MB: u64 = 512;

pub fn estimate_memory_mb(model: &ModelSettings) -> u64 {
    if model.memory_estimate_override_mb > 0 {
        return model.memory_estimate_override_mb;
    }

    let params = model.parameter_count_billions * 1e9;
    let weights_bytes = params * model.precision.bytes_per_param();

    let head_dim = if model.heads > 0 {
        model.hidden_size as f64 / model.heads as f64
    } else {
        0.0
    };
    let kv_cache_bytes = KV_CACHE_FACTOR
        * model.layers as f64
        * model.kv_heads as f64
        * head_dim
        * model.max_sequence_length as f64
        * model.max_concurrent_sequences as f64
        * model.precision.bytes_per_param();

    // batch × sequence × hidden, batch approximated by the declared
    // concurrency cap since there's no live batch size before the backend
    // starts reporting its own metrics.
    let activation_bytes = ACTIVATION_COEFFICIENT
        * model.max_concurrent_sequences as f64
        * model.max_sequence_length as f64
        * model.hidden_size as f64
        * model.precision.bytes_per_param();

    let total_bytes = weights_bytes + kv_cache_bytes + activation_bytes;
    let total_mb = (total_bytes / (1024.0 * 1024.0)).ceil() as u64;
    total_mb + RUNTIME_OVERHEAD_MB
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Precision;

    fn base() -> ModelSettings {
        ModelSettings {
            backend_path: "/bin/serve".into(),
            parameter_count_billions: 7.0,
            precision: Precision::Fp16,
            max_sequence_length: 4096,
            max_concurrent_sequences: 1,
            layers: 32,
            hidden_size: 4096,
            heads: 32,
            kv_heads: 32,
            ..Default::default()
        }
    }

    #[test]
    fn override_wins_over_formula() {
        let mut model = base();
        model.memory_estimate_override_mb = 12345;
        assert_eq!(estimate_memory_mb(&model), 12345);
    }

    #[test]
    fn larger_model_estimates_more_memory() {
        let small = base();
        let mut big = base();
        big.parameter_count_billions = 70.0;
        assert!(estimate_memory_mb(&big) > estimate_memory_mb(&small));
    }

    #[test]
    fn estimate_always_includes_runtime_overhead() {
        let mut tiny = base();
        tiny.parameter_count_billions = 0.0;
        tiny.layers = 0;
        assert_eq!(estimate_memory_mb(&tiny), RUNTIME_OVERHEAD_MB);
    }
}
