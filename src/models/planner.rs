//! Admission & Eviction Planner.
//!
//! Decides whether a request for `required_mb` can be satisfied given
//! current GPU headroom and, if not outright, which already-running idle
//! models to evict first to make room. Eviction scoring is adapted from
//! `models::pool::ModelPool::evict_one`'s
//! `tier_weight * 1_000_000 + usage_weight - recency_weight` formula; this
//! spec has no `ModelTier` concept, so every candidate starts from the same
//! baseline and is ranked purely by reference count and idle time.

use std::sync::Arc;

use super::record::{ModelRecord, ModelState};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("cannot admit request: insufficient GPU memory")]
    Infeasible { shortfall: Shortfall },
}

#[derive(Debug, Clone)]
pub struct Shortfall {
    pub required_mb: u64,
    pub free_mb: u64,
    pub considered: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Plan {
    /// Model ids to evict, in the order they should be stopped, before the
    /// requested model is started.
    pub evict: Vec<String>,
}

pub struct AdmissionPlanner;

impl AdmissionPlanner {
    pub fn new() -> Self {
        Self
    }

    /// `free_mb` is the GPU oracle's current usable headroom. `records` are
    /// every *other* declared model (the one being admitted is excluded by
    /// the caller). Eviction targets are restricted to models with zero
    /// in-flight requests — never evict a model a live request depends on.
    pub fn plan(
        &self,
        required_mb: u64,
        free_mb: u64,
        records: &[Arc<ModelRecord>],
    ) -> Result<Plan, PlannerError> {
        if required_mb <= free_mb {
            return Ok(Plan { evict: Vec::new() });
        }

        let mut candidates: Vec<&Arc<ModelRecord>> = records
            .iter()
            .filter(|r| r.active_requests() == 0 && is_running(r))
            .collect();
        candidates.sort_by(|a, b| eviction_key(a).cmp(&eviction_key(b)));

        let mut reclaimed = 0u64;
        let mut evict = Vec::new();
        for record in candidates {
            if reclaimed + free_mb >= required_mb {
                break;
            }
            reclaimed += record.declaration.memory_estimate_mb;
            evict.push(record.declaration.id.clone());
        }

        if reclaimed + free_mb < required_mb {
            return Err(PlannerError::Infeasible {
                shortfall: Shortfall {
                    required_mb,
                    free_mb,
                    considered: records.iter().map(|r| r.declaration.id.clone()).collect(),
                },
            });
        }

        Ok(Plan { evict })
    }
}

impl Default for AdmissionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Only `Running` records hold memory that can actually be reclaimed;
/// `Stopped`/`Starting`/`Stopping`/`Error` never count as eviction candidates
/// even though the registry's ephemeral records only exist for models
/// somewhere in that lifecycle.
fn is_running(record: &ModelRecord) -> bool {
    matches!(
        *record
            .state
            .try_read()
            .map(|g| g.clone())
            .unwrap_or(ModelState::Stopped),
        ModelState::Running { .. }
    )
}

/// Sort key for eviction ordering: oldest-idle first; ties broken by
/// freeing the most memory with the fewest evictions (descending estimate),
/// then by id for determinism.
fn eviction_key(record: &ModelRecord) -> (i64, std::cmp::Reverse<u64>, String) {
    (
        -record.idle_for_ms(),
        std::cmp::Reverse(record.declaration.memory_estimate_mb),
        record.declaration.id.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Precision;
    use crate::models::declaration::ModelDeclaration;

    fn record(id: &str, mb: u64) -> Arc<ModelRecord> {
        ModelRecord::new(ModelDeclaration {
            id: id.into(),
            backend_path: "/bin/true".into(),
            args: vec![],
            parameter_count_billions: 1.0,
            precision: Precision::Fp16,
            max_sequence_length: 1024,
            max_concurrent_sequences: 1,
            tensor_parallel_degree: 1,
            memory_estimate_mb: mb,
            credential: String::new(),
            label: id.into(),
            tags: vec![],
        })
    }

    #[test]
    fn fits_without_eviction() {
        let planner = AdmissionPlanner::new();
        let plan = planner.plan(8000, 10000, &[]).unwrap();
        assert!(plan.evict.is_empty());
    }

    #[test]
    fn evicts_idle_models_to_make_room() {
        let planner = AdmissionPlanner::new();
        let b = record("b", 8000);
        *b.state.try_write().unwrap() = ModelState::Running { port: 9001 };
        let plan = planner.plan(10000, 2000, &[b]).unwrap();
        assert_eq!(plan.evict, vec!["b".to_string()]);
    }

    #[test]
    fn never_evicts_a_model_with_active_requests() {
        let planner = AdmissionPlanner::new();
        let b = record("b", 8000);
        *b.state.try_write().unwrap() = ModelState::Running { port: 9001 };
        b.incr_active();
        let result = planner.plan(10000, 2000, &[b]);
        assert!(matches!(result, Err(PlannerError::Infeasible { .. })));
    }

    #[test]
    fn a_stopped_record_is_never_selected_for_eviction() {
        // `b` is freshly created and never transitioned out of `Stopped`,
        // the state every pre-created-but-never-loaded declaration starts
        // in — it holds no backend memory and must not be "evicted".
        let planner = AdmissionPlanner::new();
        let b = record("b", 8000);
        let result = planner.plan(10000, 2000, &[b]);
        assert!(matches!(result, Err(PlannerError::Infeasible { .. })));
    }

    #[test]
    fn infeasible_reports_shortfall_with_considered_ids() {
        let planner = AdmissionPlanner::new();
        let b = record("b", 1000);
        let result = planner.plan(10000, 500, &[b]).unwrap_err();
        match result {
            PlannerError::Infeasible { shortfall } => {
                assert_eq!(shortfall.required_mb, 10000);
                assert_eq!(shortfall.considered, vec!["b".to_string()]);
            }
        }
    }
}
