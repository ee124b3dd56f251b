//! Admission & eviction scenarios exercised end to end at the planner level.
//!
//! Mirrors the walkthrough used to validate the design: GPU total 24576 MB,
//! reserved buffer 2048 MB (usable 22528 MB), three declared models A/B/C.

use std::sync::Arc;

use modelgate::config::{GpuSettings, Precision};
use modelgate::gpu::GpuSnapshot;
use modelgate::models::declaration::ModelDeclaration;
use modelgate::models::planner::{AdmissionPlanner, PlannerError};
use modelgate::models::record::{ModelRecord, ModelState};

fn declared(id: &str, estimate_mb: u64) -> Arc<ModelRecord> {
    ModelRecord::new(ModelDeclaration {
        id: id.into(),
        backend_path: "/bin/true".into(),
        args: vec![],
        parameter_count_billions: 1.0,
        precision: Precision::Fp16,
        max_sequence_length: 1024,
        max_concurrent_sequences: 8,
        tensor_parallel_degree: 1,
        memory_estimate_mb: estimate_mb,
        credential: String::new(),
        label: id.into(),
        tags: vec![],
    })
}

fn gpu_settings() -> GpuSettings {
    GpuSettings {
        device_id: 0,
        reserved_buffer_mb: 2048,
        nvml: false,
        memory_utilization: 0.9,
    }
}

#[test]
fn usable_headroom_matches_reserved_buffer_math() {
    let snapshot = GpuSnapshot {
        total_mb: 24576,
        used_mb: 0,
        free_mb: 24576,
    };
    assert_eq!(snapshot.usable_mb(&gpu_settings()), 22528);
}

#[tokio::test]
async fn loads_directly_while_capacity_remains() {
    let planner = AdmissionPlanner::new();
    let a = declared("a", 8000);

    // Loading A (8000), then B (8000), both fit under the 22528 usable
    // headroom without evicting anything.
    let plan_a = planner.plan(8000, 22528, &[]).unwrap();
    assert!(plan_a.evict.is_empty());

    let free_after_a = 22528 - 8000;
    let plan_b = planner.plan(8000, free_after_a, &[a]).unwrap();
    assert!(plan_b.evict.is_empty());
}

#[tokio::test]
async fn evicts_the_oldest_idle_model_to_make_room_for_a_larger_one() {
    // Free after A and B are both running: 22528 - 16000 = 6528.
    let a = declared("a", 8000);
    let b = declared("b", 8000);
    *a.state.write().await = ModelState::Running { port: 9001 };
    *b.state.write().await = ModelState::Running { port: 9002 };

    // A was used first (further in the past) so it idles longer than B.
    a.touch();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    b.touch();

    let planner = AdmissionPlanner::new();
    let plan = planner.plan(10000, 6528, &[a.clone(), b.clone()]).unwrap();

    // Evicting A alone (8000) already covers the 10000 requirement: 6528 + 8000 = 14528.
    assert_eq!(plan.evict, vec!["a".to_string()]);
}

#[tokio::test]
async fn infeasible_plan_reports_shortfall_against_the_considered_set() {
    // Evicting every running candidate still doesn't free enough memory, so
    // admission fails and reports the shortfall against what was considered.
    let b = declared("b", 1000);
    *b.state.write().await = ModelState::Running { port: 9002 };

    let planner = AdmissionPlanner::new();
    let result = planner.plan(8000, 2000, &[b.clone()]);

    match result {
        Err(PlannerError::Infeasible { shortfall }) => {
            assert_eq!(shortfall.required_mb, 8000);
            assert_eq!(shortfall.free_mb, 2000);
            assert_eq!(shortfall.considered, vec!["b".to_string()]);
        }
        Ok(_) => panic!("expected admission to be infeasible"),
    }
}
