// Copyright 2024-2026 Veritas SPARK Contributors
// SPDX-License-Identifier: Apache-2.0

//! Health check CLI commands for K8s exec probes.
//!
//! - Exit 0: healthy/alive/ready
//! - Exit 1: unhealthy/dead/not ready

pub const EXIT_HEALTHY: i32 = 0;
pub const EXIT_UNHEALTHY: i32 = 1;

pub async fn run_health(addr: &str) -> i32 {
    run_check(addr, "health", "/health").await
}

pub async fn run_liveness(addr: &str) -> i32 {
    run_check(addr, "liveness", "/health/live").await
}

pub async fn run_readiness(addr: &str) -> i32 {
    run_check(addr, "readiness", "/health/ready").await
}

async fn run_check(addr: &str, name: &str, path: &str) -> i32 {
    let url = format!("{addr}{path}");
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            eprintln!("{name} check: OK");
            EXIT_HEALTHY
        }
        Ok(resp) => {
            eprintln!("{name} check: FAILED (status {})", resp.status());
            EXIT_UNHEALTHY
        }
        Err(e) => {
            eprintln!("{name} check error: {e}");
            EXIT_UNHEALTHY
        }
    }
}
