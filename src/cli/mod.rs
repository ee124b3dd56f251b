//! CLI subcommands for process control: health probes, version, help.
//!
//! Health probes moved from the teacher's IPC-socket client
//! (`cli/ipc_client.rs`) to a plain HTTP client hitting this proxy's own
//! `/health` route, since this service is HTTP-native end to end. The
//! exit-code convention (`EXIT_HEALTHY`/`EXIT_UNHEALTHY`) is unchanged.

pub mod health;

pub use health::{run_health, run_liveness, run_readiness, EXIT_HEALTHY, EXIT_UNHEALTHY};

/// Default listen address used when no `--addr` override is given.
pub fn get_default_addr() -> String {
    std::env::var("PROXY_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addr_falls_back_when_env_unset() {
        std::env::remove_var("PROXY_ADDR");
        assert_eq!(get_default_addr(), "http://127.0.0.1:8080");
    }

    #[test]
    fn default_addr_respects_env_override() {
        std::env::set_var("PROXY_ADDR", "http://127.0.0.1:9999");
        assert_eq!(get_default_addr(), "http://127.0.0.1:9999");
        std::env::remove_var("PROXY_ADDR");
    }
}
