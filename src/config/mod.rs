use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::rules::EvalLimits;

/// Authorization engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "authr")]
#[command(about = "Rule-based authorization engine")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "AUTHR_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Path to a YAML rule-set definition to seed and watch (optional)
    #[arg(long, env = "AUTHR_RULE_SET_PATH")]
    pub rule_set_path: Option<PathBuf>,

    /// Rule-set file reload check interval in seconds
    #[arg(long, default_value = "30", env = "AUTHR_RELOAD_SECS")]
    pub reload_secs: u64,

    /// Maximum rule tree depth per evaluation
    #[arg(long, default_value = "64", env = "AUTHR_MAX_EVAL_DEPTH")]
    pub max_eval_depth: u32,

    /// Maximum rule nodes visited per evaluation
    #[arg(long, default_value = "4096", env = "AUTHR_MAX_EVAL_NODES")]
    pub max_eval_nodes: u32,

    /// Idle staging buffers older than this are reclaimed, in seconds
    #[arg(long, default_value = "3600", env = "AUTHR_BUFFER_TTL_SECS")]
    pub buffer_ttl_secs: u64,

    /// Stale buffer sweep interval in seconds
    #[arg(long, default_value = "300", env = "AUTHR_BUFFER_GC_SECS")]
    pub buffer_gc_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "AUTHR_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "AUTHR_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get rule-set reload interval as Duration.
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_secs)
    }

    /// Get buffer sweep interval as Duration.
    pub fn buffer_gc_interval(&self) -> Duration {
        Duration::from_secs(self.buffer_gc_secs)
    }

    /// Get buffer staleness TTL.
    pub fn buffer_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.buffer_ttl_secs as i64)
    }

    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Evaluation budget derived from configuration.
    pub fn eval_limits(&self) -> EvalLimits {
        EvalLimits {
            max_depth: self.max_eval_depth,
            max_nodes: self.max_eval_nodes,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            rule_set_path: None,
            reload_secs: 30,
            max_eval_depth: 64,
            max_eval_nodes: 4096,
            buffer_ttl_secs: 3600,
            buffer_gc_secs: 300,
            log_level: "info".to_string(),
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.max_eval_depth, 64);
        assert_eq!(config.buffer_ttl_secs, 3600);
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config {
            reload_secs: 60,
            buffer_gc_secs: 120,
            shutdown_timeout_secs: 15,
            ..Default::default()
        };

        assert_eq!(config.reload_interval(), Duration::from_secs(60));
        assert_eq!(config.buffer_gc_interval(), Duration::from_secs(120));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_eval_limits() {
        let config = Config {
            max_eval_depth: 10,
            max_eval_nodes: 100,
            ..Default::default()
        };

        assert_eq!(
            config.eval_limits(),
            EvalLimits {
                max_depth: 10,
                max_nodes: 100
            }
        );
    }
}
