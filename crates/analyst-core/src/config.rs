use std::env;
use std::time::Duration;

/// Environment-driven configuration, collecting every key spec.md §6
/// enumerates into one typed struct loaded once at binary startup.
///
/// Each field documents the environment key and default it corresponds to.
#[derive(Debug, Clone)]
pub struct Config {
    /// `broker_address` — connection target for the backing queue/store.
    pub broker_address: String,
    /// `model_endpoint` — location of the language-model server.
    pub model_endpoint: String,
    /// `model_name` — which model to request.
    pub model_name: String,
    /// `model_context_tokens` — requested context window.
    pub model_context_tokens: u32,
    /// `data_dir` — directory containing DataFiles.
    pub data_dir: String,
    /// `inflation_cache_path` — location of the inflation table file.
    pub inflation_cache_path: String,
    /// `worker_count` — number of worker processes (informational; each
    /// process reads its own config and runs independently).
    pub worker_count: u32,
    /// `max_job_attempts` — requeue ceiling.
    pub max_job_attempts: u32,
    /// `lease_duration` — how long a reservation is valid.
    pub lease_duration: Duration,
    /// `lease_extension_interval` — how often a worker extends.
    pub lease_extension_interval: Duration,
    /// `per_exec_timeout` — per code-block execution ceiling.
    pub per_exec_timeout: Duration,
    /// `per_job_exec_budget` — cumulative code-execution ceiling.
    pub per_job_exec_budget: Duration,
    /// `per_job_wall_timeout` — total wall-clock ceiling.
    pub per_job_wall_timeout: Duration,
    /// `per_model_request_timeout` — single model call ceiling.
    pub per_model_request_timeout: Duration,
    /// `max_rounds` — maximum generate/execute loops.
    pub max_rounds: u32,
    /// `max_file_bytes` — loader-side upper bound.
    pub max_file_bytes: u64,
    /// `inflation_refresh_max_age_days` — refresh trigger.
    pub inflation_refresh_max_age_days: i64,
    /// `inflation_source_url` — reference page the Inflation Cache scrapes
    /// on refresh. Not named in the original config enumeration but
    /// required to make "fetch from the configured reference source"
    /// concrete.
    pub inflation_source_url: String,
    /// `executor_command` — interpreter binary the Worker Pool pipes
    /// generated code into. Not named in the original config enumeration but
    /// required to make "a configured interpreter binary" (§4.5) concrete,
    /// same rationale as `inflation_source_url`.
    pub executor_command: String,
    /// `executor_args` — comma-separated arguments passed to
    /// `executor_command` before the piped code.
    pub executor_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_address: "postgres://localhost/analyst".to_string(),
            model_endpoint: "http://localhost:8000/v1".to_string(),
            model_name: "default".to_string(),
            model_context_tokens: 8192,
            data_dir: "./data".to_string(),
            inflation_cache_path: "./inflation_cache.json".to_string(),
            worker_count: 1,
            max_job_attempts: 1,
            lease_duration: Duration::from_secs(600),
            lease_extension_interval: Duration::from_secs(300),
            per_exec_timeout: Duration::from_secs(120),
            per_job_exec_budget: Duration::from_secs(600),
            per_job_wall_timeout: Duration::from_secs(1800),
            per_model_request_timeout: Duration::from_secs(600),
            max_rounds: 10,
            max_file_bytes: 100 * 1024 * 1024,
            inflation_refresh_max_age_days: 30,
            inflation_source_url: "https://www.usinflationcalculator.com/inflation/current-inflation-rates/".to_string(),
            executor_command: "python3".to_string(),
            executor_args: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to
    /// [`Config::default`] for any key that is unset or fails to parse.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            broker_address: env_string("broker_address", d.broker_address),
            model_endpoint: env_string("model_endpoint", d.model_endpoint),
            model_name: env_string("model_name", d.model_name),
            model_context_tokens: env_parsed("model_context_tokens", d.model_context_tokens),
            data_dir: env_string("data_dir", d.data_dir),
            inflation_cache_path: env_string("inflation_cache_path", d.inflation_cache_path),
            worker_count: env_parsed("worker_count", d.worker_count),
            max_job_attempts: env_parsed("max_job_attempts", d.max_job_attempts),
            lease_duration: env_secs("lease_duration", d.lease_duration),
            lease_extension_interval: env_secs("lease_extension_interval", d.lease_extension_interval),
            per_exec_timeout: env_secs("per_exec_timeout", d.per_exec_timeout),
            per_job_exec_budget: env_secs("per_job_exec_budget", d.per_job_exec_budget),
            per_job_wall_timeout: env_secs("per_job_wall_timeout", d.per_job_wall_timeout),
            per_model_request_timeout: env_secs("per_model_request_timeout", d.per_model_request_timeout),
            max_rounds: env_parsed("max_rounds", d.max_rounds),
            max_file_bytes: env_parsed("max_file_bytes", d.max_file_bytes),
            inflation_refresh_max_age_days: env_parsed(
                "inflation_refresh_max_age_days",
                d.inflation_refresh_max_age_days,
            ),
            inflation_source_url: env_string("inflation_source_url", d.inflation_source_url),
            executor_command: env_string("executor_command", d.executor_command),
            executor_args: env::var("executor_args")
                .ok()
                .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or(d.executor_args),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.model_context_tokens, 8192);
        assert_eq!(cfg.max_job_attempts, 1);
        assert_eq!(cfg.lease_duration, Duration::from_secs(600));
        assert_eq!(cfg.per_exec_timeout, Duration::from_secs(120));
        assert_eq!(cfg.per_job_exec_budget, Duration::from_secs(600));
        assert_eq!(cfg.per_job_wall_timeout, Duration::from_secs(1800));
        assert_eq!(cfg.per_model_request_timeout, Duration::from_secs(600));
        assert_eq!(cfg.max_rounds, 10);
        assert_eq!(cfg.max_file_bytes, 100 * 1024 * 1024);
        assert_eq!(cfg.inflation_refresh_max_age_days, 30);
    }
}
