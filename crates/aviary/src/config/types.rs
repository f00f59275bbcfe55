//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::tasks::TaskPolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to reach the cluster.
    pub cluster: ClusterConfig,

    /// Canary selection settings.
    pub sampling: SamplingConfig,

    /// Canary verification settings.
    pub verification: VerificationConfig,

    /// Origin filters as `keyspace_regex[:table_regex]`; all must match.
    pub filters: Vec<String>,

    /// Concurrency, timeout and retry policy for units of work.
    pub tasks: TaskConfig,
}

/// Cluster connection configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Contact points, `host` or `host:port` (default: 127.0.0.1).
    pub contact_points: Vec<String>,

    /// Native protocol port for contact points without one (default: 9042).
    pub port: u16,

    /// Username for password authentication.
    pub username: Option<String>,

    /// Password for password authentication.
    pub password: Option<String>,

    /// Datacenter to prefer when routing queries.
    pub local_dc: Option<String>,

    /// Connection timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            contact_points: default_contact_points(),
            port: default_port(),
            username: None,
            password: None,
            local_dc: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("contact_points", &self.contact_points)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("local_dc", &self.local_dc)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl ClusterConfig {
    /// Contact points with the configured port appended where missing.
    pub fn known_nodes(&self) -> Vec<String> {
        self.contact_points
            .iter()
            .map(|host| {
                let host = host.trim();
                if has_port(host) {
                    host.to_string()
                } else if host.contains(':') {
                    format!("[{}]:{}", host.trim_matches(|c| c == '[' || c == ']'), self.port)
                } else {
                    format!("{}:{}", host, self.port)
                }
            })
            .collect()
    }
}

/// `host:port` or `[v6]:port`; a bare IPv6 address has no port.
fn has_port(host: &str) -> bool {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.contains("]:");
    }
    match host.rsplit_once(':') {
        Some((name, port)) => !name.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Canary selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampler strategy (default: "range").
    pub strategy: String,

    /// Rows requested per token range (default: 1).
    pub limit: u32,

    /// Aviary file the canaries are written to (default: "aviary.json").
    pub output: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strategy: default_sampler(),
            limit: default_limit(),
            output: default_aviary_file(),
        }
    }
}

/// Canary verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Verifier strategy (default: "simple").
    pub strategy: String,

    /// Aviary file the canaries are read from (default: "aviary.json").
    pub input: String,

    /// Canaries buffered between the file reader and the verifier.
    pub channel_capacity: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            strategy: default_verifier(),
            input: default_aviary_file(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Task policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Units of work in flight at once (default: 256).
    pub max_in_flight: usize,

    /// Per-unit timeout in seconds. Unset means no timeout.
    pub timeout_secs: Option<u64>,

    /// Retries of a unit after a query failure or timeout (default: 0).
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each further one.
    pub retry_backoff_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            timeout_secs: None,
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl TaskConfig {
    pub fn policy(&self) -> TaskPolicy {
        TaskPolicy::new()
            .with_max_in_flight(self.max_in_flight)
            .with_timeout(self.timeout_secs.map(Duration::from_secs))
            .with_retries(self.max_retries, Duration::from_millis(self.retry_backoff_ms))
    }
}

// Default value functions
fn default_contact_points() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_port() -> u16 {
    9042
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_sampler() -> String {
    "range".to_string()
}

fn default_verifier() -> String {
    "simple".to_string()
}

fn default_limit() -> u32 {
    1
}

fn default_aviary_file() -> String {
    "aviary.json".to_string()
}

fn default_channel_capacity() -> usize {
    crate::store::DEFAULT_CHANNEL_CAPACITY
}

fn default_max_in_flight() -> usize {
    256
}

fn default_retry_backoff_ms() -> u64 {
    100
}
