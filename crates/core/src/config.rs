use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SHOPPULSE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_session_timeout_mins")]
    pub session_timeout_mins: i64,
    #[serde(default = "default_ring_buffer_size")]
    pub ring_buffer_size: usize,
}

/// Which RFM bucketing policy the scoring pass uses. Fixed thresholds are
/// the canonical default; percentile quintiles suit large populations where
/// absolute spend thresholds drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfmPolicy {
    FixedThresholds,
    Percentile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_rfm_policy")]
    pub rfm_policy: RfmPolicy,
    #[serde(default = "default_active_window_days")]
    pub active_window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_instance_ttl_days")]
    pub instance_ttl_days: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_job_sweep_secs")]
    pub job_sweep_interval_secs: u64,
    #[serde(default = "default_cart_sweep_secs")]
    pub cart_sweep_interval_secs: u64,
    #[serde(default = "default_recompute_secs")]
    pub recompute_interval_secs: u64,
    #[serde(default = "default_vip_sweep_secs")]
    pub vip_sweep_interval_secs: u64,
    #[serde(default = "default_cart_lookback_mins")]
    pub cart_lookback_mins: i64,
    #[serde(default = "default_cart_min_value")]
    pub cart_min_value: f64,
    #[serde(default = "default_vip_min_spend")]
    pub vip_min_spend: f64,
    #[serde(default = "default_vip_min_orders")]
    pub vip_min_orders: usize,
}

// Default functions
fn default_node_id() -> String {
    "pulse-01".to_string()
}
fn default_session_timeout_mins() -> i64 {
    30
}
fn default_ring_buffer_size() -> usize {
    1000
}
fn default_rfm_policy() -> RfmPolicy {
    RfmPolicy::FixedThresholds
}
fn default_active_window_days() -> i64 {
    90
}
fn default_instance_ttl_days() -> u64 {
    30
}
fn default_retry_max_attempts() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    2000
}
fn default_job_sweep_secs() -> u64 {
    60
}
fn default_cart_sweep_secs() -> u64 {
    300
}
fn default_recompute_secs() -> u64 {
    900
}
fn default_vip_sweep_secs() -> u64 {
    604_800
}
fn default_cart_lookback_mins() -> i64 {
    60
}
fn default_cart_min_value() -> f64 {
    25.0
}
fn default_vip_min_spend() -> f64 {
    1000.0
}
fn default_vip_min_orders() -> usize {
    5
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            session_timeout_mins: default_session_timeout_mins(),
            ring_buffer_size: default_ring_buffer_size(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rfm_policy: default_rfm_policy(),
            active_window_days: default_active_window_days(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            instance_ttl_days: default_instance_ttl_days(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_sweep_interval_secs: default_job_sweep_secs(),
            cart_sweep_interval_secs: default_cart_sweep_secs(),
            recompute_interval_secs: default_recompute_secs(),
            vip_sweep_interval_secs: default_vip_sweep_secs(),
            cart_lookback_mins: default_cart_lookback_mins(),
            cart_min_value: default_cart_min_value(),
            vip_min_spend: default_vip_min_spend(),
            vip_min_orders: default_vip_min_orders(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            tracking: TrackingConfig::default(),
            scoring: ScoringConfig::default(),
            workflow: WorkflowConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SHOPPULSE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
