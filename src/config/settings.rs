use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_cb_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    /// Half-open successes before the circuit closes
    #[serde(default = "default_cb_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    #[serde(default = "default_cb_reset_timeout")]
    pub circuit_breaker_reset_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; persistence falls back to memory when unset
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

/// Dispatch, deduplication and queueing limits.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Storage backend for notifications and delivery reports ("memory" or "postgres")
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// Window in which structurally equal notifications are folded
    #[serde(default = "default_aggregation_timedelta")]
    pub aggregation_timedelta_seconds: i64,
    /// Maximum body length difference for two notifications to count as similar
    #[serde(default = "default_length_similarity_buffer")]
    pub length_similarity_buffer: usize,
    /// Delays shorter than this are dispatched immediately
    #[serde(default = "default_hard_time_limit")]
    pub hard_time_limit_seconds: i64,
    /// Longest delay the job scheduler accepts
    #[serde(default = "default_queue_visibility_timeout")]
    pub queue_visibility_timeout_seconds: i64,
    /// Minimum pause between two background sends
    #[serde(default = "default_send_pause")]
    pub send_pause_seconds: u64,
    #[serde(default = "default_maintenance_cache_timeout")]
    pub maintenance_cache_timeout_seconds: u64,
    /// How far ahead a maintenance notice counts as current
    #[serde(default = "default_maintenance_time_buffer")]
    pub maintenance_time_buffer_seconds: i64,
    #[serde(default)]
    pub system_email_sender_id: Option<String>,
    #[serde(default)]
    pub system_sms_sender_id: Option<String>,
}

/// Channel prices and the ordered provider names tried for each channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_mail_price")]
    pub mail_price: f64,
    #[serde(default = "default_sms_price")]
    pub sms_price: f64,
    #[serde(default = "default_mail_providers")]
    pub mail_providers: Vec<String>,
    #[serde(default = "default_sms_providers")]
    pub sms_providers: Vec<String>,
    /// Default sender per channel name ("Mail", "SMS")
    #[serde(default)]
    pub senders: HashMap<String, String>,
}

/// Provider credentials. Every section is optional so a deployment only
/// configures the transports it uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub aws_ses: Option<AwsCredentials>,
    #[serde(default)]
    pub aws_sns: Option<AwsCredentials>,
    #[serde(default)]
    pub nexmo: Option<NexmoCredentials>,
    #[serde(default)]
    pub t2: Option<T2Credentials>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsCredentials {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NexmoCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct T2Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Gateway base URL, expected to end with a slash
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseConfig {
    /// Ledger backend ("memory" or "postgres")
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// Content type the ledger rows are booked against
    #[serde(default = "default_license_content_type")]
    pub content_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Scheduler backend ("memory" or "redis")
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "default_jobs_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Cache backend ("memory" or "redis")
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "default_cache_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Interval of the sweep that re-enqueues overdue delayed notifications
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// How long a worker waits for the per-notification lock
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "relay-notification-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_memory_backend() -> String {
    "memory".to_string()
}

fn default_aggregation_timedelta() -> i64 {
    300 // 5 minutes
}

fn default_length_similarity_buffer() -> usize {
    20
}

fn default_hard_time_limit() -> i64 {
    180
}

fn default_queue_visibility_timeout() -> i64 {
    86_400 // 1 day
}

fn default_send_pause() -> u64 {
    1
}

fn default_maintenance_cache_timeout() -> u64 {
    30
}

fn default_maintenance_time_buffer() -> i64 {
    900 // 15 minutes
}

fn default_mail_price() -> f64 {
    0.0002
}

fn default_sms_price() -> f64 {
    0.1
}

fn default_mail_providers() -> Vec<String> {
    vec!["aws_ses".to_string()]
}

fn default_sms_providers() -> Vec<String> {
    vec!["t2".to_string(), "nexmo".to_string(), "aws_sns".to_string()]
}

fn default_license_content_type() -> String {
    "notification".to_string()
}

fn default_jobs_prefix() -> String {
    "relay:jobs".to_string()
}

fn default_cache_prefix() -> String {
    "relay:cache".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    500
}

fn default_batch_size() -> usize {
    50
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_lock_timeout() -> u64 {
    10
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("notifications.hard_time_limit_seconds", 180)?
            .set_default("notifications.queue_visibility_timeout_seconds", 86_400)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER_PORT, DATABASE_URL, CHANNELS_SMS_PROVIDERS=t2,nexmo, ...
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("channels.mail_providers")
                    .with_list_parse_key("channels.sms_providers")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            database: DatabaseConfig::default(),
            otel: OtelConfig::default(),
            notifications: NotificationsConfig::default(),
            channels: ChannelsConfig::default(),
            providers: ProvidersConfig::default(),
            license: LicenseConfig::default(),
            jobs: JobsConfig::default(),
            cache: CacheConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            circuit_breaker_failure_threshold: default_cb_failure_threshold(),
            circuit_breaker_success_threshold: default_cb_success_threshold(),
            circuit_breaker_reset_timeout_seconds: default_cb_reset_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            aggregation_timedelta_seconds: default_aggregation_timedelta(),
            length_similarity_buffer: default_length_similarity_buffer(),
            hard_time_limit_seconds: default_hard_time_limit(),
            queue_visibility_timeout_seconds: default_queue_visibility_timeout(),
            send_pause_seconds: default_send_pause(),
            maintenance_cache_timeout_seconds: default_maintenance_cache_timeout(),
            maintenance_time_buffer_seconds: default_maintenance_time_buffer(),
            system_email_sender_id: None,
            system_sms_sender_id: None,
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            mail_price: default_mail_price(),
            sms_price: default_sms_price(),
            mail_providers: default_mail_providers(),
            sms_providers: default_sms_providers(),
            senders: HashMap::new(),
        }
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            content_type: default_license_content_type(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            redis_prefix: default_jobs_prefix(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            redis_prefix: default_cache_prefix(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            sweep_interval_seconds: default_sweep_interval(),
            lock_timeout_seconds: default_lock_timeout(),
        }
    }
}
