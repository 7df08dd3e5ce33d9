//! 网关运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_host: String,
    pub catalog_url: String,
    pub report_base_url: String,
    pub http_timeout_secs: u64,
    pub discovery_interval_secs: u64,
    pub status_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_read_retries: u32,
    pub stability_threshold: u32,
    pub frame_channel_capacity: usize,
    pub report_queue_capacity: usize,
    pub report_max_retries: u64,
    pub report_backoff_ms: u64,
    pub max_accept_failures: u32,
}

impl GatewayConfig {
    /// 从环境变量读取配置，未设置的项使用现场默认值。
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_host =
            env::var("FIELDGW_LISTEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let report_base_url = env::var("FIELDGW_REPORT_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080/smart/api".to_string());
        let catalog_url = env::var("FIELDGW_CATALOG_URL").unwrap_or_else(|_| {
            format!(
                "{}/getHardwareList?projectId=1",
                report_base_url.trim_end_matches('/')
            )
        });
        let http_timeout_secs = read_u64_with_default("FIELDGW_HTTP_TIMEOUT_SECS", 5)?;
        let discovery_interval_secs =
            read_positive_u64("FIELDGW_DISCOVERY_INTERVAL_SECS", 120)?;
        let status_interval_secs = read_positive_u64("FIELDGW_STATUS_INTERVAL_SECS", 10)?;
        let idle_timeout_secs = read_positive_u64("FIELDGW_IDLE_TIMEOUT_SECS", 5)?;
        let max_read_retries = read_u32_with_default("FIELDGW_MAX_READ_RETRIES", 3)?;
        let stability_threshold = read_u32_with_default("FIELDGW_STABILITY_THRESHOLD", 5)?;
        let frame_channel_capacity =
            read_usize_with_default("FIELDGW_FRAME_CHANNEL_CAPACITY", 10)?.max(1);
        let report_queue_capacity =
            read_usize_with_default("FIELDGW_REPORT_QUEUE_CAPACITY", 1024)?.max(1);
        let report_max_retries = read_u64_with_default("FIELDGW_REPORT_MAX_RETRIES", 1)?;
        let report_backoff_ms = read_u64_with_default("FIELDGW_REPORT_BACKOFF_MS", 200)?;
        let max_accept_failures =
            read_u32_with_default("FIELDGW_MAX_ACCEPT_FAILURES", 10)?.max(1);

        Ok(Self {
            listen_host,
            catalog_url,
            report_base_url,
            http_timeout_secs,
            discovery_interval_secs,
            status_interval_secs,
            idle_timeout_secs,
            max_read_retries,
            stability_threshold,
            frame_channel_capacity,
            report_queue_capacity,
            report_max_retries,
            report_backoff_ms,
            max_accept_failures,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 周期、超时类配置不允许为 0。
fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}
