//! 追踪初始化、会话 ID 生成与进程内计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub read_failures: u64,
    pub decode_failures: u64,
    pub readings_emitted: u64,
    pub idle_timeouts: u64,
    pub sessions_started: u64,
    pub sessions_closed: u64,
    pub accept_failures: u64,
    pub listener_failures: u64,
    pub reports_sent: u64,
    pub reports_failed: u64,
    pub reports_dropped: u64,
    pub discovery_failures: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    frames_received: AtomicU64,
    frames_discarded: AtomicU64,
    read_failures: AtomicU64,
    decode_failures: AtomicU64,
    readings_emitted: AtomicU64,
    idle_timeouts: AtomicU64,
    sessions_started: AtomicU64,
    sessions_closed: AtomicU64,
    accept_failures: AtomicU64,
    listener_failures: AtomicU64,
    reports_sent: AtomicU64,
    reports_failed: AtomicU64,
    reports_dropped: AtomicU64,
    discovery_failures: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            readings_emitted: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            accept_failures: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
            reports_sent: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            discovery_failures: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            readings_emitted: self.readings_emitted.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            accept_failures: self.accept_failures.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            discovery_failures: self.discovery_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 session_id，用于串联同一条设备连接的日志。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录收到的完整帧。
pub fn record_frame_received() {
    metrics().frames_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录长度不符被丢弃的帧。
pub fn record_frame_discarded() {
    metrics().frames_discarded.fetch_add(1, Ordering::Relaxed);
}

/// 记录读失败次数。
pub fn record_read_failure() {
    metrics().read_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录稳定读数上报次数。
pub fn record_reading_emitted() {
    metrics().readings_emitted.fetch_add(1, Ordering::Relaxed);
}

/// 记录空闲超时（设备无数据）次数。
pub fn record_idle_timeout() {
    metrics().idle_timeouts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_session_started() {
    metrics().sessions_started.fetch_add(1, Ordering::Relaxed);
}

pub fn record_session_closed() {
    metrics().sessions_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录 accept 失败次数。
pub fn record_accept_failure() {
    metrics().accept_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录监听不可用（设备在重启前不可达）次数。
pub fn record_listener_failure() {
    metrics().listener_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_report_sent() {
    metrics().reports_sent.fetch_add(1, Ordering::Relaxed);
}

pub fn record_report_failed() {
    metrics().reports_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录上报队列已满被丢弃的次数。
pub fn record_report_dropped() {
    metrics().reports_dropped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_discovery_failure() {
    metrics().discovery_failures.fetch_add(1, Ordering::Relaxed);
}
