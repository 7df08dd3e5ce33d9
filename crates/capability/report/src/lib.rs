//! # 上报能力模块
//!
//! 将稳定读数与周期性设备状态推送到中心服务器。
//!
//! ```text
//! Session / StatusReporter
//!       │ submit()（不等待结果）
//!       ▼
//! QueuedSink ──(有界队列)──▶ dispatcher task ──▶ ReportWriter (HTTP)
//! ```

mod http;
mod queue;
mod status;

use async_trait::async_trait;
use domain::{CommandStatus, DeviceId, DeviceKind, LifecycleState};
use std::sync::Mutex;

pub use http::{HttpReportConfig, HttpReportWriter, endpoint_path};
pub use queue::{DispatchConfig, QueuedSink};
pub use status::{report_status_once, spawn_status_reporter};

/// 上报错误。
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("client error: {0}")]
    Client(String),
}

/// 上报通道：读数按设备类型分端点，状态统一端点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportChannel {
    Reading(DeviceKind),
    Status,
}

/// 一条上报记录：设备、通道、按顺序排列的表单字段与时间戳。
///
/// 读数只有一个字段 `<metric>=<value>`；状态在同一条记录里带 `isOk` 与 `state`，
/// 服务端一次收到完整的状态对。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub device_id: DeviceId,
    pub channel: ReportChannel,
    pub fields: Vec<(String, String)>,
    pub ts_ms: i64,
}

impl Report {
    pub fn reading(
        device_id: DeviceId,
        kind: DeviceKind,
        metric: impl Into<String>,
        value: impl Into<String>,
        ts_ms: i64,
    ) -> Self {
        Self {
            device_id,
            channel: ReportChannel::Reading(kind),
            fields: vec![(metric.into(), value.into())],
            ts_ms,
        }
    }

    pub fn status(
        device_id: DeviceId,
        command: CommandStatus,
        state: LifecycleState,
        ts_ms: i64,
    ) -> Self {
        Self {
            device_id,
            channel: ReportChannel::Status,
            fields: vec![
                ("isOk".to_string(), command.code().to_string()),
                ("state".to_string(), state.code().to_string()),
            ],
            ts_ms,
        }
    }

    /// 按字段名取值。
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// 上报入口：调用方只提交，不等待确认。
pub trait ReportSink: Send + Sync {
    fn submit(&self, report: Report);
}

/// 上报写入器抽象（实际发送）。
#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write(&self, report: &Report) -> Result<(), ReportError>;
}

/// 空写入器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopWriter;

#[async_trait]
impl ReportWriter for NoopWriter {
    async fn write(&self, _report: &Report) -> Result<(), ReportError> {
        Ok(())
    }
}

/// 内存记录上报（用于测试与本地调试）。
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    pub fn readings(&self) -> Vec<Report> {
        self.reports()
            .into_iter()
            .filter(|report| matches!(report.channel, ReportChannel::Reading(_)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|reports| reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for RecordingSink {
    fn submit(&self, report: Report) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
