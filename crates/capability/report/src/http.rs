//! HTTP 上报实现
//!
//! 以表单方式 POST 到 `<base_url>/<endpoint>`：
//!
//! ```text
//! hardwareId=3&weight=700000&time=2024-05-01 08:00:00
//! ```

use crate::{Report, ReportChannel, ReportError, ReportWriter};
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use domain::DeviceKind;
use std::time::Duration;

/// HTTP 上报配置。
#[derive(Debug, Clone)]
pub struct HttpReportConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// 各上报通道对应的端点路径。
pub fn endpoint_path(channel: ReportChannel) -> &'static str {
    match channel {
        ReportChannel::Status => "reportState",
        ReportChannel::Reading(kind) => match kind {
            DeviceKind::ElectricityMeter => "saveElectricityData",
            DeviceKind::WaterMeter => "saveWaterData",
            DeviceKind::TowerCrane => "saveCraneData",
            DeviceKind::Sewage => "saveSewageData",
            DeviceKind::Environment => "saveEnvData",
            DeviceKind::Noise => "saveNoiseData",
            DeviceKind::RfidReader => "checkIn",
            DeviceKind::Elevator => "saveElevatorData",
            DeviceKind::WeighScale | DeviceKind::SmartWeighScale => "saveWeighData",
            DeviceKind::Camera => "saveCameraData",
        },
    }
}

/// 基于 reqwest 的上报写入器。
#[derive(Clone)]
pub struct HttpReportWriter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReportWriter {
    pub fn new(config: HttpReportConfig) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("fieldgw/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ReportError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    pub fn url_for(&self, channel: ReportChannel) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint_path(channel)
        )
    }
}

#[async_trait]
impl ReportWriter for HttpReportWriter {
    async fn write(&self, report: &Report) -> Result<(), ReportError> {
        let mut form = Vec::with_capacity(report.fields.len() + 2);
        form.push(("hardwareId", report.device_id.to_string()));
        for (name, value) in &report.fields {
            form.push((name.as_str(), value.clone()));
        }
        form.push(("time", format_report_time(report.ts_ms)));
        let response = self
            .client
            .post(self.url_for(report.channel))
            .form(&form)
            .send()
            .await
            .map_err(|err| ReportError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Rejected(status.to_string()));
        }
        Ok(())
    }
}

/// 上报时间（本地时区，`%Y-%m-%d %H:%M:%S`）。
pub(crate) fn format_report_time(ts_ms: i64) -> String {
    match Local.timestamp_millis_opt(ts_ms).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts_ms.to_string(),
    }
}
