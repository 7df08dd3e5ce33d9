//! # 设备发现能力模块
//!
//! 定时拉取设备清单：新设备登记到注册表并启动端口监听，已知设备保持不变。
//!
//! ```text
//! CatalogSource::fetch ──▶ Discovery::refresh ──▶ DeviceRegistry::register
//!                                    │                    │ (首次登记)
//!                                    │                    ▼
//!                                    └──────────▶ DeviceLauncher::launch
//! ```
//!
//! 拉取失败只记录日志，等待下一个周期重试。

mod catalog;

use domain::{CatalogEntry, DeviceId, DeviceKind};
use fieldgw_protocol::ConnectionAcceptor;
use fieldgw_registry::DeviceRegistry;
use fieldgw_telemetry::record_discovery_failure;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub use catalog::{CatalogRecord, CatalogSource, HttpCatalogSource, StaticCatalogSource, parse_catalog};

/// 发现错误。
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid catalog payload: {0}")]
    Payload(String),
    #[error("catalog server error {code}: {message}")]
    Server { code: i64, message: String },
}

/// 为新登记的设备启动接入。
pub trait DeviceLauncher: Send + Sync {
    fn launch(&self, id: DeviceId, port: u16, kind: DeviceKind);
}

impl DeviceLauncher for ConnectionAcceptor {
    fn launch(&self, id: DeviceId, port: u16, kind: DeviceKind) {
        // 监听任务与进程同寿命，不保留句柄。
        let _ = self.spawn(id, port, kind);
    }
}

/// 一次刷新的统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// 新登记并已启动监听
    pub registered: usize,
    /// 已存在，跳过
    pub known: usize,
    /// 类型未知或端口非法
    pub skipped: usize,
}

/// 设备发现。
pub struct Discovery {
    source: Arc<dyn CatalogSource>,
    registry: Arc<DeviceRegistry>,
    launcher: Arc<dyn DeviceLauncher>,
}

impl Discovery {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        registry: Arc<DeviceRegistry>,
        launcher: Arc<dyn DeviceLauncher>,
    ) -> Self {
        Self {
            source,
            registry,
            launcher,
        }
    }

    /// 拉取一次清单并登记新设备。
    pub async fn refresh(&self) -> Result<RefreshSummary, DiscoveryError> {
        let records = self.source.fetch().await?;
        let mut summary = RefreshSummary::default();
        for record in records {
            let Some(kind) = DeviceKind::from_code(&record.hardware_code) else {
                summary.skipped += 1;
                warn!(
                    target: "fieldgw.discovery",
                    device_id = record.hardware_id,
                    code = %record.hardware_code,
                    "unknown_device_kind"
                );
                continue;
            };
            let port = match u16::try_from(record.port) {
                Ok(port) if port != 0 => port,
                _ => {
                    summary.skipped += 1;
                    warn!(
                        target: "fieldgw.discovery",
                        device_id = record.hardware_id,
                        port = record.port,
                        "invalid_device_port"
                    );
                    continue;
                }
            };
            let entry = CatalogEntry {
                id: DeviceId(record.hardware_id),
                port,
                code: record.hardware_code,
            };
            if self.registry.register(&entry, kind) {
                self.launcher.launch(entry.id, port, kind);
                summary.registered += 1;
            } else {
                summary.known += 1;
            }
        }
        Ok(summary)
    }

    /// 启动定时刷新任务，首次刷新立即执行。
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.refresh().await {
                    Ok(summary) if summary.registered > 0 => {
                        info!(
                            target: "fieldgw.discovery",
                            registered = summary.registered,
                            known = summary.known,
                            skipped = summary.skipped,
                            devices = self.registry.len(),
                            "catalog_refreshed"
                        );
                    }
                    Ok(summary) => {
                        debug!(
                            target: "fieldgw.discovery",
                            known = summary.known,
                            skipped = summary.skipped,
                            "catalog_unchanged"
                        );
                    }
                    Err(err) => {
                        record_discovery_failure();
                        warn!(target: "fieldgw.discovery", error = %err, "catalog_refresh_failed");
                    }
                }
            }
        })
    }
}
