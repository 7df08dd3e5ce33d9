//! 周期性设备状态上报。

use crate::{Report, ReportSink, now_epoch_ms};
use fieldgw_registry::DeviceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

/// 对注册表做一次全表扫描，每台设备提交一条同时带 `isOk` 与 `state` 的状态。
///
/// 返回本次上报的设备数。
pub fn report_status_once(registry: &DeviceRegistry, sink: &dyn ReportSink) -> usize {
    let devices = registry.snapshot();
    let ts_ms = now_epoch_ms();
    for device in &devices {
        sink.submit(Report::status(device.id, device.command, device.state, ts_ms));
    }
    devices.len()
}

/// 启动状态上报定时任务（首次在一个周期之后触发）。
pub fn spawn_status_reporter(
    registry: Arc<DeviceRegistry>,
    sink: Arc<dyn ReportSink>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let count = report_status_once(&registry, sink.as_ref());
            debug!(target: "fieldgw.report", devices = count, "status_reported");
        }
    })
}
