//! 有界上报队列与后台发送任务。

use crate::{Report, ReportError, ReportSink, ReportWriter};
use fieldgw_telemetry::{record_report_dropped, record_report_failed, record_report_sent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 发送参数。
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub max_retries: u64,
    pub backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_retries: 1,
            backoff_ms: 200,
        }
    }
}

/// 队列式上报入口：`submit` 从不阻塞，队列满时丢弃并计数。
#[derive(Clone)]
pub struct QueuedSink {
    tx: mpsc::Sender<Report>,
}

impl QueuedSink {
    /// 创建队列并启动发送任务。
    pub fn spawn(writer: Arc<dyn ReportWriter>, config: DispatchConfig) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Report>(config.queue_capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                match write_with_retry(writer.as_ref(), &report, config.max_retries, config.backoff_ms)
                    .await
                {
                    Ok(()) => {
                        record_report_sent();
                        debug!(
                            target: "fieldgw.report",
                            device_id = %report.device_id,
                            fields = ?report.fields,
                            "report_sent"
                        );
                    }
                    Err(err) => {
                        record_report_failed();
                        warn!(
                            target: "fieldgw.report",
                            device_id = %report.device_id,
                            channel = ?report.channel,
                            error = %err,
                            "report_failed"
                        );
                    }
                }
            }
        });
        (Self { tx }, handle)
    }
}

impl ReportSink for QueuedSink {
    fn submit(&self, report: Report) {
        match self.tx.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                record_report_dropped();
                warn!(
                    target: "fieldgw.report",
                    device_id = %report.device_id,
                    channel = ?report.channel,
                    "report_queue_full"
                );
            }
            Err(TrySendError::Closed(report)) => {
                record_report_dropped();
                warn!(
                    target: "fieldgw.report",
                    device_id = %report.device_id,
                    channel = ?report.channel,
                    "report_queue_closed"
                );
            }
        }
    }
}

async fn write_with_retry(
    writer: &dyn ReportWriter,
    report: &Report,
    max_retries: u64,
    backoff_ms: u64,
) -> Result<(), ReportError> {
    let mut attempt = 0u64;
    loop {
        match writer.write(report).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(err);
                }
                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}
