//! 网关装配模块
//!
//! 把注册表、上报队列、端口接入、设备发现与状态上报组装成一个运行中的网关，
//! 所有周期任务由 [`Gateway`] 持有，退出时统一中止。

use fieldgw_config::GatewayConfig;
use fieldgw_discovery::{CatalogSource, DeviceLauncher, Discovery, HttpCatalogSource};
use fieldgw_protocol::{AcceptorConfig, ConnectionAcceptor, SessionConfig, SessionContext};
use fieldgw_registry::DeviceRegistry;
use fieldgw_report::{
    DispatchConfig, HttpReportConfig, HttpReportWriter, QueuedSink, ReportSink, ReportWriter,
    spawn_status_reporter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// 运行中的网关。
pub struct Gateway {
    registry: Arc<DeviceRegistry>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Gateway {
    /// 以 HTTP 清单来源与 HTTP 上报启动网关。
    pub fn start(config: &GatewayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let writer = HttpReportWriter::new(HttpReportConfig {
            base_url: config.report_base_url.clone(),
            timeout,
        })?;
        let source = HttpCatalogSource::new(config.catalog_url.clone(), timeout)?;
        Ok(Self::start_with(config, Arc::new(source), Arc::new(writer)))
    }

    /// 以指定的清单来源与上报写入器启动网关。
    pub fn start_with(
        config: &GatewayConfig,
        source: Arc<dyn CatalogSource>,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let (sink, dispatcher) = QueuedSink::spawn(writer, dispatch_config(config));
        let sink: Arc<dyn ReportSink> = Arc::new(sink);

        let ctx = SessionContext::new(registry.clone(), sink.clone(), session_config(config));
        let launcher: Arc<dyn DeviceLauncher> =
            Arc::new(ConnectionAcceptor::new(ctx, acceptor_config(config)));
        let discovery = Arc::new(Discovery::new(source, registry.clone(), launcher));

        let tasks = vec![
            ("report_dispatcher", dispatcher),
            (
                "discovery",
                discovery.spawn(Duration::from_secs(config.discovery_interval_secs)),
            ),
            (
                "status_reporter",
                spawn_status_reporter(
                    registry.clone(),
                    sink,
                    Duration::from_secs(config.status_interval_secs),
                ),
            ),
        ];
        info!(
            target: "fieldgw.gateway",
            catalog_url = %config.catalog_url,
            report_base_url = %config.report_base_url,
            listen_host = %config.listen_host,
            "gateway_started"
        );
        Self { registry, tasks }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// 中止所有周期任务。设备监听与会话随运行时退出而结束。
    pub fn shutdown(self) {
        for (name, task) in self.tasks {
            task.abort();
            info!(target: "fieldgw.gateway", task = name, "task_stopped");
        }
    }
}

pub fn session_config(config: &GatewayConfig) -> SessionConfig {
    SessionConfig {
        idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        max_read_retries: config.max_read_retries,
        stability_threshold: config.stability_threshold,
        frame_channel_capacity: config.frame_channel_capacity,
    }
}

pub fn acceptor_config(config: &GatewayConfig) -> AcceptorConfig {
    AcceptorConfig {
        listen_host: config.listen_host.clone(),
        max_accept_failures: config.max_accept_failures,
        ..AcceptorConfig::default()
    }
}

pub fn dispatch_config(config: &GatewayConfig) -> DispatchConfig {
    DispatchConfig {
        queue_capacity: config.report_queue_capacity,
        max_retries: config.report_max_retries,
        backoff_ms: config.report_backoff_ms,
    }
}
