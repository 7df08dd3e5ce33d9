//! 现场设备接入网关：设备发现、端口接入、会话解析与上报。

mod gateway;

use fieldgw_config::GatewayConfig;
use fieldgw_telemetry::{init_tracing, metrics};
use gateway::Gateway;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = GatewayConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let gateway = Gateway::start(&config)?;

    tokio::signal::ctrl_c().await?;
    let snapshot = metrics().snapshot();
    info!(
        target: "fieldgw.gateway",
        devices = gateway.registry().len(),
        frames_received = snapshot.frames_received,
        readings_emitted = snapshot.readings_emitted,
        reports_sent = snapshot.reports_sent,
        reports_dropped = snapshot.reports_dropped,
        "shutdown_requested"
    );
    gateway.shutdown();
    Ok(())
}
