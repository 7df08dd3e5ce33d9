//! 端口监听
//!
//! 每台设备一个监听任务，监听其声明端口。接入连接后绑定到注册表，
//! 再按设备类型交给对应驱动启动会话。
//!
//! accept 失败按指数退避重试。文件描述符耗尽、对端在握手中断开这类瞬时错误
//! 只退避不计数；其余错误连续达到上限才认为监听不可用。

use crate::driver::driver_for;
use crate::error::ProtocolError;
use crate::session::{SessionContext, SessionOutcome};
use domain::{DeviceId, DeviceKind};
use fieldgw_telemetry::{record_accept_failure, record_listener_failure};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 监听参数。
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    pub listen_host: String,
    /// 连续 accept 失败达到该次数即认为监听不可用
    pub max_accept_failures: u32,
    /// 首次失败后的退避，之后每次翻倍
    pub accept_backoff: Duration,
    pub max_accept_backoff: Duration,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            max_accept_failures: 10,
            accept_backoff: Duration::from_millis(100),
            max_accept_backoff: Duration::from_secs(5),
        }
    }
}

/// 设备连接接入器。
#[derive(Clone)]
pub struct ConnectionAcceptor {
    ctx: SessionContext,
    config: AcceptorConfig,
}

impl ConnectionAcceptor {
    pub fn new(ctx: SessionContext, config: AcceptorConfig) -> Self {
        Self { ctx, config }
    }

    /// 绑定设备声明端口。
    pub async fn listen(&self, port: u16) -> Result<TcpListener, ProtocolError> {
        let addr = format!("{}:{}", self.config.listen_host, port);
        TcpListener::bind(&addr)
            .await
            .map_err(|err| ProtocolError::Listener(format!("{}: {}", addr, err)))
    }

    /// 接入循环。单次 accept 失败只记录并退避；连续的非瞬时失败达到上限时返回错误，
    /// 该设备在进程重启前不可达。
    pub async fn serve(&self, listener: TcpListener, id: DeviceId, kind: DeviceKind) -> ProtocolError {
        let local = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        info!(
            target: "fieldgw.acceptor",
            device_id = %id,
            kind = %kind,
            addr = %local,
            "acceptor_listening"
        );
        let mut failures: u32 = 0;
        let mut streak: u32 = 0;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    failures = 0;
                    streak = 0;
                    self.dispatch(id, kind, stream, peer);
                }
                Err(err) => {
                    streak = streak.saturating_add(1);
                    let transient = is_transient_accept_error(&err);
                    if !transient {
                        failures += 1;
                    }
                    record_accept_failure();
                    let backoff = accept_backoff(
                        self.config.accept_backoff,
                        self.config.max_accept_backoff,
                        streak,
                    );
                    warn!(
                        target: "fieldgw.acceptor",
                        device_id = %id,
                        failures,
                        transient,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "accept_failed"
                    );
                    if failures >= self.config.max_accept_failures {
                        return ProtocolError::Listener(format!(
                            "{}: {} consecutive accept failures, last: {}",
                            local, failures, err
                        ));
                    }
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// 绑定连接并启动会话；设备未登记时丢弃连接。
    pub fn dispatch(
        &self,
        id: DeviceId,
        kind: DeviceKind,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Option<JoinHandle<SessionOutcome>> {
        let binding = self.ctx.registry.bind(id, peer)?;
        info!(
            target: "fieldgw.acceptor",
            device_id = %id,
            peer = %peer,
            generation = binding.lease.generation,
            "connection_bound"
        );
        let driver = driver_for(kind);
        Some(driver.start_session(self.ctx.clone(), stream, binding))
    }

    /// 启动设备的监听任务，持续到监听不可用为止。
    pub fn spawn(&self, id: DeviceId, port: u16, kind: DeviceKind) -> JoinHandle<()> {
        let acceptor = self.clone();
        tokio::spawn(async move {
            let err = match acceptor.listen(port).await {
                Ok(listener) => acceptor.serve(listener, id, kind).await,
                Err(err) => err,
            };
            record_listener_failure();
            error!(
                target: "fieldgw.acceptor",
                device_id = %id,
                port,
                error = %err,
                "listener_unusable"
            );
        })
    }
}

// ENFILE / EMFILE / ENOMEM / ENOBUFS（Linux 编号）
const RESOURCE_EXHAUSTED: [i32; 4] = [23, 24, 12, 105];

/// 资源暂时耗尽或对端在握手阶段断开，都不代表监听本身损坏。
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || err
        .raw_os_error()
        .is_some_and(|code| RESOURCE_EXHAUSTED.contains(&code))
}

/// 第 `streak` 次连续失败后的退避：`base × 2^(streak-1)`，不超过 `max`。
fn accept_backoff(base: Duration, max: Duration, streak: u32) -> Duration {
    let exponent = streak.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}
