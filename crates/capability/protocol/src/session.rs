//! 设备会话
//!
//! 每条设备连接对应一个会话：后台读帧任务把帧（或读错误）经有界通道送给
//! 前台循环，前台循环同时等待帧、读任务状态、驱逐信号与空闲定时器。
//!
//! ```text
//! socket ──▶ reader task ──(mpsc, 容量 10)──▶ session loop ──▶ ReportSink
//!               │                                 │
//!               └──── watch(bool) 状态 ──────────▶│◀── evicted (oneshot)
//!                                                 │◀── idle timer
//!                                                 ▼
//!                                           DeviceRegistry
//! ```
//!
//! 空闲定时器只由前台循环重置，读任务从不触碰。

use crate::driver::DeviceDriver;
use crate::error::ProtocolError;
use crate::frame::FrameReader;
use crate::stability::{DEFAULT_STABILITY_THRESHOLD, StabilityFilter};
use fieldgw_registry::{Binding, DeviceRegistry};
use fieldgw_report::{Report, ReportSink, now_epoch_ms};
use fieldgw_telemetry::{
    new_session_id, record_decode_failure, record_idle_timeout, record_read_failure,
    record_reading_emitted, record_session_closed, record_session_started,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, info, info_span, warn};

/// 会话参数。
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 超过该时长没有帧则视为设备无数据
    pub idle_timeout: Duration,
    /// 连续读失败的容忍次数，超过即断开
    pub max_read_retries: u32,
    pub stability_threshold: u32,
    pub frame_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5),
            max_read_retries: 3,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            frame_channel_capacity: 10,
        }
    }
}

/// 会话运行所需的共享依赖。
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<DeviceRegistry>,
    pub sink: Arc<dyn ReportSink>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(registry: Arc<DeviceRegistry>, sink: Arc<dyn ReportSink>, config: SessionConfig) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }
}

/// 会话结束原因。三种情况下设备都回到离线。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// 连续读失败超过上限
    RetriesExhausted,
    /// 读任务退出（对端关闭或状态通道报告 false）
    ReaderStopped,
    /// 绑定被新连接替换或被解除
    Evicted,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::RetriesExhausted => "retries_exhausted",
            SessionOutcome::ReaderStopped => "reader_stopped",
            SessionOutcome::Evicted => "evicted",
        }
    }
}

/// 运行一个设备会话直到结束，并在退出时释放绑定。
pub async fn run_session<S>(
    ctx: SessionContext,
    stream: S,
    binding: Binding,
    driver: Arc<dyn DeviceDriver>,
) -> SessionOutcome
where
    S: AsyncRead + Unpin + Send + 'static,
{
    let span = info_span!(
        "device_session",
        session_id = %new_session_id(),
        device_id = %binding.lease.device_id,
        kind = %driver.kind(),
        peer = %binding.peer,
    );
    drive(ctx, stream, binding, driver).instrument(span).await
}

async fn drive<S>(
    ctx: SessionContext,
    stream: S,
    binding: Binding,
    driver: Arc<dyn DeviceDriver>,
) -> SessionOutcome
where
    S: AsyncRead + Unpin + Send + 'static,
{
    let Binding {
        lease,
        peer: _,
        mut evicted,
    } = binding;
    let device_id = lease.device_id;
    let profile = driver.profile();
    let config = &ctx.config;

    record_session_started();
    info!(target: "fieldgw.session", "session_started");

    let (frame_tx, mut frames) =
        mpsc::channel::<Result<Vec<u8>, ProtocolError>>(config.frame_channel_capacity.max(1));
    let (status_tx, mut status) = watch::channel(true);
    let reader = tokio::spawn(
        read_frames(FrameReader::new(stream, profile.frame), frame_tx, status_tx).in_current_span(),
    );

    let mut filter = StabilityFilter::new(config.stability_threshold);
    let mut failures: u32 = 0;
    let idle = sleep(config.idle_timeout);
    tokio::pin!(idle);

    let outcome = loop {
        tokio::select! {
            biased;

            _ = &mut evicted => break SessionOutcome::Evicted,

            next = frames.recv() => match next {
                Some(Ok(frame)) => {
                    failures = 0;
                    idle.as_mut().reset(Instant::now() + config.idle_timeout);
                    ctx.registry.mark_command_ok(&lease);
                    if profile.reports && filter.observe(&frame) {
                        emit_reading(&ctx, driver.as_ref(), device_id, &frame);
                    }
                }
                Some(Err(err)) => {
                    failures += 1;
                    record_read_failure();
                    if failures > config.max_read_retries {
                        warn!(
                            target: "fieldgw.session",
                            failures,
                            error = %err,
                            "read_retries_exhausted"
                        );
                        break SessionOutcome::RetriesExhausted;
                    }
                    warn!(
                        target: "fieldgw.session",
                        failures,
                        error = %err,
                        "read_failed_retrying"
                    );
                }
                None => break SessionOutcome::ReaderStopped,
            },

            changed = status.changed() => {
                if changed.is_err() || !*status.borrow() {
                    break SessionOutcome::ReaderStopped;
                }
            }

            _ = &mut idle, if profile.watch_idle => {
                record_idle_timeout();
                ctx.registry.mark_command_failure(&lease);
                warn!(
                    target: "fieldgw.session",
                    timeout_ms = config.idle_timeout.as_millis() as u64,
                    "device_idle"
                );
                idle.as_mut().reset(Instant::now() + config.idle_timeout);
            }
        }
    };

    reader.abort();
    let released = ctx.registry.release(&lease);
    record_session_closed();
    info!(
        target: "fieldgw.session",
        outcome = outcome.as_str(),
        released,
        "session_closed"
    );
    outcome
}

fn emit_reading(ctx: &SessionContext, driver: &dyn DeviceDriver, device_id: domain::DeviceId, frame: &[u8]) {
    match driver.decode_frame(frame) {
        Ok(value) => {
            let ts_ms = now_epoch_ms();
            ctx.registry.record_reading(device_id, &value, ts_ms);
            record_reading_emitted();
            info!(
                target: "fieldgw.session",
                metric = driver.metric(),
                value = %value,
                "reading_emitted"
            );
            ctx.sink.submit(Report::reading(
                device_id,
                driver.kind(),
                driver.metric(),
                value,
                ts_ms,
            ));
        }
        Err(err) => {
            record_decode_failure();
            warn!(
                target: "fieldgw.session",
                frame = %String::from_utf8_lossy(frame),
                error = %err,
                "decode_failed"
            );
        }
    }
}

/// 后台读帧：帧与读错误都交给会话，对端关闭或会话不再接收时退出，
/// 退出前在状态通道上发布 false。
async fn read_frames<R>(
    mut reader: FrameReader<R>,
    frames: mpsc::Sender<Result<Vec<u8>, ProtocolError>>,
    status: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = match reader.next_frame().await {
            Err(ProtocolError::Closed) => {
                debug!(target: "fieldgw.session", "peer_closed");
                break;
            }
            next => next,
        };
        if frames.send(next).await.is_err() {
            break;
        }
    }
    let _ = status.send(false);
}
