//! 设备驱动
//!
//! 设备类型是封闭枚举 [`DeviceKind`]，每种类型通过 [`driver_for`] 映射到一个
//! 实现 [`DeviceDriver`] 的驱动。新增设备类型时扩展枚举并在此处补一个分支。

use crate::codec::ReversedDecimalCodec;
use crate::error::ProtocolError;
use crate::frame::FrameSpec;
use crate::session::{SessionContext, SessionOutcome, run_session};
use domain::DeviceKind;
use fieldgw_registry::Binding;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// 会话形态：分帧方式、是否启用空闲检测、是否上报读数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProfile {
    pub frame: FrameSpec,
    pub watch_idle: bool,
    pub reports: bool,
}

/// 设备驱动能力。
pub trait DeviceDriver: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// 读数上报使用的指标名
    fn metric(&self) -> &'static str;

    fn profile(&self) -> SessionProfile;

    /// 把一条稳定帧解码为规范化读数。
    fn decode_frame(&self, frame: &[u8]) -> Result<String, ProtocolError>;

    /// 在新任务中运行该连接的会话。
    fn start_session(
        self: Arc<Self>,
        ctx: SessionContext,
        stream: TcpStream,
        binding: Binding,
    ) -> JoinHandle<SessionOutcome>;
}

const WEIGHT_FRAME: FrameSpec = FrameSpec::delimited(b'=', Some(9));

/// 地磅驱动（连续广播、倒序数值）。
#[derive(Debug, Clone)]
pub struct WeighScaleDriver {
    kind: DeviceKind,
    codec: ReversedDecimalCodec,
}

impl WeighScaleDriver {
    /// D39 封装：载荷为帧去掉分隔符。
    pub fn d39() -> Self {
        Self {
            kind: DeviceKind::WeighScale,
            codec: ReversedDecimalCodec::D39,
        }
    }

    /// 智能地磅：载荷前多一个标记字节。
    pub fn marker_prefixed() -> Self {
        Self {
            kind: DeviceKind::SmartWeighScale,
            codec: ReversedDecimalCodec::MARKER_PREFIXED,
        }
    }
}

impl DeviceDriver for WeighScaleDriver {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn metric(&self) -> &'static str {
        "weight"
    }

    fn profile(&self) -> SessionProfile {
        SessionProfile {
            frame: WEIGHT_FRAME,
            watch_idle: true,
            reports: true,
        }
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<String, ProtocolError> {
        self.codec.decode(frame)
    }

    fn start_session(
        self: Arc<Self>,
        ctx: SessionContext,
        stream: TcpStream,
        binding: Binding,
    ) -> JoinHandle<SessionOutcome> {
        tokio::spawn(run_session(ctx, stream, binding, self))
    }
}

/// 链路监视驱动：只维持在线/离线，不解析读数。
///
/// 用于尚未接入读数解析的设备类型，连接建立即在线，断开即离线。
#[derive(Debug, Clone)]
pub struct LinkMonitorDriver {
    kind: DeviceKind,
}

impl LinkMonitorDriver {
    pub fn new(kind: DeviceKind) -> Self {
        Self { kind }
    }
}

impl DeviceDriver for LinkMonitorDriver {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn metric(&self) -> &'static str {
        "raw"
    }

    fn profile(&self) -> SessionProfile {
        SessionProfile {
            frame: FrameSpec::delimited(b'\n', None),
            watch_idle: false,
            reports: false,
        }
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<String, ProtocolError> {
        let text = std::str::from_utf8(frame)
            .map_err(|err| ProtocolError::Decode(err.to_string()))?;
        Ok(text.trim_end().to_string())
    }

    fn start_session(
        self: Arc<Self>,
        ctx: SessionContext,
        stream: TcpStream,
        binding: Binding,
    ) -> JoinHandle<SessionOutcome> {
        tokio::spawn(run_session(ctx, stream, binding, self))
    }
}

/// 按设备类型选择驱动。
pub fn driver_for(kind: DeviceKind) -> Arc<dyn DeviceDriver> {
    match kind {
        DeviceKind::WeighScale => Arc::new(WeighScaleDriver::d39()),
        DeviceKind::SmartWeighScale => Arc::new(WeighScaleDriver::marker_prefixed()),
        other => Arc::new(LinkMonitorDriver::new(other)),
    }
}
