//! # 设备协议能力模块
//!
//! 设备会话引擎：端口监听、分帧、稳定判定、倒序数值解码与会话状态机。
//!
//! ## 架构设计
//!
//! ```text
//! Discovery ── register + spawn ──▶ ConnectionAcceptor (每台设备一个端口)
//!                                        │ accept → registry.bind
//!                                        ▼
//!                                   driver_for(kind).start_session
//!                                        │
//!                      ┌─────────────────┴─────────────────┐
//!                      ▼                                   ▼
//!               FrameReader (后台任务)  ──mpsc──▶   Session loop
//!                                                     │ StabilityFilter
//!                                                     │ decode_frame
//!                                                     ▼
//!                                              ReportSink / DeviceRegistry
//! ```
//!
//! ## 设备状态
//!
//! ```text
//! offline ── bind ──▶ online ── 空闲超时 ──▶ noData
//!    ▲                  ▲  │                   │
//!    │                  │  └── 读失败超限 / 读任务退出 / 被驱逐 ──▶ offline
//!    │                  └──────── 收到帧 ───────┘
//! ```

mod acceptor;
mod codec;
mod driver;
mod error;
mod frame;
mod session;
mod stability;

pub use acceptor::{AcceptorConfig, ConnectionAcceptor};
pub use codec::{ReversedDecimalCodec, ScaleRule, parse_reversed_decimal, reverse_digits};
pub use driver::{DeviceDriver, LinkMonitorDriver, SessionProfile, WeighScaleDriver, driver_for};
pub use error::ProtocolError;
pub use frame::{FrameBoundary, FrameReader, FrameSpec, MAX_FRAME_LEN};
pub use session::{SessionConfig, SessionContext, SessionOutcome, run_session};
pub use stability::{DEFAULT_STABILITY_THRESHOLD, StabilityFilter};
