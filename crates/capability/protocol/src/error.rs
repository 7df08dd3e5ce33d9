//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 对端关闭连接
    #[error("connection closed")]
    Closed,

    /// 数据解码错误
    #[error("decode error: {0}")]
    Decode(String),

    /// 监听失败（端口不可用）
    #[error("listener error: {0}")]
    Listener(String),
}
