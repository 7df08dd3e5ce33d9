//! 帧读取
//!
//! 从字节流中按分隔符（或固定长度）切出原始帧。长度不符的帧视为损坏，
//! 直接丢弃，不作为错误上报；读失败原样返回，由会话决定重试策略。
//!
//! 单帧缓冲不超过帧宽（未声明帧宽时为 [`MAX_FRAME_LEN`]）。对端持续发送不含
//! 分隔符的字节时，只保留最近的一个帧宽，超出部分计为一次丢弃，分隔符到达后
//! 窗口末尾若恰好是一帧仍可正常取出。

use crate::error::ProtocolError;
use fieldgw_telemetry::{record_frame_discarded, record_frame_received};
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::debug;

/// 未声明帧宽时单帧的最大字节数（含分隔符）。
pub const MAX_FRAME_LEN: usize = 4096;

/// 帧边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBoundary {
    /// 以指定字节结尾（帧包含该字节）
    Delimiter(u8),
    /// 固定字节数
    FixedLength(usize),
}

/// 帧格式：边界 + 期望帧宽（含分隔符）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub boundary: FrameBoundary,
    pub frame_len: Option<usize>,
}

impl FrameSpec {
    pub const fn delimited(delimiter: u8, frame_len: Option<usize>) -> Self {
        Self {
            boundary: FrameBoundary::Delimiter(delimiter),
            frame_len,
        }
    }

    pub const fn fixed(frame_len: usize) -> Self {
        Self {
            boundary: FrameBoundary::FixedLength(frame_len),
            frame_len: Some(frame_len),
        }
    }

    /// 单帧缓冲上限。
    pub fn max_len(&self) -> usize {
        self.frame_len.unwrap_or(MAX_FRAME_LEN).max(1)
    }

    /// 帧是否完整且宽度正确。
    pub fn accepts(&self, frame: &[u8]) -> bool {
        if let FrameBoundary::Delimiter(delimiter) = self.boundary {
            if frame.last() != Some(&delimiter) {
                return false;
            }
        }
        match self.frame_len {
            Some(len) => frame.len() == len,
            None => !frame.is_empty(),
        }
    }
}

/// 帧读取器，每次调用 `next_frame` 读取下一帧。
pub struct FrameReader<R> {
    reader: BufReader<R>,
    spec: FrameSpec,
    discarded: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, spec: FrameSpec) -> Self {
        Self {
            reader: BufReader::new(inner),
            spec,
            discarded: 0,
        }
    }

    /// 已丢弃的坏帧数量。
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// 读取下一条合法帧。对端关闭时返回 `ProtocolError::Closed`。
    pub async fn next_frame(&mut self) -> Result<Vec<u8>, ProtocolError> {
        loop {
            let (frame, dropped) = self.read_raw().await?;
            if dropped > 0 {
                self.discarded += 1;
                record_frame_discarded();
                debug!(dropped, cap = self.spec.max_len(), "frame_overflow");
                // 不定宽帧被截断后已不完整
                if self.spec.frame_len.is_none() {
                    continue;
                }
            }
            if self.spec.accepts(&frame) {
                record_frame_received();
                return Ok(frame);
            }
            self.discarded += 1;
            record_frame_discarded();
            debug!(
                frame = %String::from_utf8_lossy(&frame),
                len = frame.len(),
                "frame_discarded"
            );
        }
    }

    /// 返回原始帧与因超出上限被丢掉的前缀字节数。
    async fn read_raw(&mut self) -> Result<(Vec<u8>, usize), ProtocolError> {
        match self.spec.boundary {
            FrameBoundary::Delimiter(delimiter) => self.read_delimited(delimiter).await,
            FrameBoundary::FixedLength(len) => {
                let mut buf = vec![0u8; len];
                match self.reader.read_exact(&mut buf).await {
                    Ok(_) => Ok((buf, 0)),
                    Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(ProtocolError::Closed),
                    Err(err) => Err(ProtocolError::Io(err)),
                }
            }
        }
    }

    async fn read_delimited(&mut self, delimiter: u8) -> Result<(Vec<u8>, usize), ProtocolError> {
        let cap = self.spec.max_len();
        let mut buf = Vec::with_capacity(cap.min(64));
        let mut dropped = 0usize;
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if buf.is_empty() && dropped == 0 {
                    return Err(ProtocolError::Closed);
                }
                // 对端关闭前残留的半帧，交给调用方丢弃
                return Ok((buf, dropped));
            }
            let (used, complete) = match available.iter().position(|byte| *byte == delimiter) {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            buf.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            if buf.len() > cap {
                let excess = buf.len() - cap;
                buf.drain(..excess);
                dropped += excess;
            }
            if complete {
                return Ok((buf, dropped));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_delimited_frames_and_drops_wrong_width() {
        let input: &[u8] = b".0600000=.07=.0700000=";
        let mut reader = FrameReader::new(input, FrameSpec::delimited(b'=', Some(9)));
        assert_eq!(reader.next_frame().await.expect("first"), b".0600000=");
        assert_eq!(reader.next_frame().await.expect("second"), b".0700000=");
        assert_eq!(reader.discarded(), 1);
        assert!(matches!(
            reader.next_frame().await,
            Err(ProtocolError::Closed)
        ));
    }

    #[tokio::test]
    async fn trailing_partial_frame_is_discarded() {
        let input: &[u8] = b".0600000=123456789";
        let mut reader = FrameReader::new(input, FrameSpec::delimited(b'=', Some(9)));
        assert_eq!(reader.next_frame().await.expect("frame"), b".0600000=");
        assert!(matches!(
            reader.next_frame().await,
            Err(ProtocolError::Closed)
        ));
        assert_eq!(reader.discarded(), 1);
    }

    #[tokio::test]
    async fn long_run_without_delimiter_still_yields_following_frame() {
        let mut input = vec![b'7'; 8 * 1024 * 1024];
        input.extend_from_slice(b".0700000=.0700000=");
        let mut reader = FrameReader::new(input.as_slice(), FrameSpec::delimited(b'=', Some(9)));
        assert_eq!(reader.next_frame().await.expect("first"), b".0700000=");
        assert_eq!(reader.next_frame().await.expect("second"), b".0700000=");
        assert_eq!(reader.discarded(), 1);
        assert!(matches!(
            reader.next_frame().await,
            Err(ProtocolError::Closed)
        ));
    }

    #[tokio::test]
    async fn overlong_line_is_dropped_when_width_is_unbounded() {
        let mut input = vec![b'x'; MAX_FRAME_LEN * 3];
        input.extend_from_slice(b"\nok\n");
        let mut reader = FrameReader::new(input.as_slice(), FrameSpec::delimited(b'\n', None));
        assert_eq!(reader.next_frame().await.expect("line"), b"ok\n");
        assert_eq!(reader.discarded(), 1);
    }

    #[tokio::test]
    async fn reads_fixed_length_frames() {
        let input: &[u8] = b"ABCDEFGH12";
        let mut reader = FrameReader::new(input, FrameSpec::fixed(4));
        assert_eq!(reader.next_frame().await.expect("first"), b"ABCD");
        assert_eq!(reader.next_frame().await.expect("second"), b"EFGH");
        assert!(matches!(
            reader.next_frame().await,
            Err(ProtocolError::Closed)
        ));
    }

    #[test]
    fn unbounded_width_accepts_any_terminated_frame() {
        let spec = FrameSpec::delimited(b'\n', None);
        assert!(spec.accepts(b"x\n"));
        assert!(spec.accepts(b"\n"));
        assert!(!spec.accepts(b"x"));
    }
}
