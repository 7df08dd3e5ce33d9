//! 倒序 ASCII 数值解码
//!
//! 地磅以倒序模式连续发送读数，个位在前：
//!
//! ```text
//! 线上：.0700000=     取载荷 0700000 → 倒序 0000070 → 70.0
//! ```
//!
//! 缩放按十进制文本逐位定点运算，整数部分乘 10^小数位，再拼上截断后的小数位，
//! 不经过浮点，7 位满量程读数也不会溢出或产生 …9999 的尾数。

use crate::error::ProtocolError;

/// 字节序列倒序。
pub fn reverse_digits(payload: &[u8]) -> Vec<u8> {
    payload.iter().rev().copied().collect()
}

/// 把倒序载荷还原为十进制文本。只接受 ASCII 数字、至多一个小数点与可选的前导负号。
pub fn parse_reversed_decimal(payload: &[u8]) -> Result<String, ProtocolError> {
    let reversed = reverse_digits(payload);
    let text = std::str::from_utf8(&reversed)
        .map_err(|err| ProtocolError::Decode(format!("non ascii payload: {}", err)))?;
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let mut points = 0;
    let mut digits = 0;
    for byte in unsigned.bytes() {
        match byte {
            b'0'..=b'9' => digits += 1,
            b'.' => points += 1,
            _ => return Err(ProtocolError::Decode(format!("{}: invalid digit", text))),
        }
    }
    if digits == 0 || points > 1 {
        return Err(ProtocolError::Decode(format!("{}: not a decimal", text)));
    }
    Ok(text.to_string())
}

/// 定点缩放：`trunc(value × 10^decimals)`，以整数字符串输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleRule {
    pub decimals: u32,
}

impl ScaleRule {
    /// 重量以 1/10000 为单位上报
    pub const WEIGHT: ScaleRule = ScaleRule { decimals: 4 };

    /// 输入须为 [`parse_reversed_decimal`] 校验过的文本；超出 i64 范围时返回解码错误。
    pub fn render(&self, decimal: &str) -> Result<String, ProtocolError> {
        let overflow = || ProtocolError::Decode(format!("{}: out of range", decimal));
        let (negative, unsigned) = match decimal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, decimal),
        };
        let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let mut scaled: i64 = 0;
        for byte in integer.bytes() {
            let next = digit(byte, decimal)?;
            scaled = scaled
                .checked_mul(10)
                .and_then(|v| v.checked_add(next))
                .ok_or_else(overflow)?;
        }
        let mut fraction = fraction.bytes();
        for _ in 0..self.decimals {
            let next = match fraction.next() {
                Some(byte) => digit(byte, decimal)?,
                None => 0,
            };
            scaled = scaled
                .checked_mul(10)
                .and_then(|v| v.checked_add(next))
                .ok_or_else(overflow)?;
        }
        if negative {
            scaled = -scaled;
        }
        Ok(scaled.to_string())
    }
}

fn digit(byte: u8, decimal: &str) -> Result<i64, ProtocolError> {
    if byte.is_ascii_digit() {
        Ok(i64::from(byte - b'0'))
    } else {
        Err(ProtocolError::Decode(format!("{}: invalid digit", decimal)))
    }
}

/// 定宽倒序数值帧的载荷位置与缩放规则。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReversedDecimalCodec {
    /// 载荷前需要跳过的标记字节数
    pub leading_marker: usize,
    /// 载荷后需要去掉的分隔符字节数
    pub trailing_delimiter: usize,
    pub scale: ScaleRule,
}

impl ReversedDecimalCodec {
    /// D39 地磅：去掉分隔符，保留前导小数点（倒序后位于末尾）。
    pub const D39: ReversedDecimalCodec = ReversedDecimalCodec {
        leading_marker: 0,
        trailing_delimiter: 1,
        scale: ScaleRule::WEIGHT,
    };

    /// 智能地磅：去掉起始标记字节与分隔符。
    pub const MARKER_PREFIXED: ReversedDecimalCodec = ReversedDecimalCodec {
        leading_marker: 1,
        trailing_delimiter: 1,
        scale: ScaleRule::WEIGHT,
    };

    pub fn payload<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        let end = frame
            .len()
            .checked_sub(self.trailing_delimiter)
            .filter(|end| *end > self.leading_marker)
            .ok_or_else(|| ProtocolError::Decode(format!("frame too short: {} bytes", frame.len())))?;
        Ok(&frame[self.leading_marker..end])
    }

    /// 解码并按缩放规则输出。
    pub fn decode(&self, frame: &[u8]) -> Result<String, ProtocolError> {
        let decimal = parse_reversed_decimal(self.payload(frame)?)?;
        self.scale.render(&decimal)
    }
}
