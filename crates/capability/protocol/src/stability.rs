//! 读数稳定判定
//!
//! 广播类设备即使读数不变也会持续重发，原始流抖动大。只有同一帧连续重复
//! 超过阈值次数才认为读数稳定，允许上报。

/// 现场协议观测到的默认阈值。
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 5;

/// 连续重复帧计数器。
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    previous: Option<Vec<u8>>,
    repeat_count: u32,
    threshold: u32,
}

impl StabilityFilter {
    pub fn new(threshold: u32) -> Self {
        Self {
            previous: None,
            repeat_count: 0,
            threshold,
        }
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn previous(&self) -> Option<&[u8]> {
        self.previous.as_deref()
    }

    /// 观察一帧，返回本帧是否应当上报。
    ///
    /// 上报后计数清零但保留上一帧，读数持续不变时每累计满一轮重复再上报一次。
    pub fn observe(&mut self, frame: &[u8]) -> bool {
        let repeated = self.previous.as_deref() == Some(frame);
        let mut emit = false;
        if repeated {
            self.repeat_count += 1;
            if self.repeat_count > self.threshold {
                self.repeat_count = 0;
                emit = true;
            }
        } else {
            self.repeat_count = 0;
            self.previous = Some(frame.to_vec());
        }
        emit
    }
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_THRESHOLD)
    }
}
