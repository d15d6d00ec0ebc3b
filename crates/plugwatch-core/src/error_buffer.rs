//! 错误通道
//!
//! 任何失败的会话操作都把格式化后的错误消息写入这里，调用方在收到失败信号后读取。
//! 消息长度有上限，超长部分在 UTF-8 字符边界处截断，因此始终是合法字符串。

use parking_lot::Mutex;
use std::fmt;

/// 错误缓冲区容量（字节，含结尾保留位）
pub const ERROR_BUFFER_CAPACITY: usize = 256;

/// 固定容量的最近错误消息
#[derive(Debug, Default)]
pub struct ErrorBuffer {
    message: Mutex<String>,
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入错误消息（覆盖之前的内容）
    pub fn set(&self, message: impl fmt::Display) {
        let mut formatted = message.to_string();
        truncate_on_char_boundary(&mut formatted, ERROR_BUFFER_CAPACITY - 1);
        *self.message.lock() = formatted;
    }

    pub fn clear(&self) {
        self.message.lock().clear();
    }

    /// 最近的错误消息（无错误时为空字符串）
    pub fn get(&self) -> String {
        self.message.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.message.lock().is_empty()
    }
}

fn truncate_on_char_boundary(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let buffer = ErrorBuffer::new();
        assert!(buffer.is_empty());

        buffer.set(format_args!("{} failed", "udev_new()"));
        assert_eq!(buffer.get(), "udev_new() failed");

        buffer.clear();
        assert_eq!(buffer.get(), "");
    }

    #[test]
    fn test_long_message_is_truncated() {
        let buffer = ErrorBuffer::new();
        buffer.set("x".repeat(1000));
        assert_eq!(buffer.get().len(), ERROR_BUFFER_CAPACITY - 1);
    }

    #[test]
    fn test_truncation_respects_utf8_boundary() {
        let buffer = ErrorBuffer::new();
        // 每个字符 3 字节，255 恰好是 85 个字符
        buffer.set("设".repeat(200));
        let message = buffer.get();
        assert_eq!(message.len(), 255);
        assert!(message.chars().all(|c| c == '设'));

        // 254 字节的前缀 + 多字节字符跨越边界
        let mut s = "a".repeat(254);
        s.push('设');
        buffer.set(s);
        assert_eq!(buffer.get(), "a".repeat(254));
    }
}
