//! 协议层错误定义
//!
//! 解码失败对调用方来说是可恢复的（忽略该条消息即可），
//! 而载荷尺寸相关的错误属于配置错误，应尽早暴露。

use thiserror::Error;

/// 协议编解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 输入不是合法的消息信封
    #[error("解码失败: {message}")]
    Decode { message: String },

    /// 信封序列化失败
    #[error("编码失败: {message}")]
    Encode { message: String },

    /// 空文本的 chat 信封已经超过目标尺寸
    #[error("chat 信封开销 {overhead} 字节超过载荷尺寸 {target}")]
    PayloadOverhead { overhead: usize, target: usize },

    /// 定长填充在迭代上限内没有收敛
    #[error("chat 载荷经过 {rounds} 轮仍未收敛到 {target} 字节")]
    PayloadDidNotConverge { target: usize, rounds: usize },
}

impl ProtocolError {
    /// 创建解码错误
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// 创建编码错误
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}
