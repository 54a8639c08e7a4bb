//! 公共聊天室核心领域模型
//!
//! 包含线上消息信封、定长 chat 载荷的编解码以及连接标识。

pub mod errors;
pub mod message;
pub mod protocol;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use value_objects::*;
