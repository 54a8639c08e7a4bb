//! 应用层实现。
//!
//! 连接注册中心（[`Hub`]）、每连接的客户端 actor（[`Client`]）、令牌桶限流、
//! 统计计数，以及对外部 websocket 实现的传输抽象（[`transport`]）。

pub mod client;
pub mod clock;
pub mod error;
pub mod hub;
pub mod rate_limiter;
pub mod service;
pub mod stats;
pub mod transport;

pub use client::{Client, CloseReason, SessionSettings};
pub use clock::{Clock, SystemClock};
pub use error::TransportError;
pub use hub::{ClientHandle, Hub, OutboundQueue, Payload};
pub use rate_limiter::TokenBucket;
pub use service::ChatService;
pub use stats::{ChatStats, StatsSnapshot};
pub use transport::{Frame, Transport, TransportReader, TransportWriter};
