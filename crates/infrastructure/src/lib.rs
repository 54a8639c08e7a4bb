//! 基础设施层实现。
//!
//! 基于 tokio-tungstenite 的传输适配器，以及直接在 `TcpListener` 上握手的服务循环。

pub mod server;
pub mod websocket;

pub use server::{bind, ServerError, TungsteniteServer};
pub use websocket::{TungsteniteReader, TungsteniteTransport, TungsteniteWriter};
