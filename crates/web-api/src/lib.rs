//! Web API 层。
//!
//! 提供 Axum 路由：`/ws` 升级为 websocket 并交给应用层的 [`application::ChatService`]，
//! `/health` 与 `/stats` 用于探活和查看统计。

mod error;
mod routes;
mod state;
mod websocket;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use websocket::{AxumReader, AxumTransport, AxumWriter};
