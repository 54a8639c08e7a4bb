//! 基于 tokio-tungstenite 的服务循环
//!
//! 每个 TCP 连接先完成 websocket 握手，然后交给 [`ChatService`] 驱动。
//! 握手不检查请求路径。

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use application::ChatService;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, warn};

use crate::websocket::TungsteniteTransport;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// 绑定监听地址
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

pub struct TungsteniteServer {
    service: ChatService,
}

impl TungsteniteServer {
    pub fn new(service: ChatService) -> Self {
        Self { service }
    }

    /// 持续接受连接，直到 `shutdown` 完成
    ///
    /// 停止接受后不会等待已有连接结束，由调用方决定是否调用 [`ChatService::shutdown`]。
    pub async fn run<F>(self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "tungstenite server listening");
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = self.service.clone();
                        tokio::spawn(handle_connection(service, stream, peer));
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                    }
                },
                _ = &mut shutdown => {
                    info!("tungstenite server stopped accepting connections");
                    break;
                }
            }
        }
    }
}

/// 单帧与单条消息都不超过 `limit` 字节
fn websocket_config(limit: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(limit))
        .max_frame_size(Some(limit))
}

async fn handle_connection(service: ChatService, stream: TcpStream, peer: SocketAddr) {
    let limit = service.settings().max_message_size;
    let config = websocket_config(limit);
    let ws = match tokio_tungstenite::accept_async_with_config(stream, Some(config)).await {
        Ok(ws) => ws,
        Err(err) => {
            debug!(%peer, error = %err, "websocket handshake failed");
            return;
        }
    };

    let reason = service
        .serve_connection(TungsteniteTransport::new(ws, limit))
        .await;
    debug!(%peer, reason = ?reason, "connection finished");
}
