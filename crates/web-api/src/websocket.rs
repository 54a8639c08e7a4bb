//! axum websocket 传输适配器

use application::{Frame, Transport, TransportError, TransportReader, TransportWriter};
use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

/// 已完成升级的 axum websocket
pub struct AxumTransport {
    socket: WebSocket,
}

impl AxumTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

pub struct AxumReader {
    incoming: SplitStream<WebSocket>,
}

pub struct AxumWriter {
    sender: SplitSink<WebSocket, WsMessage>,
}

impl Transport for AxumTransport {
    type Reader = AxumReader;
    type Writer = AxumWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sender, incoming) = self.socket.split();
        (AxumReader { incoming }, AxumWriter { sender })
    }
}

#[async_trait]
impl TransportReader for AxumReader {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        let message = match self.incoming.next().await {
            None => return Ok(None),
            Some(Ok(message)) => message,
            // 超出 max_message_size 的帧同样以读错误的形式出现
            Some(Err(err)) => return Err(TransportError::io(err.to_string())),
        };

        let frame = match message {
            WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            WsMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            WsMessage::Ping(bytes) => Frame::Ping(bytes.to_vec()),
            WsMessage::Pong(bytes) => Frame::Pong(bytes.to_vec()),
            WsMessage::Close(_) => Frame::Close,
        };
        Ok(Some(frame))
    }
}

#[async_trait]
impl TransportWriter for AxumWriter {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Ping(bytes) => WsMessage::Ping(bytes.into()),
            Frame::Pong(bytes) => WsMessage::Pong(bytes.into()),
            Frame::Close => WsMessage::Close(None),
        };
        self.sender
            .send(message)
            .await
            .map_err(|err| TransportError::io(err.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sender
            .close()
            .await
            .map_err(|err| TransportError::io(err.to_string()))
    }
}
