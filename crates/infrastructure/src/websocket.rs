//! tokio-tungstenite 传输适配器
//!
//! 把 `WebSocketStream` 拆成读写两半，并在 tungstenite 的消息类型与
//! [`application::Frame`] 之间转换。

use application::{Frame, Transport, TransportError, TransportReader, TransportWriter};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

/// 已完成握手的 tungstenite 连接
pub struct TungsteniteTransport<S> {
    stream: WebSocketStream<S>,
    max_message_size: usize,
}

impl<S> TungsteniteTransport<S> {
    pub fn new(stream: WebSocketStream<S>, max_message_size: usize) -> Self {
        Self {
            stream,
            max_message_size,
        }
    }
}

pub struct TungsteniteReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    max_message_size: usize,
}

pub struct TungsteniteWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> Transport for TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = TungsteniteReader<S>;
    type Writer = TungsteniteWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (
            TungsteniteReader {
                stream,
                max_message_size: self.max_message_size,
            },
            TungsteniteWriter { sink },
        )
    }
}

#[async_trait]
impl<S> TransportReader for TungsteniteReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed)) => return Ok(None),
                Some(Err(tungstenite::Error::Capacity(_))) => {
                    return Err(TransportError::FrameTooLarge {
                        limit: self.max_message_size,
                    })
                }
                Some(Err(err)) => return Err(TransportError::io(err.to_string())),
            };

            let frame = match message {
                Message::Text(text) => Frame::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                Message::Ping(bytes) => Frame::Ping(bytes.to_vec()),
                Message::Pong(bytes) => Frame::Pong(bytes.to_vec()),
                Message::Close(_) => Frame::Close,
                // 读取时不会产生原始帧
                Message::Frame(_) => continue,
            };
            return Ok(Some(frame));
        }
    }
}

#[async_trait]
impl<S> TransportWriter for TungsteniteWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(bytes) => Message::binary(bytes),
            Frame::Ping(bytes) => Message::Ping(bytes.into()),
            Frame::Pong(bytes) => Message::Pong(bytes.into()),
            Frame::Close => Message::Close(None),
        };
        self.sink.send(message).await.map_err(map_write_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(map_write_error(err)),
        }
    }
}

fn map_write_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::io(other.to_string()),
    }
}
