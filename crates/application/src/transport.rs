//! 传输抽象
//!
//! 核心逻辑只依赖这里的能力接口：接收一帧、带截止时间发送一帧、关闭。
//! 每种 websocket 实现各自提供一个适配器（axum 位于 `web-api`，
//! tokio-tungstenite 位于 `infrastructure`）。

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::TransportError;

/// 与具体 websocket 库无关的消息帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// 一条已升级的双向连接，拆分为独立的读写两半
pub trait Transport: Send + 'static {
    type Reader: TransportReader + 'static;
    type Writer: TransportWriter + 'static;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 连接的读半部
#[async_trait]
pub trait TransportReader: Send {
    /// 阻塞直到收到一帧
    ///
    /// `Ok(None)` 表示对端正常关闭，`Err` 表示异常断开。
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// 连接的写半部，同一时刻只允许一个写者
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TransportWriter: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    /// 在绝对截止时间前完成发送，超时视为写失败
    async fn send_with_deadline(
        &mut self,
        frame: Frame,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        match tokio::time::timeout_at(deadline, self.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::WriteTimeout),
        }
    }

    /// 在绝对截止时间前完成关闭
    ///
    /// 关闭需要先刷出缓冲区，对端不读时可能一直挂起。
    async fn close_with_deadline(&mut self, deadline: Instant) -> Result<(), TransportError> {
        match tokio::time::timeout_at(deadline, self.close()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::WriteTimeout),
        }
    }
}

/// 基于内存 channel 的传输实现，供测试驱动客户端 actor
#[cfg(any(test, feature = "testing"))]
pub mod memory {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Frame, Transport, TransportReader, TransportWriter};
    use crate::error::TransportError;

    /// 服务端一侧看到的连接
    pub struct MemoryTransport {
        reader: MemoryReader,
        writer: MemoryWriter,
    }

    pub struct MemoryReader {
        inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    }

    pub struct MemoryWriter {
        outbound: Option<mpsc::UnboundedSender<Frame>>,
    }

    /// 测试一侧持有的对端
    pub struct MemoryPeer {
        inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        outbound: mpsc::UnboundedReceiver<Frame>,
    }

    /// 创建一对互相连接的内存传输
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                reader: MemoryReader {
                    inbound: inbound_rx,
                },
                writer: MemoryWriter {
                    outbound: Some(outbound_tx),
                },
            },
            MemoryPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }

    impl Transport for MemoryTransport {
        type Reader = MemoryReader;
        type Writer = MemoryWriter;

        fn split(self) -> (Self::Reader, Self::Writer) {
            (self.reader, self.writer)
        }
    }

    #[async_trait]
    impl TransportReader for MemoryReader {
        async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
            match self.inbound.recv().await {
                Some(Ok(Frame::Close)) | None => Ok(None),
                Some(Ok(frame)) => Ok(Some(frame)),
                Some(Err(err)) => Err(err),
            }
        }
    }

    #[async_trait]
    impl TransportWriter for MemoryWriter {
        async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
            let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
            outbound.send(frame).map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.outbound.take();
            Ok(())
        }
    }

    impl MemoryPeer {
        pub fn send_text(&self, text: impl Into<String>) {
            let _ = self.inbound.send(Ok(Frame::Text(text.into())));
        }

        pub fn send_frame(&self, frame: Frame) {
            let _ = self.inbound.send(Ok(frame));
        }

        /// 模拟异常断开
        pub fn fail(&self, err: TransportError) {
            let _ = self.inbound.send(Err(err));
        }

        /// 等待服务端写出的下一帧，写半部关闭后返回 `None`
        pub async fn next_frame(&mut self) -> Option<Frame> {
            self.outbound.recv().await
        }

        /// 非阻塞地取出服务端已写出的帧
        pub fn try_next_frame(&mut self) -> Option<Frame> {
            self.outbound.try_recv().ok()
        }
    }
}
