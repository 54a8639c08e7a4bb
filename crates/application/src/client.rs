//! 单个连接的 actor
//!
//! 每条连接由两个任务驱动：入站任务读取并处理客户端消息，出站任务独占写半部，
//! 负责排空出站队列和定时发送 ping。无论哪一侧先结束，注销都只在 [`Client::run`]
//! 中发生一次；注销释放出站队列的发送端，出站任务据此发送关闭帧并退出。

use std::sync::Arc;
use std::time::Duration;

use config::ChatSettings;
use domain::{protocol, ClientId, Message};
use tokio::task::JoinError;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::TransportError;
use crate::hub::{ClientHandle, Hub, OutboundQueue, Payload};
use crate::rate_limiter::TokenBucket;
use crate::stats::ChatStats;
use crate::transport::{Frame, Transport, TransportReader, TransportWriter};

/// 单条连接使用的运行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub rate_limit_per_sec: u32,
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub send_buf_size: usize,
    pub max_message_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ChatSettings::default())
    }
}

impl From<&ChatSettings> for SessionSettings {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            rate_limit_per_sec: settings.rate_limit_per_sec,
            ping_interval: Duration::from_secs(settings.ping_interval_secs),
            pong_wait: Duration::from_secs(settings.pong_wait_secs),
            write_wait: Duration::from_secs(settings.write_wait_secs),
            send_buf_size: settings.send_buf_size,
            max_message_size: settings.max_message_size,
        }
    }
}

/// 连接结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 对端发送关闭帧或直接断开
    PeerClosed,
    /// 客户端发送了 leave
    Leave,
    /// 超过读超时没有收到任何帧
    LivenessTimeout,
    ReadFailed(TransportError),
    /// 出站队列被关闭（被 Hub 注销或服务关闭）
    QueueClosed,
    WriteFailed(TransportError),
    /// 相同标识的连接已经存在，或服务已经开始关闭
    Rejected,
    TaskFailed(String),
}

impl CloseReason {
    /// 是否属于正常结束
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            CloseReason::PeerClosed | CloseReason::Leave | CloseReason::QueueClosed
        )
    }
}

pub struct Client {
    id: ClientId,
    hub: Arc<Hub>,
    stats: Arc<ChatStats>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl Client {
    pub fn new(
        id: ClientId,
        hub: Arc<Hub>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let stats = Arc::clone(hub.stats());
        Self {
            id,
            hub,
            stats,
            clock,
            settings,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// 注册到 Hub 并驱动连接直到结束
    pub async fn run<T: Transport>(self, transport: T) -> CloseReason {
        let (reader, mut writer) = transport.split();
        let (handle, queue) = ClientHandle::channel(self.id, self.settings.send_buf_size);

        if !self.hub.register(handle).await {
            let deadline = Instant::now() + self.settings.write_wait;
            let _ = writer.close_with_deadline(deadline).await;
            return CloseReason::Rejected;
        }

        let inbound = Inbound {
            id: self.id,
            user: String::new(),
            hub: Arc::clone(&self.hub),
            stats: Arc::clone(&self.stats),
            clock: Arc::clone(&self.clock),
            bucket: TokenBucket::new(self.settings.rate_limit_per_sec, self.clock.now()),
            pong_wait: self.settings.pong_wait,
            max_message_size: self.settings.max_message_size,
        };
        let outbound = Outbound {
            id: self.id,
            clock: Arc::clone(&self.clock),
            ping_interval: self.settings.ping_interval,
            write_wait: self.settings.write_wait,
        };

        let mut recv_task = tokio::spawn(inbound.run(reader));
        let mut send_task = tokio::spawn(outbound.run(writer, queue));

        let finished = tokio::select! {
            result = &mut recv_task => Finished::Inbound(joined(result)),
            result = &mut send_task => Finished::Outbound(joined(result)),
        };
        self.hub.unregister(self.id).await;

        let reason = match finished {
            Finished::Inbound(reason) => {
                // 等待出站任务发出关闭帧
                if let Err(err) = send_task.await {
                    warn!(client_id = %self.id, error = %err, "send task failed");
                }
                reason
            }
            Finished::Outbound(reason) => {
                recv_task.abort();
                reason
            }
        };

        if reason.is_clean() {
            info!(client_id = %self.id, reason = ?reason, "client disconnected");
        } else {
            warn!(client_id = %self.id, reason = ?reason, "client disconnected");
        }
        reason
    }
}

/// 先结束的一侧
enum Finished {
    Inbound(CloseReason),
    Outbound(CloseReason),
}

fn joined(result: Result<CloseReason, JoinError>) -> CloseReason {
    result.unwrap_or_else(|err| CloseReason::TaskFailed(err.to_string()))
}

/// 入站循环的状态，只在入站任务内使用
struct Inbound {
    id: ClientId,
    user: String,
    hub: Arc<Hub>,
    stats: Arc<ChatStats>,
    clock: Arc<dyn Clock>,
    bucket: TokenBucket,
    pong_wait: Duration,
    max_message_size: usize,
}

impl Inbound {
    async fn run<R: TransportReader>(mut self, mut reader: R) -> CloseReason {
        loop {
            // 每收到一帧都重新计算读超时
            let frame = match timeout(self.pong_wait, reader.receive()).await {
                Err(_) => return CloseReason::LivenessTimeout,
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => return CloseReason::PeerClosed,
                Ok(Err(err)) => return CloseReason::ReadFailed(err),
            };

            let raw = match frame {
                Frame::Text(text) => text,
                Frame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Frame::Ping(_) | Frame::Pong(_) => continue,
                Frame::Close => return CloseReason::PeerClosed,
            };
            if raw.len() > self.max_message_size {
                return CloseReason::ReadFailed(TransportError::FrameTooLarge {
                    limit: self.max_message_size,
                });
            }

            if let Some(reason) = self.handle(raw).await {
                return reason;
            }
        }
    }

    /// 处理一条入站消息，返回 `Some` 表示连接应当结束
    async fn handle(&mut self, raw: String) -> Option<CloseReason> {
        let message = match protocol::decode(raw.as_bytes()) {
            Ok(message) => message,
            Err(err) => {
                debug!(client_id = %self.id, error = %err, "ignoring malformed message");
                return None;
            }
        };

        match message {
            Message::Join { user, .. } => {
                debug!(client_id = %self.id, user = %user, room = domain::ROOM, "client joined");
                self.user = user;
            }
            Message::Chat { .. } => {
                if !self.bucket.allow(self.clock.now()) {
                    self.stats.add_dropped();
                    debug!(client_id = %self.id, user = %self.user, "rate limited, message dropped");
                    return None;
                }
                self.stats.add_message();
                let payload: Payload = Arc::from(raw);
                self.hub.broadcast_except(self.id, payload).await;
            }
            Message::Pong { .. } | Message::Ping { .. } => {}
            Message::Leave { .. } => return Some(CloseReason::Leave),
        }
        None
    }
}

/// 出站循环的状态，独占连接的写半部
struct Outbound {
    id: ClientId,
    clock: Arc<dyn Clock>,
    ping_interval: Duration,
    write_wait: Duration,
}

impl Outbound {
    async fn run<W: TransportWriter>(self, mut writer: W, mut queue: OutboundQueue) -> CloseReason {
        let mut ticker = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                next = queue.recv() => {
                    let Some(payload) = next else {
                        let deadline = Instant::now() + self.write_wait;
                        let _ = writer.send_with_deadline(Frame::Close, deadline).await;
                        break CloseReason::QueueClosed;
                    };
                    let deadline = Instant::now() + self.write_wait;
                    if let Err(err) = writer
                        .send_with_deadline(Frame::Text(payload.to_string()), deadline)
                        .await
                    {
                        break CloseReason::WriteFailed(err);
                    }
                }
                _ = ticker.tick() => {
                    let ping = match protocol::encode_ping(self.clock.unix_millis()) {
                        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                        Err(err) => {
                            warn!(client_id = %self.id, error = %err, "failed to encode ping");
                            continue;
                        }
                    };
                    let deadline = Instant::now() + self.write_wait;
                    if let Err(err) = writer.send_with_deadline(Frame::Text(ping), deadline).await {
                        break CloseReason::WriteFailed(err);
                    }
                }
            }
        };

        let deadline = Instant::now() + self.write_wait;
        if let Err(err) = writer.close_with_deadline(deadline).await {
            debug!(client_id = %self.id, error = %err, "close after send loop failed");
        }
        reason
    }
}
