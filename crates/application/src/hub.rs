//! 连接注册中心
//!
//! Hub 是"谁能收到广播"的唯一事实来源。成员表由读写锁保护：注册/注销取写锁，
//! 扇出取读锁并对每个接收方使用非阻塞的 `try_send`，队列满了只丢弃该接收方的这一条，
//! 既不阻塞发送方，也不影响其他接收方。
//!
//! 每个成员的出站队列只有一个发送端，并且由 Hub 独占持有。
//! 从成员表移除即释放该发送端，队列随之关闭；第二次移除找不到任何东西，
//! 因此队列恰好关闭一次。
//!
//! [`Hub::close_all`] 之后 Hub 进入关闭状态，之后的注册一律拒绝，
//! 关闭期间才完成握手的连接不会再漏进成员表。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use domain::ClientId;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::stats::ChatStats;

/// 出站队列中的原始消息
pub type Payload = Arc<str>;

/// 注册到 Hub 的成员：连接标识加上出站队列的发送端
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    sender: mpsc::Sender<Payload>,
}

/// 出站队列的接收端，由连接的出站循环持有
pub type OutboundQueue = mpsc::Receiver<Payload>;

impl ClientHandle {
    /// 创建容量为 `capacity` 的出站队列
    pub fn channel(id: ClientId, capacity: usize) -> (Self, OutboundQueue) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// 非阻塞投递，成功返回 `true`
    fn deliver(&self, payload: &Payload, stats: &ChatStats) -> bool {
        match self.sender.try_send(Arc::clone(payload)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                stats.add_fanout_dropped();
                debug!(client_id = %self.id, "outbound queue full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                stats.add_fanout_dropped();
                debug!(client_id = %self.id, "outbound queue closed, message dropped");
                false
            }
        }
    }
}

pub struct Hub {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
    /// 只在持有写锁时修改
    closed: AtomicBool,
    stats: Arc<ChatStats>,
}

impl Hub {
    pub fn new(stats: Arc<ChatStats>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<ChatStats> {
        &self.stats
    }

    /// 加入成员表
    ///
    /// 同一标识重复注册，或 Hub 已经关闭时，拒绝并返回 `false`，计数不变。
    pub async fn register(&self, handle: ClientHandle) -> bool {
        let id = handle.id;
        let total = {
            let mut clients = self.clients.write().await;
            if self.closed.load(Ordering::Acquire) {
                debug!(client_id = %id, "hub closed, registration refused");
                return false;
            }
            if clients.contains_key(&id) {
                warn!(client_id = %id, "client already registered");
                return false;
            }
            clients.insert(id, handle);
            clients.len()
        };

        self.stats.add_connection();
        info!(client_id = %id, total, "client registered");
        true
    }

    /// 从成员表移除并关闭其出站队列
    ///
    /// 幂等：成员不存在时什么也不做并返回 `false`，不会重复关闭队列或重复递减计数。
    pub async fn unregister(&self, id: ClientId) -> bool {
        let (removed, total) = {
            let mut clients = self.clients.write().await;
            let removed = clients.remove(&id);
            (removed, clients.len())
        };

        match removed {
            Some(handle) => {
                // 发送端在这里释放，出站循环随即观察到队列关闭
                drop(handle);
                self.stats.remove_connection();
                info!(client_id = %id, total, "client unregistered");
                true
            }
            None => {
                debug!(client_id = %id, "client already unregistered");
                false
            }
        }
    }

    /// 投递给除 `sender` 以外的所有成员，返回成功投递的数量
    pub async fn broadcast_except(&self, sender: ClientId, payload: Payload) -> usize {
        let clients = self.clients.read().await;
        clients
            .values()
            .filter(|client| client.id != sender)
            .filter(|client| client.deliver(&payload, &self.stats))
            .count()
    }

    /// 投递给所有成员，返回成功投递的数量
    pub async fn broadcast(&self, payload: Payload) -> usize {
        let clients = self.clients.read().await;
        clients
            .values()
            .filter(|client| client.deliver(&payload, &self.stats))
            .count()
    }

    /// 注销全部成员并拒绝之后的注册，用于服务关闭
    pub async fn close_all(&self) -> usize {
        let drained: Vec<ClientHandle> = {
            let mut clients = self.clients.write().await;
            self.closed.store(true, Ordering::Release);
            clients.drain().map(|(_, handle)| handle).collect()
        };

        let count = drained.len();
        for handle in drained {
            debug!(client_id = %handle.id, "closing client");
            self.stats.remove_connection();
        }
        if count > 0 {
            info!(count, "closed all clients");
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SEND_BUF_SIZE: usize = 64;

    fn new_hub() -> Hub {
        Hub::new(Arc::new(ChatStats::new()))
    }

    async fn join(hub: &Hub) -> (ClientId, OutboundQueue) {
        let id = ClientId::generate();
        let (handle, queue) = ClientHandle::channel(id, SEND_BUF_SIZE);
        assert!(hub.register(handle).await);
        (id, queue)
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = new_hub();
        let mut members = Vec::new();
        for _ in 0..5 {
            members.push(join(&hub).await);
        }
        assert_eq!(hub.len().await, 5);

        assert!(hub.unregister(members[0].0).await);
        assert!(hub.unregister(members[1].0).await);
        assert_eq!(hub.len().await, 3);
        assert_eq!(hub.stats().active_connections(), 3);

        // 重复注销是空操作
        assert!(!hub.unregister(members[0].0).await);
        assert_eq!(hub.len().await, 3);
        assert_eq!(hub.stats().active_connections(), 3);
        assert_eq!(hub.stats().total_connections(), 5);
        assert_eq!(hub.stats().total_disconnects(), 2);
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let hub = new_hub();
        let (id, mut queue) = join(&hub).await;

        hub.unregister(id).await;
        assert_eq!(queue.recv().await, None);
        assert!(!hub.contains(id).await);
    }

    #[tokio::test]
    async fn test_duplicate_register_is_rejected() {
        let hub = new_hub();
        let (id, _queue) = join(&hub).await;

        let (duplicate, _other) = ClientHandle::channel(id, SEND_BUF_SIZE);
        assert!(!hub.register(duplicate).await);
        assert_eq!(hub.len().await, 1);
        assert_eq!(hub.stats().total_connections(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_others() {
        let hub = new_hub();
        let (sender, mut sender_queue) = join(&hub).await;
        let (_, mut queue_two) = join(&hub).await;
        let (_, mut queue_three) = join(&hub).await;

        let payload: Payload = Arc::from(r#"{"type":"chat","user":"c1","text":"hello"}"#);
        let delivered = hub.broadcast_except(sender, Arc::clone(&payload)).await;
        assert_eq!(delivered, 2);

        for queue in [&mut queue_two, &mut queue_three] {
            let received = timeout(Duration::from_millis(100), queue.recv())
                .await
                .expect("broadcast should arrive")
                .expect("queue should be open");
            assert_eq!(received, payload);
        }

        assert!(sender_queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let hub = new_hub();
        let (sender, _sender_queue) = join(&hub).await;
        let (slow, mut slow_queue) = join(&hub).await;
        let (_, mut fast_queue) = join(&hub).await;

        // 预先填满慢接收方的队列
        for i in 0..SEND_BUF_SIZE {
            let handle_payload: Payload = Arc::from(format!("filler-{i}"));
            let clients = hub.clients.read().await;
            assert!(clients[&slow].deliver(&handle_payload, hub.stats()));
        }

        let payload: Payload = Arc::from("after-full");
        let delivered = timeout(
            Duration::from_millis(100),
            hub.broadcast_except(sender, Arc::clone(&payload)),
        )
        .await
        .expect("broadcast must not block on a full queue");

        assert_eq!(delivered, 1);
        assert_eq!(hub.stats().fanout_dropped(), 1);
        assert_eq!(fast_queue.recv().await.as_deref(), Some("after-full"));

        let mut backlog = 0;
        while let Ok(message) = slow_queue.try_recv() {
            assert_ne!(&*message, "after-full");
            backlog += 1;
        }
        assert_eq!(backlog, SEND_BUF_SIZE);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let hub = new_hub();
        let (_, mut first) = join(&hub).await;
        let (_, mut second) = join(&hub).await;

        assert_eq!(hub.broadcast(Arc::from("notice")).await, 2);
        assert_eq!(first.recv().await.as_deref(), Some("notice"));
        assert_eq!(second.recv().await.as_deref(), Some("notice"));
    }

    #[tokio::test]
    async fn test_close_all_closes_every_queue() {
        let hub = new_hub();
        let (_, mut first) = join(&hub).await;
        let (_, mut second) = join(&hub).await;

        assert_eq!(hub.close_all().await, 2);
        assert!(hub.is_empty().await);
        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, None);
        assert_eq!(hub.stats().active_connections(), 0);
    }

    #[tokio::test]
    async fn test_register_after_close_all_is_refused() {
        let hub = new_hub();
        let (_, _first) = join(&hub).await;
        assert!(!hub.is_closed());

        hub.close_all().await;
        assert!(hub.is_closed());

        let (late, mut late_queue) = ClientHandle::channel(ClientId::generate(), SEND_BUF_SIZE);
        assert!(!hub.register(late).await);
        assert!(hub.is_empty().await);
        assert_eq!(hub.stats().total_connections(), 1);
        assert_eq!(hub.stats().active_connections(), 0);
        // 被拒绝的发送端已释放，队列直接关闭
        assert_eq!(late_queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let hub = Arc::new(new_hub());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                let id = ClientId::generate();
                let (handle, queue) = ClientHandle::channel(id, SEND_BUF_SIZE);
                hub.register(handle).await;
                hub.broadcast_except(id, Arc::from("hi")).await;
                queue
            }));
        }
        let mut queues = Vec::new();
        for task in tasks {
            queues.push(task.await.unwrap());
        }
        assert_eq!(hub.len().await, 32);
        assert_eq!(hub.stats().total_connections(), 32);
    }
}
