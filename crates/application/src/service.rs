use std::sync::Arc;

use domain::ClientId;
use tracing::info;

use crate::client::{Client, CloseReason, SessionSettings};
use crate::clock::{Clock, SystemClock};
use crate::hub::Hub;
use crate::stats::ChatStats;
use crate::transport::Transport;

/// 聊天服务入口
///
/// 持有共享的 Hub、统计与时钟，传输适配器每接受一条连接就调用一次
/// [`ChatService::serve_connection`]。克隆开销只是几个 `Arc`。
#[derive(Clone)]
pub struct ChatService {
    hub: Arc<Hub>,
    stats: Arc<ChatStats>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl ChatService {
    pub fn new(stats: Arc<ChatStats>, clock: Arc<dyn Clock>, settings: SessionSettings) -> Self {
        let hub = Arc::new(Hub::new(Arc::clone(&stats)));
        Self {
            hub,
            stats,
            clock,
            settings,
        }
    }

    /// 使用系统时钟和新的统计计数
    pub fn from_settings(settings: SessionSettings) -> Self {
        Self::new(
            Arc::new(ChatStats::new()),
            Arc::new(SystemClock),
            settings,
        )
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn stats(&self) -> &Arc<ChatStats> {
        &self.stats
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// 为一条已升级的连接分配标识并运行到结束
    pub async fn serve_connection<T: Transport>(&self, transport: T) -> CloseReason {
        let client = Client::new(
            ClientId::generate(),
            Arc::clone(&self.hub),
            Arc::clone(&self.clock),
            self.settings.clone(),
        );
        client.run(transport).await
    }

    /// 关闭所有连接的出站队列，各连接随后发送关闭帧并退出
    ///
    /// 之后再到达的连接会被拒绝（[`CloseReason::Rejected`]）。
    pub async fn shutdown(&self) -> usize {
        let closed = self.hub.close_all().await;
        info!(closed, "chat service shutting down");
        closed
    }
}
