//! 并发数据一致性测试
//!
//! 验证大量连接同时加入、聊天、断开后，成员表与统计计数保持一致。

use std::sync::Arc;
use std::time::Duration;

use application::transport::memory;
use application::{ChatService, CloseReason, Frame, SessionSettings};
use domain::protocol;
use tokio::time::{sleep, timeout};

const CLIENTS: usize = 20;

fn chat(user: &str, text: &str) -> String {
    String::from_utf8(protocol::encode_chat(user, text, 1).unwrap()).unwrap()
}

async fn wait_for_members(service: &ChatService, count: usize) {
    timeout(Duration::from_secs(5), async {
        while service.hub().len().await != count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("membership did not settle");
}

/// 测试并发连接/断开的计数一致性
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connection_consistency() {
    let service = ChatService::from_settings(SessionSettings::default());

    let mut peers = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..CLIENTS {
        let (transport, peer) = memory::pair();
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service.serve_connection(transport).await
        }));
        peers.push(peer);
    }
    wait_for_members(&service, CLIENTS).await;

    // 一半连接主动离开，另一半直接断开
    for (i, peer) in peers.iter().enumerate() {
        if i % 2 == 0 {
            peer.send_text(r#"{"type":"leave"}"#);
        } else {
            peer.send_frame(Frame::Close);
        }
    }

    let mut leaves = 0;
    let mut closes = 0;
    for task in tasks {
        match task.await.unwrap() {
            CloseReason::Leave => leaves += 1,
            CloseReason::PeerClosed => closes += 1,
            other => panic!("unexpected close reason {other:?}"),
        }
    }
    assert_eq!(leaves, CLIENTS / 2);
    assert_eq!(closes, CLIENTS / 2);

    let snapshot = service.stats().snapshot();
    assert!(service.hub().is_empty().await);
    assert_eq!(snapshot.total_connections, CLIENTS as u64);
    assert_eq!(snapshot.total_disconnects, CLIENTS as u64);
    assert_eq!(snapshot.active_connections, 0);
}

/// 测试多个发送方同时广播时每个接收方都收到其他人的全部消息
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_broadcast_delivery() {
    let service = ChatService::from_settings(SessionSettings::default());
    let senders = 5;

    let mut peers = Vec::new();
    for _ in 0..senders {
        let (transport, peer) = memory::pair();
        let service = service.clone();
        tokio::spawn(async move { service.serve_connection(transport).await });
        peers.push(peer);
    }
    wait_for_members(&service, senders).await;

    // 每个发送方 3 条，低于限流容量
    for (i, peer) in peers.iter().enumerate() {
        for n in 0..3 {
            peer.send_text(chat(&format!("user{i}"), &format!("message {n}")));
        }
    }

    let expected_per_peer = (senders - 1) * 3;
    for peer in peers.iter_mut() {
        let mut received = 0;
        while received < expected_per_peer {
            let frame = timeout(Duration::from_secs(2), peer.next_frame())
                .await
                .expect("relay should arrive")
                .expect("connection open");
            if let Frame::Text(text) = frame {
                assert_eq!(text.len(), domain::CHAT_PAYLOAD_SIZE);
                received += 1;
            }
        }
    }

    let stats = Arc::clone(service.stats());
    assert_eq!(stats.total_messages(), (senders * 3) as u64);
    assert_eq!(stats.dropped_messages(), 0);
    assert_eq!(stats.fanout_dropped(), 0);

    assert_eq!(service.shutdown().await, senders);
}
