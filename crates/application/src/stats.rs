use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// 服务级统计计数
///
/// 由调用方创建并以 `Arc` 注入 [`crate::Hub`] 与 [`crate::Client`]，不使用进程级全局变量。
/// 所有计数器都是原子的，可在任意任务中并发更新。
#[derive(Debug)]
pub struct ChatStats {
    /// 被接受并转发的 chat 消息数
    total_messages: AtomicU64,
    /// 因限流被丢弃的 chat 消息数
    dropped_messages: AtomicU64,
    /// 扇出时因接收方队列已满（或已关闭）而丢弃的投递次数
    fanout_dropped: AtomicU64,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    total_disconnects: AtomicU64,
    started_at: Instant,
}

impl Default for ChatStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStats {
    pub fn new() -> Self {
        Self {
            total_messages: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            fanout_dropped: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            total_disconnects: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn add_message(&self) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_dropped(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_fanout_dropped(&self) {
        self.fanout_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// 活跃连接数饱和递减，永远不会下溢
    pub fn remove_connection(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(1))
            });
        self.total_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }

    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn fanout_dropped(&self) -> u64 {
        self.fanout_dropped.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_disconnects(&self) -> u64 {
        self.total_disconnects.load(Ordering::Relaxed)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// 获取当前统计快照
    pub fn snapshot(&self) -> StatsSnapshot {
        let total_messages = self.total_messages();
        let dropped_messages = self.dropped_messages();
        let elapsed_secs = self.elapsed_secs();

        let throughput = if elapsed_secs > 0.0 {
            total_messages as f64 / elapsed_secs
        } else {
            0.0
        };
        // 耗时 / 消息数，即吞吐量的倒数，并非端到端延迟
        let avg_latency_ms = if total_messages > 0 {
            elapsed_secs * 1000.0 / total_messages as f64
        } else {
            0.0
        };
        let attempted = total_messages + dropped_messages;
        let drop_rate = if attempted > 0 {
            dropped_messages as f64 / attempted as f64 * 100.0
        } else {
            0.0
        };

        StatsSnapshot {
            total_messages,
            dropped_messages,
            fanout_dropped: self.fanout_dropped(),
            total_connections: self.total_connections(),
            active_connections: self.active_connections(),
            total_disconnects: self.total_disconnects(),
            elapsed_secs,
            throughput,
            avg_latency_ms,
            drop_rate,
        }
    }
}

/// 统计快照，用于 `/stats` 接口与退出时的汇总输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_messages: u64,
    pub dropped_messages: u64,
    pub fanout_dropped: u64,
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_disconnects: u64,
    pub elapsed_secs: f64,
    /// 每秒转发的消息数
    pub throughput: f64,
    pub avg_latency_ms: f64,
    /// 限流丢弃占比（百分比）
    pub drop_rate: f64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Statistics ---")?;
        writeln!(f, "Total messages: {}", self.total_messages)?;
        writeln!(f, "Processing time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Average latency: {:.3}ms", self.avg_latency_ms)?;
        writeln!(f, "Throughput: {:.2} messages/sec", self.throughput)?;
        writeln!(f, "Total connections: {}", self.total_connections)?;
        write!(f, "Message drop rate: {:.2}%", self.drop_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = ChatStats::new();
        for _ in 0..100 {
            stats.add_message();
        }
        for _ in 0..10 {
            stats.add_dropped();
        }
        stats.add_fanout_dropped();
        stats.add_connection();
        stats.add_connection();
        stats.remove_connection();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_messages, 100);
        assert_eq!(snapshot.dropped_messages, 10);
        assert_eq!(snapshot.fanout_dropped, 1);
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.total_disconnects, 1);

        assert!(
            snapshot.drop_rate > 9.0 && snapshot.drop_rate < 10.0,
            "drop rate {:.2} not in 9-10%",
            snapshot.drop_rate
        );
    }

    #[test]
    fn test_active_connections_never_underflow() {
        let stats = ChatStats::new();
        stats.remove_connection();
        stats.remove_connection();
        assert_eq!(stats.active_connections(), 0);
    }

    #[test]
    fn test_empty_snapshot_has_zero_rates() {
        let snapshot = ChatStats::new().snapshot();
        assert_eq!(snapshot.drop_rate, 0.0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_display_matches_summary_format() {
        let stats = ChatStats::new();
        stats.add_connection();
        let text = stats.snapshot().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "--- Statistics ---");
        assert_eq!(lines[1], "Total messages: 0");
        assert!(lines[2].starts_with("Processing time: "));
        assert_eq!(lines[5], "Total connections: 1");
        assert_eq!(lines[6], "Message drop rate: 0.00%");
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let stats = ChatStats::new();
        stats.add_message();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["total_messages"], 1);
        assert!(json["throughput"].is_number());
    }
}
