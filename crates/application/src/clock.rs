use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// 单调时钟，用于令牌桶补充计算
    fn now(&self) -> Instant;

    /// 毫秒级 Unix 时间戳，写入出站消息的 `ts` 字段
    fn unix_millis(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
