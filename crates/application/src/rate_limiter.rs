use tokio::time::Instant;

/// 每连接的令牌桶
///
/// 容量等于每秒允许的消息数，按整数毫秒补充：每过 `1000 / capacity` 毫秒补充一个令牌。
/// 补充发生时 `last_refill` 跳到当前时刻，不足一个令牌的零头随之丢弃。
/// 只由连接的入站循环调用，因此不需要内部加锁。
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// 创建一个装满令牌的桶
    pub fn new(capacity: u32, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// 尝试消耗一个令牌
    ///
    /// 返回 `false` 表示消息应被丢弃（计入丢弃统计），不是错误。
    pub fn allow(&mut self, now: Instant) -> bool {
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_millis();
        let refill = elapsed_ms.saturating_mul(u128::from(self.capacity)) / 1000;
        if refill > 0 {
            let refilled = u128::from(self.tokens)
                .saturating_add(refill)
                .min(u128::from(self.capacity));
            self.tokens = u32::try_from(refilled).unwrap_or(self.capacity);
            self.last_refill = now;
        }

        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 当前剩余令牌数
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// 直接设置上次补充时间，供测试模拟时间流逝
    pub fn set_last_refill(&mut self, instant: Instant) {
        self.last_refill = instant;
    }
}
