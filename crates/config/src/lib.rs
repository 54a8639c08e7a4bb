//! 统一配置中心
//!
//! 提供聊天服务的全部可调参数，包括：
//! - 监听地址、运行时长与传输实现
//! - 限流、心跳、写截止与发送队列等连接参数
//!
//! 房间名与 chat 载荷长度属于协议常量（见 `domain`），不在配置范围内。
//!
//! 加载顺序：内置默认值 -> 可选配置文件（`CHAT_CONFIG_FILE`）-> 环境变量（`CHAT_*`，
//! 嵌套字段用 `__` 分隔，例如 `CHAT_SERVER__PORT=9000`）。

use std::{env, fmt, str::FromStr};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 指定配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG_FILE";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHAT_";

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    /// 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 连接与协议参数
    #[serde(default)]
    pub chat: ChatSettings,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 运行时长（秒），0 表示一直运行直到收到中断信号
    pub duration_secs: u64,
    pub transport: TransportKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            duration_secs: 0,
            transport: TransportKind::Axum,
        }
    }
}

/// 使用哪一套 websocket 实现对外提供服务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// axum 的 websocket 升级
    Axum,
    /// 直接在 TcpListener 上做 tokio-tungstenite 握手
    Tungstenite,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Axum => f.write_str("axum"),
            TransportKind::Tungstenite => f.write_str("tungstenite"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axum" => Ok(TransportKind::Axum),
            "tungstenite" => Ok(TransportKind::Tungstenite),
            other => Err(ConfigError::invalid(
                "server.transport",
                format!("unknown transport '{other}', expected axum or tungstenite"),
            )),
        }
    }
}

/// 连接与协议参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// 令牌桶容量，同时也是每秒补充的令牌数
    pub rate_limit_per_sec: u32,
    pub ping_interval_secs: u64,
    /// 读超时，超过该时长没有任何入站帧即判定连接失活
    pub pong_wait_secs: u64,
    /// 单次写操作的截止时长
    pub write_wait_secs: u64,
    /// 每个连接的出站队列容量
    pub send_buf_size: usize,
    /// 单条入站消息的最大字节数
    pub max_message_size: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            rate_limit_per_sec: domain::RATE_LIMIT_MSG_PER_SEC,
            ping_interval_secs: domain::PING_INTERVAL_SEC,
            pong_wait_secs: domain::PING_INTERVAL_SEC * 2,
            write_wait_secs: 10,
            send_buf_size: 64,
            max_message_size: 512,
        }
    }
}

impl ChatConfig {
    /// 按 默认值 -> 配置文件 -> 环境变量 的优先级加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ChatConfig::default()));
        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            figment = Self::merge_file(figment, &path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: ChatConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(figment: Figment, path: &str) -> Figment {
        if path.ends_with(".yml") || path.ends_with(".yaml") {
            figment.merge(Yaml::file(path))
        } else if path.ends_with(".json") {
            figment.merge(Json::file(path))
        } else {
            figment.merge(Toml::file(path))
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chat = &self.chat;

        if chat.rate_limit_per_sec == 0 {
            return Err(ConfigError::invalid(
                "chat.rate_limit_per_sec",
                "rate limit must be greater than 0",
            ));
        }
        if chat.send_buf_size == 0 {
            return Err(ConfigError::invalid(
                "chat.send_buf_size",
                "send buffer must hold at least one message",
            ));
        }
        if chat.ping_interval_secs == 0 || chat.write_wait_secs == 0 {
            return Err(ConfigError::invalid(
                "chat.ping_interval_secs",
                "ping interval and write wait must be greater than 0",
            ));
        }
        if chat.pong_wait_secs <= chat.ping_interval_secs {
            return Err(ConfigError::invalid(
                "chat.pong_wait_secs",
                format!(
                    "pong wait ({}s) must be longer than the ping interval ({}s)",
                    chat.pong_wait_secs, chat.ping_interval_secs
                ),
            ));
        }

        if chat.max_message_size < domain::CHAT_PAYLOAD_SIZE {
            return Err(ConfigError::invalid(
                "chat.max_message_size",
                format!(
                    "max message size {} must fit a {}-byte chat payload",
                    chat.max_message_size,
                    domain::CHAT_PAYLOAD_SIZE
                ),
            ));
        }

        Ok(())
    }

    /// 监听地址，形如 `0.0.0.0:8080`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("Invalid configuration {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
