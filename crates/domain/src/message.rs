use serde::{Deserialize, Serialize};

/// 唯一的公共房间名
pub const ROOM: &str = "public";

/// chat 消息序列化后的精确字节数
pub const CHAT_PAYLOAD_SIZE: usize = 128;

/// 每个连接每秒允许转发的 chat 消息数，同时也是令牌桶容量
pub const RATE_LIMIT_MSG_PER_SEC: u32 = 10;

/// 服务端发送 ping 的间隔（秒）
pub const PING_INTERVAL_SEC: u64 = 30;

/// 协议消息信封
///
/// 线上格式是带 `type` 标签的 JSON 对象，每个变体只携带与之相关的字段，
/// 缺省的可选字段在序列化时省略。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// 加入公共房间，设置连接的用户名
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        #[serde(default)]
        user: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    /// 聊天消息，原样转发给房间内其他连接
    Chat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    /// 心跳请求
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    /// 心跳响应
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
    /// 主动离开，等同于正常断开
    Leave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<i64>,
    },
}

impl Message {
    /// 线上 `type` 字段的取值
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "join",
            Message::Chat { .. } => "chat",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Leave { .. } => "leave",
        }
    }

    pub fn ts(&self) -> Option<i64> {
        match self {
            Message::Join { ts, .. }
            | Message::Chat { ts, .. }
            | Message::Ping { ts }
            | Message::Pong { ts }
            | Message::Leave { ts, .. } => *ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tag_is_first_field() {
        let msg = Message::Ping { ts: Some(42) };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"ping","ts":42}"#);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let msg = Message::Leave {
            room: None,
            user: Some("client-01".to_string()),
            ts: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"leave","user":"client-01"}"#);
    }

    #[test]
    fn test_join_without_user_defaults_to_empty() {
        let msg: Message = serde_json::from_str(r#"{"type":"join","room":"public"}"#).unwrap();
        assert_eq!(
            msg,
            Message::Join {
                room: Some(ROOM.to_string()),
                user: String::new(),
                ts: None,
            }
        );
        assert_eq!(msg.kind(), "join");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"pong","ts":7,"extra":"ignored"}"#).unwrap();
        assert_eq!(msg, Message::Pong { ts: Some(7) });
        assert_eq!(msg.ts(), Some(7));
    }
}
