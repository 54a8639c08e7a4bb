//! 协议编解码
//!
//! chat 消息在线上必须是精确的 [`CHAT_PAYLOAD_SIZE`] 字节：先按原文本序列化，
//! 短了就在 `text` 尾部补空格，长了就从 `text` 尾部截掉溢出的部分，
//! 然后重新序列化，直到长度恰好等于目标值。

use std::cmp::Ordering;

use serde::Serialize;

use crate::errors::ProtocolError;
use crate::message::{Message, CHAT_PAYLOAD_SIZE, ROOM};

/// 定长填充的最大迭代次数。
///
/// 正常情况下最多三轮：截断一次、补齐一次、确认一次。
const MAX_SIZING_ROUNDS: usize = 8;

/// chat 信封的借用视图，字段顺序与 [`Message::Chat`] 的序列化结果一致
#[derive(Serialize)]
struct ChatEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    room: &'a str,
    user: &'a str,
    text: &'a str,
    ts: i64,
}

/// 解析一条线上消息
///
/// 非法 JSON 或未知 `type` 都返回 [`ProtocolError::Decode`]，调用方应当忽略该消息。
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|err| ProtocolError::decode(err.to_string()))
}

/// 序列化任意消息，不做尺寸约束
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(|err| ProtocolError::encode(err.to_string()))
}

/// 生成公共房间内恰好 [`CHAT_PAYLOAD_SIZE`] 字节的 chat 消息
pub fn encode_chat(user: &str, text: &str, ts: i64) -> Result<Vec<u8>, ProtocolError> {
    encode_chat_sized(ROOM, user, text, ts, CHAT_PAYLOAD_SIZE)
}

/// 生成指定房间、指定尺寸的定长 chat 消息
pub fn encode_chat_sized(
    room: &str,
    user: &str,
    text: &str,
    ts: i64,
    size: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let overhead = serialize_chat(room, user, "", ts)?.len();
    if overhead > size {
        return Err(ProtocolError::PayloadOverhead {
            overhead,
            target: size,
        });
    }

    let mut text = text.to_owned();
    for _ in 0..MAX_SIZING_ROUNDS {
        let data = serialize_chat(room, user, &text, ts)?;
        match data.len().cmp(&size) {
            Ordering::Equal => return Ok(data),
            Ordering::Less => {
                let deficit = size - data.len();
                text.extend(std::iter::repeat(' ').take(deficit));
            }
            Ordering::Greater => {
                let overflow = data.len() - size;
                truncate_serialized(&mut text, overflow);
            }
        }
    }

    Err(ProtocolError::PayloadDidNotConverge {
        target: size,
        rounds: MAX_SIZING_ROUNDS,
    })
}

/// 空文本 chat 信封在公共房间里的字节数
pub fn chat_overhead(user: &str, ts: i64) -> Result<usize, ProtocolError> {
    chat_overhead_in(ROOM, user, ts)
}

/// 空文本 chat 信封在指定房间里的字节数
pub fn chat_overhead_in(room: &str, user: &str, ts: i64) -> Result<usize, ProtocolError> {
    Ok(serialize_chat(room, user, "", ts)?.len())
}

pub fn encode_ping(ts: i64) -> Result<Vec<u8>, ProtocolError> {
    encode(&Message::Ping { ts: Some(ts) })
}

pub fn encode_pong(ts: i64) -> Result<Vec<u8>, ProtocolError> {
    encode(&Message::Pong { ts: Some(ts) })
}

pub fn encode_join(user: &str, ts: i64) -> Result<Vec<u8>, ProtocolError> {
    encode(&Message::Join {
        room: Some(ROOM.to_string()),
        user: user.to_string(),
        ts: Some(ts),
    })
}

pub fn encode_leave(user: &str, ts: i64) -> Result<Vec<u8>, ProtocolError> {
    encode(&Message::Leave {
        room: Some(ROOM.to_string()),
        user: Some(user.to_string()),
        ts: Some(ts),
    })
}

fn serialize_chat(room: &str, user: &str, text: &str, ts: i64) -> Result<Vec<u8>, ProtocolError> {
    let envelope = ChatEnvelope {
        kind: "chat",
        room,
        user,
        text,
        ts,
    };
    serde_json::to_vec(&envelope).map_err(|err| ProtocolError::encode(err.to_string()))
}

/// 从尾部按整字符移除，直到移除的序列化字节数不少于 `overflow`
fn truncate_serialized(text: &mut String, overflow: usize) {
    let mut removed = 0;
    while removed < overflow {
        match text.pop() {
            Some(c) => removed += escaped_len(c),
            None => break,
        }
    }
}

/// 单个字符在 JSON 字符串中占用的字节数
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}
