//! 探测客户端
//!
//! 连接聊天服务，加入房间后按固定间隔发送定长 chat，应答服务端 ping，
//! 结束时输出收发统计。

use std::time::Duration;

use anyhow::Context;
use application::{Clock, SystemClock};
use clap::Parser;
use domain::{protocol, Message};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval, sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chat-probe", version, about = "Join the public room and exercise the chat server")]
struct Cli {
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    #[arg(long, default_value = "probe")]
    user: String,

    /// 与服务端配置一致的房间名
    #[arg(long, default_value = domain::ROOM)]
    room: String,

    /// 与服务端配置一致的 chat 载荷字节数
    #[arg(long, default_value_t = domain::CHAT_PAYLOAD_SIZE)]
    size: usize,

    /// 发送的 chat 条数
    #[arg(long, default_value_t = 20)]
    messages: u32,

    /// 两条 chat 之间的间隔（毫秒）
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// 发送完毕后继续接收的秒数
    #[arg(long, default_value_t = 2)]
    linger_secs: u64,
}

fn text(bytes: Vec<u8>) -> anyhow::Result<WsMessage> {
    let payload = String::from_utf8(bytes).context("encoded payload is not utf-8")?;
    Ok(WsMessage::text(payload))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let clock = SystemClock;

    let (ws, _) = connect_async(&cli.url)
        .await
        .with_context(|| format!("failed to connect to {}", cli.url))?;
    let (mut sink, mut stream) = ws.split();
    info!(url = %cli.url, user = %cli.user, "probe connected");

    sink.send(text(protocol::encode_join(&cli.user, clock.unix_millis())?)?)
        .await
        .context("failed to send join")?;

    let linger = Duration::from_secs(cli.linger_secs);
    let mut ticker = interval(Duration::from_millis(cli.interval_ms.max(1)));
    let mut linger_until = (cli.messages == 0).then(|| Instant::now() + linger);
    let mut sent = 0u32;
    let mut received = 0u64;
    let mut pings = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick(), if sent < cli.messages => {
                let body = format!("probe message {sent}");
                let chat = protocol::encode_chat_sized(
                    &cli.room,
                    &cli.user,
                    &body,
                    clock.unix_millis(),
                    cli.size,
                )?;
                sink.send(text(chat)?).await.context("failed to send chat")?;
                sent += 1;
                if sent == cli.messages {
                    linger_until = Some(Instant::now() + linger);
                }
            }
            _ = sleep_until(linger_until.unwrap_or_else(Instant::now)), if linger_until.is_some() => {
                break;
            }
            next = stream.next() => {
                let message = match next {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => return Err(err).context("connection failed"),
                    None => {
                        warn!("server closed the connection");
                        break;
                    }
                };
                let raw = match message {
                    WsMessage::Text(raw) => raw,
                    WsMessage::Close(_) => {
                        warn!("server sent close frame");
                        break;
                    }
                    _ => continue,
                };
                match protocol::decode(raw.as_str().as_bytes()) {
                    Ok(Message::Ping { .. }) => {
                        pings += 1;
                        sink.send(text(protocol::encode_pong(clock.unix_millis())?)?)
                            .await
                            .context("failed to answer ping")?;
                    }
                    Ok(Message::Chat { .. }) => received += 1,
                    Ok(other) => debug!(kind = other.kind(), "ignoring message"),
                    Err(err) => debug!(error = %err, "ignoring malformed message"),
                }
            }
        }
    }

    if let Ok(leave) = protocol::encode_leave(&cli.user, clock.unix_millis()) {
        let _ = sink.send(text(leave)?).await;
    }
    let _ = sink.close().await;

    info!(sent, received, pings, "probe finished");
    println!("sent: {sent}\nreceived: {received}\npings answered: {pings}");
    Ok(())
}
