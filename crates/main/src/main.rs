//! 主应用程序入口
//!
//! 按配置选择 axum 或 tokio-tungstenite 启动公共聊天服务，退出时打印统计汇总。

use std::time::Duration;

use anyhow::Context;
use application::{ChatService, SessionSettings};
use clap::{Parser, ValueEnum};
use config::{ChatConfig, TransportKind};
use infrastructure::TungsteniteServer;
use tokio::{signal, sync::oneshot, task::JoinHandle, time};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

/// 停止接受连接后等待服务循环退出的最长时间
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "chatroom", version, about = "Single-room public websocket chat server")]
struct Cli {
    /// 监听端口，覆盖配置文件与环境变量
    #[arg(long)]
    port: Option<u16>,

    /// 运行秒数，0 表示一直运行直到 Ctrl-C
    #[arg(long)]
    duration: Option<u64>,

    /// websocket 实现
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Axum,
    Tungstenite,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Axum => TransportKind::Axum,
            TransportArg::Tungstenite => TransportKind::Tungstenite,
        }
    }
}

impl Cli {
    fn apply(&self, config: &mut ChatConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(duration) = self.duration {
            config.server.duration_secs = duration;
        }
        if let Some(transport) = self.transport {
            config.server.transport = transport.into();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ChatConfig::load().context("failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let service = ChatService::from_settings(SessionSettings::from(&config.chat));
    let addr = config.bind_addr();
    let listener = infrastructure::bind(&addr).await?;
    info!(
        %addr,
        transport = %config.server.transport,
        duration_secs = config.server.duration_secs,
        "chat server starting"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let stop = async move {
        let _ = stop_rx.await;
    };

    let (server, state): (JoinHandle<anyhow::Result<()>>, Option<AppState>) =
        match config.server.transport {
            TransportKind::Axum => {
                let state = AppState::new(service.clone());
                let app = router(state.clone());
                let handle = tokio::spawn(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(stop)
                        .await
                        .context("axum server failed")
                });
                (handle, Some(state))
            }
            TransportKind::Tungstenite => {
                let server = TungsteniteServer::new(service.clone());
                let handle = tokio::spawn(async move {
                    server.run(listener, stop).await;
                    Ok(())
                });
                (handle, None)
            }
        };

    wait_for_stop(config.server.duration_secs).await;

    if let Some(state) = &state {
        state.begin_shutdown();
    }
    let _ = stop_tx.send(());
    service.shutdown().await;

    match time::timeout(SERVER_STOP_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => info!("server stopped"),
        Ok(Ok(Err(err))) => warn!(error = %err, "server exited with error"),
        Ok(Err(err)) => warn!(error = %err, "server task failed"),
        Err(_) => warn!("server did not stop in time"),
    }

    println!("{}", service.stats().snapshot());
    Ok(())
}

/// 等待 Ctrl-C，或在设置了运行时长时等待其到期
async fn wait_for_stop(duration_secs: u64) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c");
    };

    if duration_secs == 0 {
        ctrl_c.await;
        return;
    }

    tokio::select! {
        _ = ctrl_c => {}
        _ = time::sleep(Duration::from_secs(duration_secs)) => {
            info!(duration_secs, "run duration elapsed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "chatroom",
            "--port",
            "9100",
            "--duration",
            "30",
            "--transport",
            "tungstenite",
        ]);
        let mut config = ChatConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.duration_secs, 30);
        assert_eq!(config.server.transport, TransportKind::Tungstenite);
    }

    #[test]
    fn test_cli_without_flags_keeps_config() {
        let cli = Cli::parse_from(["chatroom"]);
        let mut config = ChatConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        assert!(Cli::try_parse_from(["chatroom", "--transport", "hyper"]).is_err());
    }
}
