use anyhow::{Context, Result};
use chrono::Utc;
use morris_peer::{run_autoplay, AutoplayOptions, PeerBroker, PeerRole, PeerSettings, PeerState, SessionStore};
use morris_protocol::{
    ChannelConnection, Connector, Crypto, Listener, NetworkConfig, Sha256Crypto, TcpConnector, TcpListener,
    TransportType,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("morris_peer=info".parse()?)
            .add_directive("morris_protocol=info".parse()?))
        .init();

    info!("九子棋对等同步演示启动中...");

    let settings = PeerSettings::load();
    let crypto = Sha256Crypto::shared();
    let host_id = crypto.random_id();
    let client_id = crypto.random_id();

    let seed = settings.seed.unwrap_or_else(rand::random);
    let host_options = AutoplayOptions {
        max_turns: settings.max_turns,
        seed,
    };
    let client_options = AutoplayOptions {
        max_turns: settings.max_turns,
        seed: seed.wrapping_add(1),
    };

    let host = PeerState::new(PeerRole::Host, host_id.clone(), client_id.clone(), crypto.clone())
        .with_options(settings.board);
    let client = PeerState::new(PeerRole::Client, client_id, host_id, crypto);

    let (host, client) = match settings.network.transport {
        TransportType::Tcp => play_over_tcp(&settings.network, host, client, host_options, client_options).await?,
        TransportType::Memory => {
            let (a, b) = ChannelConnection::pair();
            tokio::try_join!(
                run_autoplay(PeerBroker::new(a, host), host_options),
                run_autoplay(PeerBroker::new(b, client), client_options),
            )?
        }
    };

    let turn = host.game().map_or(0, |game| game.turn());
    let winner = host.game().and_then(|game| game.winner()).map(|p| p.name().to_string());
    info!(seed, turn, winner = ?winner, "自动对弈结束");

    if host.last_state_hash() == client.last_state_hash() {
        info!(hash = ?host.last_state_hash(), "双方状态一致");
    } else {
        warn!(host = ?host.last_state_hash(), client = ?client.last_state_hash(), "双方状态不一致");
    }

    if settings.save_sessions {
        match save_sessions(&[&host, &client]) {
            Ok(store) => info!("会话已保存到 {:?}", store.sessions_directory()),
            Err(e) => warn!("保存会话失败: {:#}", e),
        }
    }

    Ok(())
}

/// 本机回环 TCP 上的自动对弈
async fn play_over_tcp(
    network: &NetworkConfig,
    host: PeerState,
    client: PeerState,
    host_options: AutoplayOptions,
    client_options: AutoplayOptions,
) -> Result<(PeerState, PeerState)> {
    let listener = TcpListener::bind(&network.address())
        .await
        .context("无法监听本地地址")?;
    let addr = listener.local_addr().context("无法获取监听地址")?;
    info!(%addr, "主机开始监听");

    let host_task = tokio::spawn(host_session(listener, host, host_options));

    let conn = TcpConnector::default().connect(&addr).await.context("无法连接主机")?;
    let client = run_autoplay(PeerBroker::new(conn, client), client_options).await?;
    let host = host_task.await.context("主机任务异常退出")??;

    Ok((host, client))
}

/// 等待客户端连入后以主机身份自动对弈
async fn host_session(mut listener: TcpListener, host: PeerState, options: AutoplayOptions) -> Result<PeerState> {
    let conn = listener.accept().await.context("接受连接失败")?;
    run_autoplay(PeerBroker::new(conn, host), options).await
}

fn save_sessions(peers: &[&PeerState]) -> Result<SessionStore> {
    let store = SessionStore::new()?;
    let now = Utc::now().timestamp_millis();
    store.purge_expired(now)?;
    for peer in peers {
        store.save_session(&peer.to_session(now))?;
    }
    Ok(store)
}
