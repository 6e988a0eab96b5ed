use clap::Parser;
use seqkv::server::RequestHandler;
use seqkv::{
    FollowerNode, LeaderNode, Mode, NodeServer, ReplicationConfig, ReplicationOrchestrator,
    SequencedStore, TcpTransport,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::ctrl_c;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[clap(long, default_value = seqkv::DEFAULT_ADDR, env = "SEQKV_ADDR")]
    addr: SocketAddr,

    #[clap(long, default_value = Mode::Follower, env = "SEQKV_ROLE")]
    mode: Mode,

    /// Follower endpoints, only used by the leader.
    #[clap(long, value_delimiter = ',', env = "SEQKV_FOLLOWERS")]
    followers: Vec<String>,

    #[clap(long, default_value = "1", env = "SEQKV_WRITE_QUORUM")]
    write_quorum: usize,

    #[clap(long, default_value = "0", env = "SEQKV_MIN_DELAY_MS")]
    min_delay_ms: u64,

    #[clap(long, default_value = "200", env = "SEQKV_MAX_DELAY_MS")]
    max_delay_ms: u64,

    #[clap(long, default_value = "2000", env = "SEQKV_CALL_TIMEOUT_MS")]
    call_timeout_ms: u64,

    #[clap(long, default_value = "5000", env = "SEQKV_REPLICATION_TIMEOUT_MS")]
    replication_timeout_ms: u64,

    #[clap(long, default_value = "info", env = "SEQKV_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,
}

impl App {
    fn replication_config(&self) -> ReplicationConfig {
        ReplicationConfig {
            followers: self
                .followers
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            write_quorum: self.write_quorum,
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            attempt_timeout: Duration::from_millis(self.replication_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    seqkv::init_tracing(app.log_level)?;

    info!(
        "seqkv-server version: {}, mode: {}",
        env!("CARGO_PKG_VERSION"),
        app.mode
    );

    let store = Arc::new(SequencedStore::new());
    match app.mode {
        Mode::Leader => {
            let config = app.replication_config();
            config.validate()?;
            info!(
                followers = ?config.followers,
                write_quorum = config.write_quorum,
                "Starting leader"
            );
            let orchestrator = ReplicationOrchestrator::new(config, TcpTransport);
            serve(LeaderNode::new(store, orchestrator), app.addr).await
        }
        Mode::Follower => serve(FollowerNode::new(store), app.addr).await,
    }
}

async fn serve<H: RequestHandler>(handler: H, addr: SocketAddr) -> anyhow::Result<()> {
    let server = NodeServer::bind(handler, addr).await?;
    server
        .run_until(async {
            match ctrl_c().await {
                Ok(_) => info!("Received shutdown signal"),
                Err(e) => error!("Error receiving Ctrl-C: {e}"),
            }
        })
        .await?;
    Ok(())
}
