use anyhow::Result;
use memwarden_daemon::{
    collector::LinuxForestSource,
    config::Config,
    event::Reaction,
    monitor::Engine,
    protocol::{Request, Response},
    reactions::{BroadcastReaction, StatusBoard},
    socket::{handle_client, RequestHandler, SocketServer},
    supervisor::Systemd,
};
use std::sync::Arc;
use tracing::{error, info, warn};

struct DaemonState {
    config: Config,
    status: Arc<StatusBoard>,
}

#[async_trait::async_trait]
impl RequestHandler for DaemonState {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::ListServices => {
                let snapshot = self.status.snapshot();
                let data: Vec<_> = self
                    .config
                    .services
                    .iter()
                    .map(|service| {
                        let status = snapshot.get(&service.name).cloned().unwrap_or_default();
                        serde_json::json!({
                            "name": service.name,
                            "memory": service.memory,
                            "pid": status.pid,
                            "rss_bytes": status.last_rss,
                            "events": status.events,
                            "alarms": status.alarms,
                        })
                    })
                    .collect();
                Response::Response {
                    id: None,
                    data: serde_json::json!(data),
                }
            }

            Request::GetConfig => match serde_json::to_value(&self.config) {
                Ok(data) => Response::Response { id: None, data },
                Err(e) => Response::Response {
                    id: None,
                    data: serde_json::json!({"error": e.to_string()}),
                },
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    info!("memwarden daemon starting...");

    let config_path = Config::config_path();
    let config = if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };
    if config.services.is_empty() {
        warn!("No services configured, nothing to monitor");
    }

    let socket_path = SocketServer::socket_path();
    let server = SocketServer::bind(&socket_path).await?;
    let broadcast_tx = server.broadcast_sender();

    let status = Arc::new(StatusBoard::new());
    let taps: Vec<Arc<dyn Reaction>> = vec![
        Arc::clone(&status) as Arc<dyn Reaction>,
        Arc::new(BroadcastReaction::new(broadcast_tx)),
    ];

    let engine = Engine::new(
        &config,
        &Systemd,
        Box::new(LinuxForestSource::new()),
        &taps,
    )?;
    info!("Monitoring {} services", engine.service_count());

    let state = Arc::new(DaemonState { config, status });
    tokio::spawn(async move {
        loop {
            match server.accept().await {
                Ok(stream) => {
                    let state = Arc::clone(&state);
                    let broadcast_rx = server.broadcast_sender().subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, broadcast_rx, state).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    });

    // The engine runs on the main task: a fatal error here must surface in
    // the process exit status.
    engine.run().await
}
