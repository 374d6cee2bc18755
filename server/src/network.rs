//! Server network layer: TCP listener and match hosting

use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::room::{MatchSummary, Room};
use crate::transport::TcpTransport;

/// Lockstep relay server hosting one room at a time on a single listener
pub struct Server {
    listener: Arc<TcpListener>,
    config: ServerConfig,
    matches_hosted: u64,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.room.validate()?;
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener: Arc::new(listener),
            config,
            matches_hosted: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn matches_hosted(&self) -> u64 {
        self.matches_hosted
    }

    /// Opens a fresh room and drives it until its match is over
    ///
    /// Connections arriving after the match has started are refused by the
    /// room; connections arriving after it has stopped wait for the next room.
    pub async fn run_match(&mut self) -> Result<MatchSummary> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = TcpTransport::new(events_tx, self.config.handshake_timeout);
        let room = Room::new(self.config.room.clone(), Arc::clone(&transport))?;

        let acceptor = transport.spawn_listener(Arc::clone(&self.listener));
        let summary = room.run(events_rx).await;
        acceptor.abort();

        self.matches_hosted += 1;
        info!(
            "Match {} ended: {} frames, {} desyncs",
            self.matches_hosted, summary.frames_broadcast, summary.desyncs
        );
        Ok(summary)
    }

    /// Hosts matches back to back, or just one in single-match mode
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.run_match().await?;
            if self.config.single_match {
                info!("Single match finished, shutting down");
                return Ok(());
            }
            info!("Opening a new room");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::error::ServerError;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.matches_hosted(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_room() {
        let config = ServerConfig {
            room: RoomConfig {
                target_fps: 0,
                ..RoomConfig::default()
            },
            ..test_config()
        };
        assert!(matches!(
            Server::bind(config).await,
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_reports_unresolvable_host() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..test_config()
        };
        assert!(matches!(
            Server::bind(config).await,
            Err(ServerError::Io(_))
        ));
    }
}
