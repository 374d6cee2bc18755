//! Room and server configuration

use shared::{DEFAULT_CONNECTION_KEY, DEFAULT_PORT, DEFAULT_ROOM_SIZE, DEFAULT_TARGET_FPS};
use std::time::Duration;

use crate::error::{Result, ServerError};

/// Largest room whose player ids still fit in a `u8`
pub const MAX_ROOM_SIZE: usize = 256;
pub const MAX_TARGET_FPS: u32 = 1000;

/// Parameters fixed for the lifetime of one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Number of players that must connect before the match starts
    pub room_size: usize,
    /// Frames broadcast per second, announced to clients at start
    pub target_fps: u32,
    /// Shared secret every connection request must present
    pub connection_key: String,
    /// Keep checksums only for this many frames behind the newest one
    pub checksum_retention: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            room_size: DEFAULT_ROOM_SIZE,
            target_fps: DEFAULT_TARGET_FPS,
            connection_key: DEFAULT_CONNECTION_KEY.to_string(),
            checksum_retention: None,
        }
    }
}

impl RoomConfig {
    pub fn validate(&self) -> Result<()> {
        if self.room_size == 0 || self.room_size > MAX_ROOM_SIZE {
            return Err(ServerError::InvalidConfig(format!(
                "room size must be between 1 and {MAX_ROOM_SIZE}, got {}",
                self.room_size
            )));
        }
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(ServerError::InvalidConfig(format!(
                "target fps must be between 1 and {MAX_TARGET_FPS}, got {}",
                self.target_fps
            )));
        }
        if self.checksum_retention == Some(0) {
            return Err(ServerError::InvalidConfig(
                "checksum retention must be at least one frame".to_string(),
            ));
        }
        Ok(())
    }

    /// Time between two frame broadcasts
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.target_fps.max(1)))
    }
}

/// Listener settings plus the configuration applied to every hosted room
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub room: RoomConfig,
    /// How long a new connection may take to present its key
    pub handshake_timeout: Duration,
    /// Stop after the first match instead of opening a fresh room
    pub single_match: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            room: RoomConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            single_match: false,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_default_room_config_is_valid() {
        let config = RoomConfig::default();
        assert_eq!(config.room_size, 2);
        assert_eq!(config.target_fps, 20);
        assert_eq!(config.connection_key, "SomeConnectionKey");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tick_interval_from_fps() {
        let config = RoomConfig {
            target_fps: 20,
            ..RoomConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(50));

        let config = RoomConfig {
            target_fps: 60,
            ..RoomConfig::default()
        };
        assert_approx_eq!(config.tick_interval().as_secs_f64(), 1.0 / 60.0, 1e-9);
    }

    #[test]
    fn test_invalid_room_sizes() {
        for room_size in [0, MAX_ROOM_SIZE + 1] {
            let config = RoomConfig {
                room_size,
                ..RoomConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ServerError::InvalidConfig(_))
            ));
        }

        let largest = RoomConfig {
            room_size: MAX_ROOM_SIZE,
            ..RoomConfig::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_invalid_fps_and_retention() {
        let zero_fps = RoomConfig {
            target_fps: 0,
            ..RoomConfig::default()
        };
        assert!(zero_fps.validate().is_err());

        let zero_retention = RoomConfig {
            checksum_retention: Some(0),
            ..RoomConfig::default()
        };
        assert!(zero_retention.validate().is_err());
    }

    #[test]
    fn test_server_address() {
        let config = ServerConfig {
            port: 7000,
            ..ServerConfig::default()
        };
        assert_eq!(config.address(), "127.0.0.1:7000");
        assert_eq!(ServerConfig::default().port, 9050);
    }
}
