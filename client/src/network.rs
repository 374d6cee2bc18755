//! Client network layer: handshake, message exchange and a headless bot loop

use bincode::{deserialize, serialize};
use log::{debug, info, warn};
use rand::Rng;
use shared::handshake::{read_packet, write_packet};
use shared::{
    Checksum, ConnectReply, ConnectRequest, Message, MessageTag, NetWriter, ProtocolError,
    RejectReason, StartSimulation,
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::hasher::FrameHasher;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("handshake encoding failed: {0}")]
    Handshake(#[from] bincode::Error),
    #[error("connection rejected: {0}")]
    Rejected(RejectReason),
    #[error("unexpected {0:?} message")]
    UnexpectedMessage(MessageTag),
    #[error("server shut the match down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// An accepted connection to the relay
pub struct LockstepClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    scratch: NetWriter,
}

impl LockstepClient {
    /// Connects and presents the key; fails if the server refuses
    pub async fn connect(server_addr: &str, key: &str) -> Result<Self> {
        let mut stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;

        let request = serialize(&ConnectRequest {
            key: key.to_string(),
        })?;
        write_packet(&mut stream, &request).await?;

        let reply: ConnectReply = deserialize(&read_packet(&mut stream).await?)?;
        match reply {
            ConnectReply::Accepted => {
                info!("Connected to {}", server_addr);
                let (reader, writer) = stream.into_split();
                Ok(Self {
                    reader,
                    writer,
                    scratch: NetWriter::with_capacity(64),
                })
            }
            ConnectReply::Rejected { reason } => Err(ClientError::Rejected(reason)),
        }
    }

    /// Waits for the next message from the server
    pub async fn next_message(&mut self) -> Result<Message> {
        let packet = read_packet(&mut self.reader).await?;
        Ok(Message::decode(&packet)?)
    }

    /// Waits until the match starts
    pub async fn wait_for_start(&mut self) -> Result<StartSimulation> {
        match self.next_message().await? {
            Message::StartSimulation(start) => Ok(start),
            Message::Shutdown => Err(ClientError::Shutdown),
            other => Err(ClientError::UnexpectedMessage(other.tag())),
        }
    }

    pub async fn send_input(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > shared::codec::MAX_ARRAY_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: data.len(),
                max: shared::codec::MAX_ARRAY_LEN,
            }
            .into());
        }
        self.scratch.reset();
        self.scratch.put_u8(MessageTag::Input as u8);
        self.scratch.put_bytes(data);
        self.flush_scratch().await
    }

    pub async fn send_checksum(&mut self, frame_number: u64, value: i64) -> Result<()> {
        self.scratch.reset();
        self.scratch.put_u8(MessageTag::Checksum as u8);
        Checksum {
            frame_number,
            value,
        }
        .serialize(&mut self.scratch);
        self.flush_scratch().await
    }

    /// Sends arbitrary bytes as one packet, bypassing message encoding
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        write_packet(&mut self.writer, data).await?;
        Ok(())
    }

    async fn flush_scratch(&mut self) -> Result<()> {
        write_packet(&mut self.writer, self.scratch.data()).await?;
        Ok(())
    }

    /// Closes the connection; the server sees a disconnect
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Plays a match without a simulation: folds every frame into a
    /// [`FrameHasher`], reports checksums and sends random inputs
    pub async fn run_bot(&mut self, options: &BotOptions) -> Result<BotReport> {
        let start = self.wait_for_start().await?;
        info!(
            "Simulation started: player {} seed {} at {} fps",
            start.player_id, start.seed, start.target_fps
        );

        let mut hasher = FrameHasher::new(start.seed);
        let mut report = BotReport {
            start,
            ..BotReport::default()
        };

        while options.max_frames.map_or(true, |max| hasher.frames() < max) {
            let inputs = match self.next_message().await {
                Ok(Message::Frame(inputs)) => inputs,
                Ok(Message::Shutdown) => {
                    warn!("Server shut the match down");
                    break;
                }
                Ok(other) => return Err(ClientError::UnexpectedMessage(other.tag())),
                Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => return Err(e),
            };

            report.inputs_received += inputs.len() as u64;
            hasher.apply_frame(&inputs);
            let frame = hasher.frames();
            debug!("Frame {} with {} inputs", frame, inputs.len());

            if options.input_every > 0 && frame % options.input_every == 0 {
                let len = rand::thread_rng().gen_range(1..=options.max_input_len.max(1));
                let mut input = vec![start.player_id; len];
                rand::thread_rng().fill(&mut input[1..]);
                self.send_input(&input).await?;
                report.inputs_sent += 1;
            }

            if options.checksum_every > 0 && frame % options.checksum_every == 0 {
                self.send_checksum(frame, hasher.value()).await?;
                report.checksums_sent += 1;
            }
        }

        report.frames = hasher.frames();
        report.final_checksum = hasher.value();
        Ok(report)
    }
}

/// How the bot behaves during a match
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Send a random input every this many frames (0 disables)
    pub input_every: u64,
    /// Report a checksum every this many frames (0 disables)
    pub checksum_every: u64,
    pub max_input_len: usize,
    /// Leave after this many frames; play until the server stops otherwise
    pub max_frames: Option<u64>,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            input_every: 5,
            checksum_every: 10,
            max_input_len: 8,
            max_frames: None,
        }
    }
}

/// What the bot saw during its match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReport {
    pub start: StartSimulation,
    pub frames: u64,
    pub inputs_sent: u64,
    pub inputs_received: u64,
    pub checksums_sent: u64,
    pub final_checksum: i64,
}

impl Default for BotReport {
    fn default() -> Self {
        Self {
            start: StartSimulation {
                seed: 0,
                target_fps: 0,
                player_id: 0,
            },
            frames: 0,
            inputs_sent: 0,
            inputs_received: 0,
            checksums_sent: 0,
            final_checksum: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal server side of the handshake for exercising the client alone
    async fn fake_server(reply: ConnectReply) -> (String, tokio::task::JoinHandle<Vec<Vec<u8>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: ConnectRequest =
                deserialize(&read_packet(&mut stream).await.unwrap()).unwrap();
            assert_eq!(request.key, "key");
            let accepted = reply == ConnectReply::Accepted;
            write_packet(&mut stream, &serialize(&reply).unwrap())
                .await
                .unwrap();
            if !accepted {
                return Vec::new();
            }

            let start = Message::StartSimulation(StartSimulation {
                seed: 11,
                target_fps: 20,
                player_id: 1,
            });
            write_packet(&mut stream, &start.to_bytes().unwrap())
                .await
                .unwrap();
            for _ in 0..4 {
                let frame = Message::Frame(vec![vec![0, 1]]).to_bytes().unwrap();
                write_packet(&mut stream, &frame).await.unwrap();
            }

            let mut received = Vec::new();
            while let Ok(packet) = read_packet(&mut stream).await {
                received.push(packet);
            }
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_rejected_connection() {
        let (addr, server) = fake_server(ConnectReply::Rejected {
            reason: RejectReason::RoomFull,
        })
        .await;
        let result = LockstepClient::connect(&addr, "key").await;
        assert!(matches!(
            result,
            Err(ClientError::Rejected(RejectReason::RoomFull))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_bot_plays_frames_and_reports() {
        let (addr, server) = fake_server(ConnectReply::Accepted).await;
        let mut client = LockstepClient::connect(&addr, "key").await.unwrap();
        let options = BotOptions {
            input_every: 2,
            checksum_every: 4,
            max_input_len: 4,
            max_frames: Some(4),
        };

        let report = tokio_test::assert_ok!(client.run_bot(&options).await);
        client.close().await.unwrap();

        assert_eq!(report.start.player_id, 1);
        assert_eq!(report.frames, 4);
        assert_eq!(report.inputs_received, 4);
        assert_eq!(report.inputs_sent, 2);
        assert_eq!(report.checksums_sent, 1);

        let mut expected = FrameHasher::new(11);
        for _ in 0..4 {
            expected.apply_frame(&[vec![0, 1]]);
        }
        assert_eq!(report.final_checksum, expected.value());

        let received = server.await.unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0][0], MessageTag::Input as u8);
        assert_eq!(received[0][1], 1);
        assert_eq!(
            Message::decode(&received[2]).unwrap(),
            Message::Checksum(Checksum {
                frame_number: 4,
                value: expected.value(),
            })
        );
    }

    #[tokio::test]
    async fn test_oversized_input_refused_locally() {
        let (addr, _server) = fake_server(ConnectReply::Accepted).await;
        let mut client = LockstepClient::connect(&addr, "key").await.unwrap();
        let big = vec![0u8; shared::codec::MAX_ARRAY_LEN + 1];
        assert!(matches!(
            client.send_input(&big).await,
            Err(ClientError::Protocol(ProtocolError::PayloadTooLarge { .. }))
        ));
    }
}
