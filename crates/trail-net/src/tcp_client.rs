//! TCP client for a trail server.
//!
//! [`GameClient`] owns one connection. A background reader decodes
//! snapshots and publishes the newest one through a [`watch`] channel, so
//! the render loop can read it at any rate without blocking on the network.
//! A keepalive task sends empty frames so an idle player's connection is
//! not mistaken for a dead one.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use trail_multiplayer::PlayerCommand;

use crate::codec::{CodecError, WireCodec};
use crate::framing::encode_frame;
use crate::messages::{Action, Message, Snapshot};
use crate::platform::{SocketConfig, configure_stream};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to establish a TCP connection.
    Connecting,
    /// TCP connection established, ready for communication.
    Connected,
    /// Connection lost or intentionally closed.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Creates a watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Sets the state, notifying subscribers only on an actual change.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// A new subscriber.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// The current state.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Wire encoding; must match the server's frame limit.
    pub codec: WireCodec,
    /// Socket options.
    pub socket: SocketConfig,
    /// How often an empty keepalive frame is sent; `None` disables it.
    /// Default: 5 s.
    pub keepalive_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            codec: WireCodec::default(),
            socket: SocketConfig::default(),
            keepalive_interval: Some(Duration::from_secs(5)),
        }
    }
}

/// Client-side failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting or writing failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An outgoing action could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The connection is closed.
    #[error("not connected")]
    Disconnected,
    /// An action name the game does not know.
    #[error("unknown action {0:?}")]
    UnknownAction(String),
}

type LatestSnapshot = watch::Receiver<Option<Arc<Snapshot>>>;

/// Handle to one server connection, acting as one named player.
pub struct GameClient {
    player: String,
    codec: WireCodec,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    state: Arc<ConnectionStateWatch>,
    snapshots: LatestSnapshot,
    shutdown_tx: watch::Sender<bool>,
}

impl GameClient {
    /// Connects to `addr` as `player`. Returns once the TCP handshake is
    /// done; the first snapshot arrives asynchronously.
    pub async fn connect(
        addr: SocketAddr,
        player: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let state = Arc::new(ConnectionStateWatch::new());
        state.set(ConnectionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        configure_stream(&stream, &config.socket)?;
        state.set(ConnectionState::Connected);
        tracing::info!("Connected to {addr}");

        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (snapshot_tx, snapshots) = watch::channel(None);

        tokio::spawn(read_loop(
            reader,
            config.codec.clone(),
            snapshot_tx,
            Arc::clone(&state),
            shutdown_rx.clone(),
        ));

        if let Some(period) = config.keepalive_interval {
            tokio::spawn(keepalive_loop(
                Arc::clone(&writer),
                period,
                Arc::clone(&state),
                shutdown_rx,
            ));
        }

        Ok(Self {
            player: player.into(),
            codec: config.codec,
            writer,
            state,
            snapshots,
            shutdown_tx,
        })
    }

    /// The name this client plays as.
    pub fn player_name(&self) -> &str {
        &self.player
    }

    /// The connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Returns whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.state.current() == ConnectionState::Connected
    }

    /// Sends `command` for this client's player.
    pub async fn submit(&self, command: PlayerCommand) -> Result<(), ClientError> {
        self.send_action(Action::new(self.player.clone(), command))
            .await
    }

    /// Sends `command` with the skill levels the client believes it has.
    /// The server records them but decides outcomes with its own values.
    pub async fn submit_with_skills(
        &self,
        command: PlayerCommand,
        skills: BTreeMap<String, i32>,
    ) -> Result<(), ClientError> {
        let mut action = Action::new(self.player.clone(), command);
        action.skills = Some(skills);
        self.send_action(action).await
    }

    async fn send_action(&self, action: Action) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }
        let frame = self.codec.encode_frame(&Message::Action(action))?;
        let mut writer = self.writer.lock().await;
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            self.state.set(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// The newest snapshot received, if any.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every new snapshot.
    pub fn subscribe_snapshots(&self) -> LatestSnapshot {
        self.snapshots.clone()
    }

    /// Stops the background tasks and marks the client disconnected.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        self.state.set(ConnectionState::Disconnected);
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    codec: WireCodec,
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
    state: Arc<ConnectionStateWatch>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut decoder = codec.decoder();
    let mut chunk = vec![0u8; 16 * 1024];

    'connection: loop {
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) if frame.is_empty() => {}
                Ok(Some(frame)) => match codec.decode(&frame) {
                    Ok(Message::Snapshot(snapshot)) => {
                        snapshots.send_replace(Some(Arc::new(snapshot)));
                    }
                    Ok(Message::Action(_)) => {
                        tracing::debug!("Ignoring action message from server");
                    }
                    Err(e) => tracing::warn!("Bad snapshot, keeping the previous one: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Server stream unusable: {e}");
                    break 'connection;
                }
            }
        }

        tokio::select! {
            result = reader.read(&mut chunk) => match result {
                Ok(0) => {
                    tracing::info!("Server closed the connection");
                    break;
                }
                Ok(n) => decoder.extend(&chunk[..n]),
                Err(e) => {
                    tracing::warn!("Connection lost: {e}");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    state.set(ConnectionState::Disconnected);
}

async fn keepalive_loop(
    writer: Arc<Mutex<OwnedWriteHalf>>,
    period: Duration,
    state: Arc<ConnectionStateWatch>,
    mut shutdown: watch::Receiver<bool>,
) {
    // A zero-length payload never exceeds any frame limit.
    let Ok(keepalive) = encode_frame(&[], &Default::default()) else {
        return;
    };
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + period,
        period.max(Duration::from_millis(1)),
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.current() != ConnectionState::Connected {
                    break;
                }
                let mut w = writer.lock().await;
                if w.write_all(&keepalive).await.is_err() {
                    state.set(ConnectionState::Disconnected);
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use trail_multiplayer::GameState;

    /// A server that sends the given payloads as frames, then idles.
    async fn scripted_server(payloads: Vec<Vec<u8>>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for payload in payloads {
                let frame = encode_frame(&payload, &Default::default()).unwrap();
                stream.write_all(&frame).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let mut sink = [0u8; 1024];
            while stream.read(&mut sink).await.map(|n| n > 0).unwrap_or(false) {}
        });
        addr
    }

    fn snapshot_with(name: &str, position: u32) -> Snapshot {
        let mut state = GameState::default();
        state.player_or_insert(name).position = position;
        Snapshot::from(&state)
    }

    async fn wait_for_snapshot(client: &GameClient, position: u32) {
        let mut rx = client.subscribe_snapshots();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let done = rx
                    .borrow_and_update()
                    .as_ref()
                    .and_then(|s| s.player("Alice").map(|p| p.position))
                    == Some(position);
                if done {
                    break;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connection_state_transitions() {
        let watch = ConnectionStateWatch::new();
        assert_eq!(watch.current(), ConnectionState::Disconnected);
        watch.set(ConnectionState::Connecting);
        assert_eq!(watch.current(), ConnectionState::Connecting);
        watch.set(ConnectionState::Connected);
        assert_eq!(watch.current(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_latest_snapshot_replaces_previous() {
        let codec = WireCodec::default();
        let first = codec
            .encode(&Message::Snapshot(snapshot_with("Alice", 3)))
            .unwrap();
        let second = codec
            .encode(&Message::Snapshot(snapshot_with("Alice", 4)))
            .unwrap();
        let addr = scripted_server(vec![first, second]).await;

        let client = GameClient::connect(addr, "Alice", ClientConfig::default())
            .await
            .unwrap();
        assert_eq!(client.player_name(), "Alice");
        wait_for_snapshot(&client, 4).await;
    }

    #[tokio::test]
    async fn test_bad_frame_keeps_last_snapshot() {
        let codec = WireCodec::default();
        let good = codec
            .encode(&Message::Snapshot(snapshot_with("Alice", 7)))
            .unwrap();
        let addr = scripted_server(vec![good, vec![0x00, 0x01, 0xEE], Vec::new()]).await;

        let client = GameClient::connect(addr, "Alice", ClientConfig::default())
            .await
            .unwrap();
        wait_for_snapshot(&client, 7).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let latest = client.latest_snapshot().unwrap();
        assert_eq!(latest.player("Alice").unwrap().position, 7);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_server_close_marks_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let client = GameClient::connect(addr, "Alice", ClientConfig::default())
            .await
            .unwrap();
        let mut rx = client.state().subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(
            client.submit(PlayerCommand::Move).await,
            Err(ClientError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_submit_sends_framed_action() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            WireCodec::default().recv(&mut stream).await.unwrap()
        });

        let client = GameClient::connect(addr, "Alice", ClientConfig::default())
            .await
            .unwrap();
        client
            .submit_with_skills(PlayerCommand::Hunt, BTreeMap::from([("hunting".into(), 9)]))
            .await
            .unwrap();

        let Message::Action(action) = server.await.unwrap() else {
            panic!("expected an action");
        };
        assert_eq!(action.player, "Alice");
        assert_eq!(action.command, PlayerCommand::Hunt);
        assert_eq!(action.skills.unwrap().get("hunting"), Some(&9));
    }

    #[tokio::test]
    async fn test_keepalive_frames_are_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            crate::framing::read_frame(&mut stream, &Default::default())
                .await
                .unwrap()
        });

        let _client = GameClient::connect(
            addr,
            "Alice",
            ClientConfig {
                keepalive_interval: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_is_immediate() {
        let addr = scripted_server(Vec::new()).await;
        let client = GameClient::connect(addr, "Alice", ClientConfig::default())
            .await
            .unwrap();
        assert!(client.is_connected());
        client.disconnect();
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_refused_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = GameClient::connect(addr, "Alice", ClientConfig::default()).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
