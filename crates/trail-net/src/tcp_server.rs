//! TCP server: accepts players, decodes their actions, and keeps the live
//! connection registry the broadcaster pushes snapshots through.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock, watch};

use crate::broadcast::SnapshotBroadcaster;
use crate::codec::WireCodec;
use crate::messages::{Action, Message};
use crate::platform::{SocketConfig, configure_stream, create_listener};
use crate::simulation::SimulationHandle;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 50000;

/// Size of each socket read.
const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// Identifies one accepted connection for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Hands out increasing [`ConnectionId`]s starting at 1.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ConnectionMap
// ---------------------------------------------------------------------------

/// Shared writer half of a connection.
pub type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// The registry is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection limit of {0} reached")]
pub struct ConnectionLimitReached(pub usize);

/// Why a connection may not act as a given player.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// Another live connection already plays under this name.
    #[error("player {0:?} is already connected")]
    NameInUse(String),
    /// This connection already plays under a different name.
    #[error("connection already bound to player {0:?}")]
    AlreadyBound(String),
    /// The connection is no longer registered.
    #[error("connection is not registered")]
    UnknownConnection,
}

struct ConnectionEntry {
    peer: SocketAddr,
    writer: SharedWriter,
    player: Option<String>,
    kick: watch::Sender<bool>,
}

/// Live connections keyed by [`ConnectionId`]. Accept, teardown and
/// broadcast all go through this one lock.
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    max_connections: usize,
}

impl ConnectionMap {
    /// Creates an empty registry holding at most `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Registers a connection. The returned receiver flips to `true` when
    /// the connection is removed by someone else (e.g. a failed broadcast).
    pub async fn insert(
        &self,
        id: ConnectionId,
        peer: SocketAddr,
        writer: OwnedWriteHalf,
    ) -> Result<watch::Receiver<bool>, ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached(self.max_connections));
        }
        let (kick, kicked) = watch::channel(false);
        map.insert(
            id,
            ConnectionEntry {
                peer,
                writer: Arc::new(Mutex::new(writer)),
                player: None,
                kick,
            },
        );
        Ok(kicked)
    }

    /// Unregisters a connection, releasing its player name and signalling
    /// its reader to stop. Returns `false` if it was already gone.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let Some(entry) = self.inner.write().await.remove(&id) else {
            return false;
        };
        let _ = entry.kick.send(true);
        tracing::debug!(
            "Removed connection {id:?} ({}, player {:?})",
            entry.peer,
            entry.player
        );
        true
    }

    /// Removes every connection.
    pub async fn clear(&self) {
        let drained: Vec<_> = self.inner.write().await.drain().collect();
        for (_, entry) in drained {
            let _ = entry.kick.send(true);
        }
    }

    /// Binds `id` to `player`. Idempotent for the same name.
    pub async fn bind_player(&self, id: ConnectionId, player: &str) -> Result<(), BindError> {
        let mut map = self.inner.write().await;
        let taken = map
            .iter()
            .any(|(other, entry)| *other != id && entry.player.as_deref() == Some(player));
        let entry = map.get_mut(&id).ok_or(BindError::UnknownConnection)?;
        match &entry.player {
            Some(bound) if bound == player => Ok(()),
            Some(bound) => Err(BindError::AlreadyBound(bound.clone())),
            None if taken => Err(BindError::NameInUse(player.to_string())),
            None => {
                tracing::info!("Connection {id:?} plays as {player}");
                entry.player = Some(player.to_string());
                Ok(())
            }
        }
    }

    /// The player bound to `id`, if any.
    pub async fn player_of(&self, id: ConnectionId) -> Option<String> {
        self.inner.read().await.get(&id)?.player.clone()
    }

    /// Writers of every live connection, for broadcasting outside the lock.
    pub async fn writers(&self) -> Vec<(ConnectionId, SharedWriter)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.writer)))
            .collect()
    }

    /// Returns whether `id` is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns whether no connection is live.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Configuration for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Default: `0.0.0.0:50000`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 64.
    pub max_connections: usize,
    /// Snapshot cadence. Default: 100 ms.
    pub snapshot_interval: Duration,
    /// Per-connection write deadline for a snapshot. Default: 2 s.
    pub write_timeout: Duration,
    /// Wire encoding.
    pub codec: WireCodec,
    /// Socket options.
    pub socket: SocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 64,
            snapshot_interval: Duration::from_millis(100),
            write_timeout: Duration::from_secs(2),
            codec: WireCodec::default(),
            socket: SocketConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// GameServer
// ---------------------------------------------------------------------------

/// Accepts players, forwards their actions to the simulation, and runs the
/// snapshot broadcaster.
pub struct GameServer {
    config: ServerConfig,
    /// Live connections (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    simulation: SimulationHandle,
    id_gen: IdGenerator,
    shutdown_tx: watch::Sender<bool>,
}

impl GameServer {
    /// Creates a server feeding `simulation`.
    pub fn new(config: ServerConfig, simulation: SimulationHandle) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            config,
            simulation,
            id_gen: IdGenerator::new(),
            shutdown_tx,
        }
    }

    /// Binds the configured address. This is the only fatal server error.
    pub fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = create_listener(self.config.bind_addr, &self.config.socket)?;
        tracing::info!("Server listening on {}", self.config.bind_addr);
        Ok(listener)
    }

    /// Binds and serves until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = self.bind()?;
        self.run_with_listener(listener).await;
        Ok(())
    }

    /// Serves on a pre-bound listener until [`shutdown`](Self::shutdown).
    pub async fn run_with_listener(&self, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let broadcaster = SnapshotBroadcaster::new(
            Arc::clone(&self.connections),
            self.simulation.clone(),
            self.config.codec.clone(),
            self.config.snapshot_interval,
            self.config.write_timeout,
        );
        let broadcast_task = tokio::spawn(broadcaster.run(self.shutdown_tx.subscribe()));

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        if let Err(e) = configure_stream(&stream, &self.config.socket) {
                            tracing::warn!("Could not tune socket for {peer}: {e}");
                        }
                        let (reader, writer) = stream.into_split();
                        self.admit(peer, reader, writer).await;
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Server shutting down");
        self.connections.clear().await;
        let _ = broadcast_task.await;
    }

    /// Signals the accept loop, the broadcaster and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn admit(&self, peer: SocketAddr, reader: OwnedReadHalf, writer: OwnedWriteHalf) {
        let id = self.id_gen.next_id();
        let kicked = match self.connections.insert(id, peer, writer).await {
            Ok(kicked) => kicked,
            Err(e) => {
                tracing::warn!("Rejecting {peer}: {e}");
                return;
            }
        };
        tracing::info!("Accepted connection {id:?} from {peer}");

        let connection = Connection {
            id,
            connections: Arc::clone(&self.connections),
            simulation: self.simulation.clone(),
            codec: self.config.codec.clone(),
        };
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            connection.serve(reader, kicked, shutdown).await;
            let player = connection.connections.player_of(connection.id).await;
            connection.connections.remove(connection.id).await;
            match player {
                Some(name) => tracing::info!("{name} left (connection {:?})", connection.id),
                None => tracing::info!("Connection {:?} closed", connection.id),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Per-connection reader
// ---------------------------------------------------------------------------

struct Connection {
    id: ConnectionId,
    connections: Arc<ConnectionMap>,
    simulation: SimulationHandle,
    codec: WireCodec,
}

impl Connection {
    async fn serve(
        &self,
        mut reader: OwnedReadHalf,
        mut kicked: watch::Receiver<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let id = self.id;
        let mut decoder = self.codec.decoder();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => {
                        if !self.handle_frame(&frame).await {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Dropping connection {id:?}: {e}");
                        return;
                    }
                }
            }

            tokio::select! {
                result = reader.read(&mut chunk) => match result {
                    Ok(0) => return,
                    Ok(n) => decoder.extend(&chunk[..n]),
                    Err(e) => {
                        tracing::debug!("Connection {id:?} lost: {e}");
                        return;
                    }
                },
                _ = kicked.changed() => return,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Returns `false` when the connection should close.
    async fn handle_frame(&self, frame: &[u8]) -> bool {
        if frame.is_empty() {
            return true;
        }
        match self.codec.decode(frame) {
            Ok(Message::Action(action)) => self.handle_action(action).await,
            Ok(Message::Snapshot(_)) => {
                tracing::warn!("Connection {:?} sent a snapshot; ignoring", self.id);
                true
            }
            Err(e) => {
                tracing::warn!("Malformed message from {:?}: {e}", self.id);
                true
            }
        }
    }

    async fn handle_action(&self, action: Action) -> bool {
        if let Err(e) = self.connections.bind_player(self.id, &action.player).await {
            tracing::warn!("Dropping action from {:?}: {e}", self.id);
            return true;
        }
        match self.simulation.apply(action).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("{e}; closing connection {:?}", self.id);
                false
            }
        }
    }
}
