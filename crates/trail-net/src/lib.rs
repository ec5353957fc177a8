//! TCP transport for the trail: framing, message codec, the server with its
//! simulation task and snapshot broadcaster, and the client with
//! reconnection and the front-end adapter.

pub mod adapter;
pub mod broadcast;
pub mod codec;
pub mod compression;
pub mod framing;
pub mod messages;
pub mod platform;
pub mod reconnection;
pub mod simulation;
pub mod tcp_client;
pub mod tcp_server;

pub use adapter::{SyncStats, TrailClient};
pub use broadcast::SnapshotBroadcaster;
pub use codec::{CodecError, WireCodec};
pub use compression::{Compression, CompressionConfig, CompressionError};
pub use framing::{FrameConfig, FrameDecoder, FrameError, read_frame, write_frame};
pub use messages::{Action, Message, MessageError, PROTOCOL_VERSION, Snapshot};
pub use platform::SocketConfig;
pub use reconnection::{ReconnectConfig, ReconnectError, ReconnectState, reconnect_loop};
pub use simulation::{SimulationClosed, SimulationConfig, SimulationHandle};
pub use tcp_client::{ClientConfig, ClientError, ConnectionState, ConnectionStateWatch, GameClient};
pub use tcp_server::{
    BindError, ConnectionId, ConnectionLimitReached, ConnectionMap, DEFAULT_PORT, GameServer,
    IdGenerator, ServerConfig,
};
