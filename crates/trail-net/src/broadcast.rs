//! Periodic snapshot fan-out.
//!
//! Every tick the broadcaster asks the simulation task for a snapshot,
//! encodes it once, and writes the same frame to every live connection in
//! parallel. A connection whose write fails or exceeds the write deadline is
//! removed; the others are unaffected.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::codec::WireCodec;
use crate::messages::Message;
use crate::simulation::SimulationHandle;
use crate::tcp_server::{ConnectionId, ConnectionMap};

/// Pushes the canonical state to every connection at a fixed cadence.
pub struct SnapshotBroadcaster {
    connections: Arc<ConnectionMap>,
    simulation: SimulationHandle,
    codec: WireCodec,
    interval: Duration,
    write_timeout: Duration,
}

impl SnapshotBroadcaster {
    /// Creates a broadcaster. Nothing is sent until [`run`](Self::run).
    pub fn new(
        connections: Arc<ConnectionMap>,
        simulation: SimulationHandle,
        codec: WireCodec,
        interval: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            simulation,
            codec,
            interval,
            write_timeout,
        }
    }

    /// Broadcasts every interval until `shutdown` turns `true` or the
    /// simulation stops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.broadcast_once().await.is_none() {
                        tracing::warn!("Simulation stopped; broadcaster exiting");
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

    /// Sends one snapshot to every connection. Returns how many received
    /// it, or `None` if the simulation is gone.
    pub async fn broadcast_once(&self) -> Option<usize> {
        let snapshot = self.simulation.snapshot().await.ok()?;
        let writers = self.connections.writers().await;
        if writers.is_empty() {
            return Some(0);
        }

        let frame = match self.codec.encode_frame(&Message::Snapshot(snapshot)) {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                tracing::error!("Could not encode snapshot: {e}");
                return Some(0);
            }
        };

        let mut writes = JoinSet::new();
        for (id, writer) in writers {
            let frame = Arc::clone(&frame);
            let deadline = self.write_timeout;
            writes.spawn(async move {
                let write = async {
                    let mut writer = writer.lock().await;
                    writer.write_all(&frame).await?;
                    writer.flush().await
                };
                let result = match tokio::time::timeout(deadline, write).await {
                    Ok(result) => result,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "snapshot write timed out",
                    )),
                };
                (id, result)
            });
        }

        let mut delivered = 0;
        let mut failed: Vec<ConnectionId> = Vec::new();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((id, Err(e))) => {
                    tracing::warn!("Snapshot to {id:?} failed: {e}; dropping connection");
                    failed.push(id);
                }
                Err(e) => tracing::error!("Snapshot write task failed: {e}"),
            }
        }
        for id in failed {
            self.connections.remove(id).await;
        }
        Some(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tokio::net::{TcpListener, TcpStream};
    use trail_multiplayer::{AuthoritativeSimulator, GameState, PlayerCommand, SimulationRules};

    use crate::messages::Action;
    use crate::simulation::SimulationConfig;

    struct Fixture {
        connections: Arc<ConnectionMap>,
        simulation: SimulationHandle,
        listener: TcpListener,
        _shutdown: watch::Sender<bool>,
    }

    async fn fixture() -> Fixture {
        let rules = SimulationRules {
            event_probability: 0.0,
            windfall_probability: 0.0,
            ..SimulationRules::default()
        };
        let sim = AuthoritativeSimulator::with_rng(GameState::default(), rules, StdRng::seed_from_u64(5));
        let (shutdown, rx) = watch::channel(false);
        let (simulation, _) = SimulationHandle::spawn(sim, SimulationConfig::default(), rx);
        Fixture {
            connections: Arc::new(ConnectionMap::new(16)),
            simulation,
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            _shutdown: shutdown,
        }
    }

    /// Registers the server side of a fresh loopback connection and returns
    /// the client side.
    async fn connect(f: &Fixture, id: u64) -> TcpStream {
        let client = TcpStream::connect(f.listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server_side, peer) = f.listener.accept().await.unwrap();
        let (_, writer) = server_side.into_split();
        f.connections
            .insert(ConnectionId(id), peer, writer)
            .await
            .unwrap();
        client
    }

    fn broadcaster(f: &Fixture) -> SnapshotBroadcaster {
        SnapshotBroadcaster::new(
            Arc::clone(&f.connections),
            f.simulation.clone(),
            WireCodec::default(),
            Duration::from_millis(10),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_every_client_receives_identical_snapshot() {
        let f = fixture().await;
        f.simulation
            .apply(Action::new("Alice", PlayerCommand::Move))
            .await
            .unwrap()
            .unwrap();
        let mut a = connect(&f, 1).await;
        let mut b = connect(&f, 2).await;

        assert_eq!(broadcaster(&f).broadcast_once().await, Some(2));

        let codec = WireCodec::default();
        let from_a = codec.recv(&mut a).await.unwrap();
        let from_b = codec.recv(&mut b).await.unwrap();
        assert_eq!(from_a, from_b);
        let Message::Snapshot(snapshot) = from_a else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.player("Alice").unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_no_connections_is_a_no_op() {
        let f = fixture().await;
        assert_eq!(broadcaster(&f).broadcast_once().await, Some(0));
    }

    #[tokio::test]
    async fn test_dead_connection_is_removed_and_others_still_served() {
        let f = fixture().await;
        let dead = connect(&f, 1).await;
        let mut alive = connect(&f, 2).await;
        drop(dead);
        let b = broadcaster(&f);

        // The first write into a reset socket may still succeed; a few
        // rounds are enough for the failure to surface.
        for _ in 0..20 {
            b.broadcast_once().await;
            if f.connections.len().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.connections.len().await, 1);
        assert!(f.connections.contains(ConnectionId(2)).await);
        assert!(WireCodec::default().recv(&mut alive).await.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_reader_times_out_and_others_still_served() {
        let f = fixture().await;
        for i in 0..200 {
            f.simulation
                .apply(Action::new(format!("Traveler {i}"), PlayerCommand::Rest))
                .await
                .unwrap()
                .unwrap();
        }
        // Never read from: its socket buffers fill and writes stall.
        let _stalled = connect(&f, 1).await;
        let mut alive = connect(&f, 2).await;

        let received = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        tokio::spawn(async move {
            let codec = WireCodec::default();
            while codec.recv(&mut alive).await.is_ok() {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        });

        let plain = WireCodec::new(
            crate::framing::FrameConfig::default(),
            crate::compression::CompressionConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let b = SnapshotBroadcaster::new(
            Arc::clone(&f.connections),
            f.simulation.clone(),
            plain,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );

        let removed = tokio::time::timeout(Duration::from_secs(20), async {
            while f.connections.contains(ConnectionId(1)).await {
                b.broadcast_once().await;
            }
        })
        .await;
        assert!(removed.is_ok(), "stalled connection was never removed");
        assert!(f.connections.contains(ConnectionId(2)).await);

        let before = received.load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(b.broadcast_once().await, Some(1));
        let start = tokio::time::Instant::now();
        while received.load(std::sync::atomic::Ordering::SeqCst) <= before {
            assert!(start.elapsed() < Duration::from_secs(2), "reader stopped receiving");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let f = fixture().await;
        let mut client = connect(&f, 1).await;
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(broadcaster(&f).run(stop_rx));

        assert!(WireCodec::default().recv(&mut client).await.is_ok());
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
