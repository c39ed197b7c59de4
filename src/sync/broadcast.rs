//! Ephemeral snapshot broadcast over UDP multicast.
//!
//! The low-latency path: fire-and-forget publish of every sample, no
//! persistence, no delivery guarantee. Receivers drop their own messages,
//! foreign sessions, and any sample that does not advance the sender's
//! sequence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::protocol::{SyncMessage, MAX_MESSAGE_SIZE};
use crate::session::types::SessionStatus;
use crate::telemetry::types::RunSample;

/// Default multicast address for snapshot broadcast.
pub const MULTICAST_ADDR: &str = "239.255.77.77";

/// Default port for snapshot broadcast.
pub const BROADCAST_PORT: u16 = 7881;

/// An event received on the ephemeral channel.
#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    /// A partner sample that advanced its sender's sequence.
    Sample {
        participant_id: Uuid,
        sample: RunSample,
    },
    /// A partner announced a terminal transition.
    Ended {
        participant_id: Uuid,
        status: SessionStatus,
    },
}

/// Per-sender monotonic sequence filter.
///
/// The channel has no ordering guarantee; a sample is accepted only if its
/// sequence strictly exceeds the last accepted one for that sender.
#[derive(Debug, Default)]
pub struct SequenceGate {
    last_accepted: Mutex<HashMap<Uuid, u64>>,
}

impl SequenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `sequence` for `sender` if it advances; duplicates and
    /// reordered stragglers return false.
    pub fn accept(&self, sender: Uuid, sequence: u64) -> bool {
        let mut last = self.last_accepted.lock().unwrap();
        match last.get(&sender) {
            Some(&prev) if sequence <= prev => false,
            _ => {
                last.insert(sender, sequence);
                true
            }
        }
    }
}

/// The ephemeral broadcast path for one session.
pub struct SnapshotBroadcast {
    session_id: Option<Uuid>,
    local_participant_id: Uuid,
    socket: Option<Arc<UdpSocket>>,
    port: u16,
    event_tx: broadcast::Sender<BroadcastEvent>,
    running: Arc<AtomicBool>,
}

impl SnapshotBroadcast {
    /// Create a broadcast path for the local participant.
    pub fn new(local_participant_id: Uuid) -> Self {
        let (tx, _) = broadcast::channel(256);

        Self {
            session_id: None,
            local_participant_id,
            socket: None,
            port: BROADCAST_PORT,
            event_tx: tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the broadcast path for `session_id`, binding on `port`.
    pub async fn start(&mut self, session_id: Uuid, port: u16) -> Result<(), BroadcastError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(BroadcastError::AlreadyRunning);
        }

        self.session_id = Some(session_id);
        self.port = port;

        let socket = UdpSocket::bind(format!("0.0.0.0:{}", port))
            .await
            .map_err(|e| BroadcastError::BindFailed(e.to_string()))?;

        let multicast_addr: std::net::Ipv4Addr = MULTICAST_ADDR
            .parse()
            .map_err(|_| BroadcastError::BindFailed(format!("bad multicast addr {}", MULTICAST_ADDR)))?;
        socket
            .join_multicast_v4(multicast_addr, std::net::Ipv4Addr::UNSPECIFIED)
            .map_err(|e| BroadcastError::MulticastFailed(e.to_string()))?;

        let socket = Arc::new(socket);
        self.socket = Some(Arc::clone(&socket));
        self.running.store(true, Ordering::SeqCst);

        // Receive loop
        let event_tx = self.event_tx.clone();
        let local_participant_id = self.local_participant_id;
        let running = Arc::clone(&self.running);
        let expected_session_id = session_id;

        tokio::spawn(async move {
            let gate = SequenceGate::new();
            let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

            while running.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf).await {
                    Ok((len, _addr)) => {
                        let msg = match SyncMessage::from_bytes(&buf[..len]) {
                            Ok(msg) => msg,
                            Err(_) => continue,
                        };

                        // Ignore our own messages and wrong sessions
                        if msg.participant_id() == local_participant_id
                            || msg.session_id() != expected_session_id
                        {
                            continue;
                        }

                        match msg {
                            SyncMessage::SnapshotUpdate {
                                participant_id,
                                sample,
                                ..
                            } => {
                                if !gate.accept(participant_id, sample.sequence) {
                                    continue;
                                }

                                let _ = event_tx.send(BroadcastEvent::Sample {
                                    participant_id,
                                    sample,
                                });
                            }

                            SyncMessage::SessionEnded {
                                participant_id,
                                status,
                                ..
                            } => {
                                let _ = event_tx.send(BroadcastEvent::Ended {
                                    participant_id,
                                    status,
                                });
                            }
                        }
                    }
                    Err(e) => {
                        if running.load(Ordering::SeqCst) {
                            tracing::warn!("UDP receive error: {}", e);
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the broadcast path and drop the socket.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.socket = None;
        self.session_id = None;
    }

    /// Fire-and-forget publish of the local participant's latest sample.
    pub async fn publish(&self, sample: RunSample) -> Result<(), BroadcastError> {
        let msg = SyncMessage::SnapshotUpdate {
            session_id: self.session_id.ok_or(BroadcastError::NotRunning)?,
            participant_id: self.local_participant_id,
            sample,
        };

        self.send(msg).await
    }

    /// Fire-and-forget notice that the session reached a terminal state.
    pub async fn publish_ended(&self, status: SessionStatus) -> Result<(), BroadcastError> {
        let msg = SyncMessage::SessionEnded {
            session_id: self.session_id.ok_or(BroadcastError::NotRunning)?,
            participant_id: self.local_participant_id,
            status,
        };

        self.send(msg).await
    }

    async fn send(&self, msg: SyncMessage) -> Result<(), BroadcastError> {
        let socket = self.socket.as_ref().ok_or(BroadcastError::NotRunning)?;

        let bytes = msg
            .to_bytes()
            .map_err(|e| BroadcastError::SerializeFailed(e.to_string()))?;

        let multicast_addr = format!("{}:{}", MULTICAST_ADDR, self.port);
        socket
            .send_to(&bytes, &multicast_addr)
            .await
            .map_err(|e| BroadcastError::SendFailed(e.to_string()))?;

        Ok(())
    }

    /// Subscribe to partner events received on this path.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.event_tx.subscribe()
    }

    /// Check if running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Broadcast path errors.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Already running")]
    AlreadyRunning,

    #[error("Not running")]
    NotRunning,

    #[error("Failed to bind: {0}")]
    BindFailed(String),

    #[error("Failed to join multicast: {0}")]
    MulticastFailed(String),

    #[error("Failed to serialize: {0}")]
    SerializeFailed(String),

    #[error("Failed to send: {0}")]
    SendFailed(String),
}
