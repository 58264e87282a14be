//! Master side of the protocol.
//!
//! The master owns the socket, accepts module connections into a fixed set of
//! slots, broadcasts requests and collects responses. It never blocks for
//! longer than one poll interval waiting on a peer.

pub mod modules;
pub mod slots;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::time::Instant;

use crate::bridge::codec::{self, EncodeError};
use crate::bridge::protocol::{KillReason, Message};
use crate::bridge::transport;
use crate::config::{MAX_SLAVES, MasterConfig};
use crate::version::{PROTOCOL_VERSION, ProtocolVersion};

pub use modules::{ModuleHandle, ModuleRegistry, ModuleSpawner, ProcessSpawner, SpawnError};
pub use slots::{BroadcastReport, SlotRead, SlotTable};

/// How long each slot is polled per pass while collecting responses.
const SLOT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("slot {0} is not connected")]
    NotConnected(usize),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// A decoded frame and the slot it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveResponse {
    pub slot: usize,
    pub message: Message,
}

pub struct Master {
    config: MasterConfig,
    listener: Option<UnixListener>,
    slots: SlotTable,
    modules: ModuleRegistry,
}

impl Master {
    /// Bind the socket and start listening. Any stale socket file is replaced.
    pub async fn bind(config: MasterConfig) -> Result<Self, MasterError> {
        let listener = transport::bind_listener(&config.socket_path, config.backlog).map_err(
            |source| MasterError::Bind {
                path: config.socket_path.clone(),
                source,
            },
        )?;

        tracing::info!(path = %config.socket_path.display(), "Master listening");

        let modules = ModuleRegistry::new(&config.socket_path);
        Ok(Self {
            config,
            listener: Some(listener),
            slots: SlotTable::new(MAX_SLAVES),
            modules,
        })
    }

    /// Start modules through `spawner` instead of plain process launches.
    /// Must be called before any module is spawned.
    pub fn with_spawner(mut self, spawner: Arc<dyn ModuleSpawner>) -> Self {
        self.modules = ModuleRegistry::with_spawner(&self.config.socket_path, spawner);
        self
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Number of connected modules.
    pub fn connected(&self) -> usize {
        self.slots.len()
    }

    /// Connected slot indices, ascending.
    pub fn slot_indices(&self) -> Vec<usize> {
        self.slots.indices()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Accept every pending connection, one per accept-timeout poll, until
    /// a poll times out or all slots are taken.
    ///
    /// Returns how many connections were accepted.
    pub async fn accept_pending(&mut self) -> usize {
        let Some(listener) = self.listener.as_ref() else {
            return 0;
        };

        let mut accepted = 0;
        while !self.slots.is_full() {
            match tokio::time::timeout(self.config.accept_timeout, listener.accept()).await {
                Err(_) => break,
                Ok(Ok((stream, _addr))) => {
                    let (reader, writer) = stream.into_split();
                    if let Some(slot) = self.slots.insert(reader, writer) {
                        tracing::debug!(slot, connected = self.slots.len(), "Accepted module");
                        accepted += 1;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }

        if self.slots.is_full() {
            tracing::trace!("All slots in use, leaving further connections queued");
        }
        accepted
    }

    /// Accept pending connections, then send `message` to every slot in
    /// ascending order. Slots whose write fails are closed.
    ///
    /// The frame is encoded once; an oversized message is rejected before
    /// anything is written.
    pub async fn broadcast(&mut self, message: &Message) -> Result<BroadcastReport, MasterError> {
        let frame = codec::encode(message)?;
        self.accept_pending().await;

        let report = self.slots.broadcast_frame(&frame).await;
        tracing::debug!(
            message = message.name(),
            delivered = report.delivered.len(),
            evicted = report.evicted.len(),
            "Broadcast"
        );
        Ok(report)
    }

    /// Send one message to one slot. Returns false if the write failed and
    /// the slot was closed.
    pub async fn send_to(&mut self, slot: usize, message: &Message) -> Result<bool, MasterError> {
        let frame = codec::encode(message)?;
        if !self.slots.contains(slot) {
            return Err(MasterError::NotConnected(slot));
        }
        Ok(self.slots.write_frame(slot, &frame).await)
    }

    /// Gather frames from every slot for `window`.
    ///
    /// New connections are accepted along the way. A `ConnectRequest` with an
    /// incompatible major version is answered with `Kill(VersionMismatch)`
    /// and the slot is closed; compatible handshakes are not returned. Closed
    /// or failing slots are dropped, as are slots sending undecodable frames.
    pub async fn collect_responses(&mut self, window: Duration) -> Vec<SlaveResponse> {
        let deadline = Instant::now() + window;
        let mut responses = Vec::new();

        loop {
            self.accept_pending().await;

            for slot in self.slots.indices() {
                match self.slots.read_frame(slot, SLOT_POLL).await {
                    SlotRead::Empty => {}
                    SlotRead::Frame(frame) => match codec::decode(&frame) {
                        Ok(Message::ConnectRequest { version }) => {
                            self.check_version(slot, version).await;
                        }
                        Ok(message) => {
                            tracing::debug!(slot, message = message.name(), "Received");
                            responses.push(SlaveResponse { slot, message });
                        }
                        Err(e) => {
                            tracing::warn!(slot, error = %e, "Undecodable frame, dropping module connection");
                            self.slots.remove(slot);
                        }
                    },
                    SlotRead::Closed => {
                        tracing::debug!(slot, "Module disconnected");
                        self.slots.remove(slot);
                    }
                    SlotRead::Failed(e) => {
                        tracing::warn!(slot, error = %e, "Read failed, dropping module connection");
                        self.slots.remove(slot);
                    }
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        responses
    }

    async fn check_version(&mut self, slot: usize, version: ProtocolVersion) {
        if version.is_compatible_with(&PROTOCOL_VERSION) {
            tracing::debug!(slot, %version, "Module handshake");
            return;
        }

        tracing::warn!(
            slot,
            %version,
            expected = %PROTOCOL_VERSION,
            "Protocol version mismatch, killing module"
        );
        match codec::encode(&Message::kill(KillReason::VersionMismatch)) {
            Ok(frame) => {
                self.slots.write_frame(slot, &frame).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode kill"),
        }
        self.slots.remove(slot);
    }

    /// Launch a module executable with the next spawn index.
    pub fn spawn_module(&mut self, executable: &Path) -> Result<u32, MasterError> {
        Ok(self.modules.spawn_module(executable)?)
    }

    /// Launch every enabled module from the session config. Failures are
    /// logged and skipped.
    pub fn spawn_configured_modules(&mut self) -> Vec<u32> {
        let executables: Vec<PathBuf> = self
            .config
            .enabled_modules()
            .map(|m| m.executable.clone())
            .collect();

        executables
            .iter()
            .filter_map(|path| match self.modules.spawn_module(path) {
                Ok(index) => Some(index),
                Err(e) => {
                    tracing::error!(error = %e, "Module failed to start");
                    None
                }
            })
            .collect()
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// SIGTERM every spawned module still alive.
    pub fn terminate_all(&mut self) -> usize {
        self.modules.terminate_all()
    }

    /// Close every slot, stop listening and remove the socket file.
    /// Safe to call more than once.
    pub fn cleanup(&mut self) {
        self.slots.clear();
        if self.listener.take().is_some() {
            match transport::remove_socket_file(&self.config.socket_path) {
                Ok(_) => tracing::debug!(path = %self.config.socket_path.display(), "Socket removed"),
                Err(e) => tracing::warn!(error = %e, "Failed to remove socket file"),
            }
        }
    }

    /// Orderly end of session: broadcast `Kill(Finish)`, give modules the
    /// grace period to exit, signal stragglers and clean up.
    pub async fn shutdown(&mut self) -> Result<(), MasterError> {
        if self.listener.is_some() {
            self.broadcast(&Message::kill(KillReason::Finish)).await?;
        }

        if !self.modules.is_empty() && !self.modules.wait_all(self.config.grace_period).await {
            tracing::info!("Modules still running after grace period");
        }
        let signalled = self.modules.terminate_all();
        if signalled > 0 {
            tracing::info!(signalled, "Terminated modules");
        }

        self.cleanup();
        Ok(())
    }
}

impl Drop for Master {
    fn drop(&mut self) {
        self.cleanup();
    }
}
