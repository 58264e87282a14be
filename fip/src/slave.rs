//! Module side of the protocol.
//!
//! A module process connects back to the master's socket, announces its
//! protocol version, then polls for requests until it is told to stop.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{self, CodecError, DecodeError, FrameCodec};
use crate::bridge::protocol::{
    CompileTarget, KillReason, Message, ModuleName, ObjectPath, SymbolDescriptor,
};
use crate::bridge::transport;
use crate::config::SlaveConfig;
use crate::version::PROTOCOL_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum SlaveError {
    #[error("could not connect to {path} after {attempts} attempts: {source}")]
    ConnectFailure {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("master closed the connection")]
    Disconnected,
    #[error("undecodable frame: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A master that closes a slot with our frames still unread shows up as a
/// reset rather than EOF.
fn connection_error(e: CodecError) -> SlaveError {
    match e {
        CodecError::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
            ) =>
        {
            SlaveError::Disconnected
        }
        other => SlaveError::Codec(other),
    }
}

/// What a specific interop module knows how to do.
#[async_trait::async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Name reported in every response.
    fn module_name(&self) -> &ModuleName;

    /// Look up a symbol. `None` means this module does not provide it.
    async fn resolve(&self, symbol: &SymbolDescriptor) -> Option<SymbolDescriptor>;

    /// Produce an artifact for `target` and return its path.
    async fn compile(&self, _target: &CompileTarget) -> Option<ObjectPath> {
        None
    }
}

pub struct SlaveClient {
    config: SlaveConfig,
    reader: Option<FramedRead<OwnedReadHalf, FrameCodec>>,
    writer: Option<FramedWrite<OwnedWriteHalf, FrameCodec>>,
}

impl SlaveClient {
    /// Connect with retry and send the version handshake.
    pub async fn connect(config: SlaveConfig) -> Result<Self, SlaveError> {
        let stream = transport::connect_with_retry(
            &config.socket_path,
            config.connect_attempts,
            config.retry_interval,
        )
        .await
        .map_err(|e| SlaveError::ConnectFailure {
            path: config.socket_path.clone(),
            attempts: e.attempts,
            source: e.source,
        })?;

        let (read, write) = stream.into_split();
        let mut client = Self {
            config,
            reader: Some(FramedRead::new(read, FrameCodec::new())),
            writer: Some(FramedWrite::new(write, FrameCodec::new())),
        };

        client
            .send(Message::ConnectRequest {
                version: PROTOCOL_VERSION,
            })
            .await?;
        tracing::debug!(index = client.config.index, version = %PROTOCOL_VERSION, "Connected to master");
        Ok(client)
    }

    pub fn config(&self) -> &SlaveConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some() && self.writer.is_some()
    }

    /// Poll once for a message, waiting at most the configured receive timeout.
    pub async fn receive(&mut self) -> Result<Option<Message>, SlaveError> {
        let timeout = self.config.receive_timeout;
        self.receive_timeout(timeout).await
    }

    /// Poll once for a message. `Ok(None)` means nothing arrived in time.
    pub async fn receive_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Message>, SlaveError> {
        let reader = self.reader.as_mut().ok_or(SlaveError::Disconnected)?;

        match tokio::time::timeout(timeout, reader.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(SlaveError::Disconnected),
            Ok(Some(Err(e))) => Err(connection_error(e)),
            Ok(Some(Ok(frame))) => Ok(Some(codec::decode(&frame)?)),
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<(), SlaveError> {
        let writer = self.writer.as_mut().ok_or(SlaveError::Disconnected)?;
        writer.send(message).await.map_err(connection_error)
    }

    /// Serve requests until the master sends Kill, returning its reason.
    pub async fn run<H: ModuleHandler + ?Sized>(
        &mut self,
        handler: &H,
    ) -> Result<KillReason, SlaveError> {
        loop {
            let message = match self.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tokio::time::sleep(self.config.idle_yield).await;
                    continue;
                }
                Err(SlaveError::Decode(e)) => {
                    tracing::warn!(error = %e, "Ignoring undecodable frame");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match message {
                Message::Kill { reason } => {
                    match reason {
                        KillReason::Finish => tracing::info!("Master finished, exiting"),
                        KillReason::VersionMismatch => {
                            tracing::error!(version = %PROTOCOL_VERSION, "Master rejected protocol version")
                        }
                    }
                    self.cleanup();
                    return Ok(reason);
                }
                Message::SymbolRequest { symbol } => {
                    let resolved = handler.resolve(&symbol).await;
                    let found = resolved.is_some();
                    tracing::debug!(%symbol, found, "Resolved symbol");
                    self.send(Message::SymbolResponse {
                        found,
                        module_name: handler.module_name().clone(),
                        symbol: resolved.unwrap_or(symbol),
                    })
                    .await?;
                }
                Message::CompileRequest { target } => match handler.compile(&target).await {
                    Some(path) => {
                        tracing::debug!(%target, path = %path, "Compiled");
                        self.send(Message::ObjectResponse {
                            module_name: handler.module_name().clone(),
                            path,
                        })
                        .await?;
                    }
                    None => tracing::debug!(%target, "Nothing to compile"),
                },
                other => tracing::debug!(message = other.name(), "Ignoring unexpected message"),
            }
        }
    }

    /// Close the connection. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if self.reader.take().is_some() | self.writer.take().is_some() {
            tracing::trace!("Connection closed");
        }
    }
}

impl Drop for SlaveClient {
    fn drop(&mut self) {
        self.cleanup();
    }
}
