//! Interop module processes launched by the master.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::config::SOCKET_ENV;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn module {index} from {path}: {source}")]
    Spawn {
        index: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module {index} exited before reporting a pid")]
    NoPid { index: u32 },
}

/// Extension point for how module processes are started.
pub trait ModuleSpawner: Send + Sync {
    fn spawn(&self, executable: &Path, index: u32, socket_path: &Path) -> std::io::Result<Child>;
}

/// Runs the executable with the spawn index as its only argument and the
/// socket path in the environment.
pub struct ProcessSpawner;

impl ModuleSpawner for ProcessSpawner {
    fn spawn(&self, executable: &Path, index: u32, socket_path: &Path) -> std::io::Result<Child> {
        Command::new(executable)
            .arg(index.to_string())
            .env(SOCKET_ENV, socket_path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
    }
}

/// A running module process.
#[derive(Debug)]
pub struct ModuleHandle {
    pub index: u32,
    pub pid: Pid,
    child: Child,
}

pub struct ModuleRegistry {
    socket_path: PathBuf,
    spawner: Arc<dyn ModuleSpawner>,
    handles: Vec<ModuleHandle>,
    next_index: u32,
}

impl ModuleRegistry {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_spawner(socket_path, Arc::new(ProcessSpawner))
    }

    pub fn with_spawner(socket_path: impl Into<PathBuf>, spawner: Arc<dyn ModuleSpawner>) -> Self {
        Self {
            socket_path: socket_path.into(),
            spawner,
            handles: Vec::new(),
            next_index: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[ModuleHandle] {
        &self.handles
    }

    /// Launch a module. Indices start at 1 and are consumed even when the
    /// spawn fails.
    pub fn spawn_module(&mut self, executable: &Path) -> Result<u32, SpawnError> {
        let index = self.next_index;
        self.next_index += 1;

        let child = self
            .spawner
            .spawn(executable, index, &self.socket_path)
            .map_err(|source| SpawnError::Spawn {
                index,
                path: executable.to_path_buf(),
                source,
            })?;

        let Some(raw) = child.id() else {
            return Err(SpawnError::NoPid { index });
        };
        let pid = Pid::from_raw(raw as i32);

        tracing::info!(index, pid = raw, executable = %executable.display(), "Spawned module");
        self.handles.push(ModuleHandle { index, pid, child });
        Ok(index)
    }

    /// Wait up to `grace` for every module to exit on its own.
    ///
    /// Returns true when all of them exited in time.
    pub async fn wait_all(&mut self, grace: Duration) -> bool {
        let waited = tokio::time::timeout(grace, async {
            for handle in &mut self.handles {
                match handle.child.wait().await {
                    Ok(status) => {
                        tracing::debug!(index = handle.index, %status, "Module exited");
                    }
                    Err(e) => {
                        tracing::warn!(index = handle.index, error = %e, "Failed to wait for module");
                    }
                }
            }
        })
        .await;
        waited.is_ok()
    }

    /// Send SIGTERM to every module that is still alive and forget them all.
    ///
    /// Returns how many were signalled.
    pub fn terminate_all(&mut self) -> usize {
        let mut signalled = 0;

        for mut handle in self.handles.drain(..) {
            if let Ok(Some(status)) = handle.child.try_wait() {
                tracing::debug!(index = handle.index, %status, "Module already exited");
                continue;
            }

            match kill(handle.pid, None) {
                Ok(()) => match kill(handle.pid, Signal::SIGTERM) {
                    Ok(()) => {
                        tracing::debug!(index = handle.index, pid = %handle.pid, "Sent SIGTERM");
                        signalled += 1;
                    }
                    Err(Errno::ESRCH) => {}
                    Err(e) => {
                        tracing::warn!(index = handle.index, error = %e, "Failed to signal module");
                    }
                },
                Err(Errno::ESRCH) => {}
                Err(e) => {
                    tracing::warn!(index = handle.index, error = %e, "Failed to probe module");
                }
            }
        }

        signalled
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        self.terminate_all();
    }
}
