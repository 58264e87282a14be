//! Master and module configuration.
//!
//! Defaults match the protocol: the socket lives at `/tmp/fip_socket` (or
//! `$FIP_SOCKET`), the master serves at most 64 modules, and every poll waits
//! 100 ms.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/fip_socket";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "FIP_SOCKET";

/// Maximum number of concurrently connected modules.
pub const MAX_SLAVES: usize = 64;

/// Socket path from `$FIP_SOCKET`, falling back to the default.
pub fn socket_path_from_env() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One interop module the master may launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub executable: PathBuf,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Source files the module scans for symbols.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub compile_flags: Vec<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// On-disk session description.
#[derive(Debug, Clone, Default, Deserialize)]
struct SessionFile {
    #[serde(default)]
    socket_path: Option<PathBuf>,
    #[serde(default)]
    modules: Vec<ModuleConfig>,
}

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub socket_path: PathBuf,
    pub backlog: u32,
    /// How long each accept poll waits for a pending connection.
    pub accept_timeout: Duration,
    /// How long shutdown waits for modules to exit after Kill.
    pub grace_period: Duration,
    pub modules: Vec<ModuleConfig>,
}

impl MasterConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            backlog: MAX_SLAVES as u32,
            accept_timeout: Duration::from_millis(100),
            grace_period: Duration::from_secs(1),
            modules: Vec::new(),
        }
    }

    /// Load a JSON session file.
    ///
    /// `$FIP_SOCKET` overrides the file's socket path; with neither, the
    /// default path is used.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let session = Self::parse_session(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let socket_path = match (std::env::var_os(SOCKET_ENV), session.socket_path) {
            (Some(env), _) => PathBuf::from(env),
            (None, Some(file)) => file,
            (None, None) => PathBuf::from(DEFAULT_SOCKET_PATH),
        };

        Ok(Self::new(socket_path).with_modules(session.modules))
    }

    fn parse_session(text: &str) -> Result<SessionFile, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_modules(mut self, modules: Vec<ModuleConfig>) -> Self {
        self.modules = modules;
        self
    }

    pub fn enabled_modules(&self) -> impl Iterator<Item = &ModuleConfig> {
        self.modules.iter().filter(|m| m.enabled)
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self::new(socket_path_from_env())
    }
}

#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub socket_path: PathBuf,
    /// 1-based spawn index handed over by the master.
    pub index: u32,
    pub connect_attempts: u32,
    pub retry_interval: Duration,
    pub receive_timeout: Duration,
    /// Pause between empty polls in the main loop.
    pub idle_yield: Duration,
}

impl SlaveConfig {
    pub fn new(socket_path: impl Into<PathBuf>, index: u32) -> Self {
        Self {
            socket_path: socket_path.into(),
            index,
            connect_attempts: 10,
            retry_interval: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(100),
            idle_yield: Duration::from_millis(50),
        }
    }

    /// Config for a spawned module: socket from the environment.
    pub fn from_env(index: u32) -> Self {
        Self::new(socket_path_from_env(), index)
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_idle_yield(mut self, pause: Duration) -> Self {
        self.idle_yield = pause;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_defaults_follow_protocol() {
        let config = MasterConfig::new("/tmp/x.sock");
        assert_eq!(config.backlog, 64);
        assert_eq!(config.accept_timeout, Duration::from_millis(100));
        assert!(config.modules.is_empty());
    }

    #[test]
    fn slave_defaults_follow_protocol() {
        let config = SlaveConfig::new("/tmp/x.sock", 3);
        assert_eq!(config.index, 3);
        assert_eq!(config.connect_attempts, 10);
        assert_eq!(config.retry_interval, Duration::from_millis(100));
        assert_eq!(config.receive_timeout, Duration::from_millis(100));
        assert_eq!(config.idle_yield, Duration::from_millis(50));
    }

    #[test]
    fn session_file_parses_modules_with_defaults() {
        let session = MasterConfig::parse_session(
            r#"{
                "socket_path": "/run/fip.sock",
                "modules": [
                    { "name": "c", "executable": "/usr/lib/fip/fip-c",
                      "sources": ["lib.h"], "compile_flags": ["-O2"] },
                    { "name": "zig", "executable": "fip-zig", "enabled": false }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(session.socket_path, Some(PathBuf::from("/run/fip.sock")));
        assert_eq!(session.modules.len(), 2);
        assert!(session.modules[0].enabled);
        assert_eq!(session.modules[0].sources, vec!["lib.h".to_string()]);
        assert!(!session.modules[1].enabled);
        assert!(session.modules[1].compile_flags.is_empty());

        let config = MasterConfig::new("/tmp/x.sock").with_modules(session.modules);
        let enabled: Vec<_> = config.enabled_modules().map(|m| m.name.as_str()).collect();
        assert_eq!(enabled, vec!["c"]);
    }

    #[test]
    fn missing_session_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let err = MasterConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn malformed_session_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ modules: ").unwrap();
        assert!(matches!(
            MasterConfig::from_file(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
